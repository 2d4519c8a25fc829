//! Call-stack inspection for attributing a violation to its call site.
//!
//! The guard only needs two things from the stack: the name of the first frame
//! outside guardlock itself, and a rendered dump for the log. Both come from a
//! [`StackInspector`], so a platform-specific unwinder can replace
//! [`StdBacktrace`] without touching the guard.

use std::backtrace::{Backtrace, BacktraceStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackSnapshot {
    /// First frame that is not part of the guard machinery.
    pub caller_name: Option<String>,
    /// Rendered, possibly truncated, backtrace.
    pub rendered: Option<String>,
}

pub trait StackInspector: Send + Sync {
    fn capture(&self, max_frames: usize) -> StackSnapshot;
}

/// Captures with `std::backtrace::Backtrace::force_capture`, ignoring
/// `RUST_BACKTRACE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdBacktrace;

impl StackInspector for StdBacktrace {
    fn capture(&self, max_frames: usize) -> StackSnapshot {
        let bt = Backtrace::force_capture();
        if bt.status() != BacktraceStatus::Captured {
            return StackSnapshot::default();
        }
        let full = format!("{bt}");
        StackSnapshot {
            caller_name: caller_frame(&full),
            rendered: Some(truncate_frames(&full, max_frames)),
        }
    }
}

/// Skips stack capture entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStack;

impl StackInspector for NoStack {
    fn capture(&self, _max_frames: usize) -> StackSnapshot {
        StackSnapshot::default()
    }
}

/// Frames that belong to the capture machinery, the guard, or the runtime
/// entry points rather than to the code that called into a guarded operation.
const NOISE: &[&str] = &[
    "std::backtrace",
    "std::sys",
    "backtrace_rs",
    "backtrace::",
    "core::ops::function",
    "std::panicking",
    "std::panic",
    "std::rt::lang_start",
    "__rust_begin_short_backtrace",
    "<unknown>",
    "guardlock::stack::",
    "guardlock::guard::",
    "guardlock::lock::GuardedReentrantLock",
];

/// Splits a rendered backtrace frame line like `  4: app::db::commit::h1a2b`
/// into its symbol. Returns `None` for `at file:line` lines.
fn frame_symbol(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let (index, rest) = trimmed.split_once(": ")?;
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(strip_hash(rest.trim()))
}

fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

pub(crate) fn caller_frame(rendered: &str) -> Option<String> {
    rendered
        .lines()
        .filter_map(frame_symbol)
        .filter(|symbol| !symbol.is_empty())
        .find(|symbol| !NOISE.iter().any(|n| symbol.contains(n)))
        .map(str::to_owned)
}

/// Keeps the first `max_frames` frames, including each frame's `at` lines.
pub(crate) fn truncate_frames(rendered: &str, max_frames: usize) -> String {
    let mut out = String::new();
    let mut frames = 0usize;
    for line in rendered.lines() {
        if frame_symbol(line).is_some() {
            if frames == max_frames {
                out.push_str("      ...\n");
                break;
            }
            frames += 1;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
   0: std::backtrace::Backtrace::force_capture
             at /rustc/library/std/src/backtrace.rs:312:9
   1: <guardlock::stack::StdBacktrace as guardlock::stack::StackInspector>::capture
             at ./src/stack.rs:30:18
   2: guardlock::guard::ContextGuard::invoke
             at ./src/guard.rs:120:5
   3: guardlock::lock::GuardedReentrantLock<T>::acquire
             at ./src/lock.rs:80:9
   4: app::db::commit::h0123456789abcdef
             at ./src/db.rs:7:5
   5: std::rt::lang_start::{{closure}}
";

    #[test]
    fn caller_skips_guard_frames_and_hash() {
        assert_eq!(caller_frame(SAMPLE).as_deref(), Some("app::db::commit"));
    }

    #[test]
    fn caller_is_none_when_everything_is_noise() {
        let only_noise = "   0: std::backtrace::Backtrace::force_capture\n   1: <unknown>\n";
        assert_eq!(caller_frame(only_noise), None);
    }

    #[test]
    fn truncation_keeps_at_lines_of_kept_frames() {
        let out = truncate_frames(SAMPLE, 2);
        assert!(out.contains("backtrace.rs:312:9"));
        assert!(out.contains("src/stack.rs:30:18"));
        assert!(!out.contains("ContextGuard::invoke"));
        assert!(out.ends_with("...\n"));
    }

    #[test]
    fn hash_suffix_needs_sixteen_hex_digits() {
        assert_eq!(strip_hash("a::b::hello"), "a::b::hello");
        assert_eq!(strip_hash("a::b::h0123456789abcdef"), "a::b");
    }

    #[test]
    fn no_stack_captures_nothing() {
        assert_eq!(NoStack.capture(8), StackSnapshot::default());
    }
}
