//! Data types emitted by guardlock's diagnostic path.
//!
//! A [`DiagnosticEvent`] is produced each time a guarded operation is entered
//! from a forbidden execution context. Events are ephemeral: the guard builds
//! one, hands it to a sink, and drops it.

use facet::Facet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch. Clamps to 0 if the clock is before 1970.
pub fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// One forbidden-context violation.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// When the violation was observed, in unix epoch milliseconds.
    pub timestamp: u64,
    /// Declared name of the guarded operation (e.g. `"acquire"`).
    pub operation_name: String,
    /// Source file where the guarded operation was defined or wrapped.
    pub defining_file: String,
    /// 1-based line matching `defining_file`.
    pub defining_line: u32,
    /// Function name of the immediate caller, when the stack could be resolved.
    pub caller_name: Option<String>,
    /// Source file of the immediate caller.
    pub caller_file: String,
    /// 1-based line of the immediate caller.
    pub caller_line: u32,
    /// Name of the resource the operation belongs to, usually a lock name.
    pub resource: Option<String>,
    /// Name of the thread the violation happened on.
    pub thread_name: Option<String>,
    /// Product and version string, if the guard was configured with one.
    pub product: Option<String>,
    /// Where violations should be reported, from the same product info.
    pub report_email: Option<String>,
    /// Rendered call-stack snapshot. `None` when stack capture is disabled.
    pub stack: Option<String>,
}

impl DiagnosticEvent {
    /// `file:line` of the guarded operation's definition.
    pub fn defining_site(&self) -> String {
        format!("{}:{}", self.defining_file, self.defining_line)
    }

    /// `file:line` of the immediate caller.
    pub fn caller_site(&self) -> String {
        format!("{}:{}", self.caller_file, self.caller_line)
    }
}
