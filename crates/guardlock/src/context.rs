//! Predicates answering "is the current execution unit the forbidden one?".
//!
//! Predicates are evaluated fresh on every guarded call. They must not block
//! and must not have side effects. A predicate that errors or panics is
//! treated as "not forbidden" by the guard.

use std::error::Error;
use std::fmt;
use std::thread::ThreadId;

pub trait ContextPredicate: Send + Sync {
    fn is_forbidden_context(&self) -> Result<bool, ContextError>;
}

#[derive(Debug)]
pub enum ContextError {
    /// The host runtime could not answer the question.
    Unavailable { reason: String },
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => {
                write!(f, "execution context could not be determined: {reason}")
            }
        }
    }
}

impl Error for ContextError {}

impl<F> ContextPredicate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_forbidden_context(&self) -> Result<bool, ContextError> {
        Ok(self())
    }
}

/// Never forbidden.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl ContextPredicate for Never {
    fn is_forbidden_context(&self) -> Result<bool, ContextError> {
        Ok(false)
    }
}

/// Forbidden on any thread whose name equals `name`.
#[derive(Debug, Clone)]
pub struct NamedThread {
    name: String,
}

impl NamedThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ContextPredicate for NamedThread {
    fn is_forbidden_context(&self) -> Result<bool, ContextError> {
        Ok(std::thread::current().name() == Some(self.name.as_str()))
    }
}

/// Forbidden on exactly one thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadIdentity {
    id: ThreadId,
}

impl ThreadIdentity {
    pub fn new(id: ThreadId) -> Self {
        Self { id }
    }

    /// Marks the calling thread as the forbidden one.
    pub fn current() -> Self {
        Self::new(std::thread::current().id())
    }
}

impl ContextPredicate for ThreadIdentity {
    fn is_forbidden_context(&self) -> Result<bool, ContextError> {
        Ok(std::thread::current().id() == self.id)
    }
}

/// Forbidden whenever the caller is inside a Tokio runtime context, i.e. on a
/// runtime worker or inside `block_on`. `spawn_blocking` threads also carry a
/// runtime handle, so callers that hand work off to the blocking pool should
/// pair this with [`NamedThread`] or a custom predicate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRuntime;

impl ContextPredicate for TokioRuntime {
    fn is_forbidden_context(&self) -> Result<bool, ContextError> {
        match tokio::runtime::Handle::try_current() {
            Ok(_) => Ok(true),
            Err(e) if e.is_missing_context() => Ok(false),
            Err(e) => Err(ContextError::Unavailable {
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_thread_matches_only_that_name() {
        let predicate = NamedThread::new("reactor");
        assert!(!predicate.is_forbidden_context().unwrap());

        let predicate = predicate.clone();
        let on_reactor = std::thread::Builder::new()
            .name("reactor".into())
            .spawn(move || predicate.is_forbidden_context().unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert!(on_reactor);
    }

    #[test]
    fn thread_identity_pins_the_capturing_thread() {
        let predicate = ThreadIdentity::current();
        assert!(predicate.is_forbidden_context().unwrap());

        let elsewhere = std::thread::spawn(move || predicate.is_forbidden_context().unwrap())
            .join()
            .unwrap();
        assert!(!elsewhere);
    }

    #[test]
    fn tokio_runtime_detects_runtime_context() {
        assert!(!TokioRuntime.is_forbidden_context().unwrap());

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let inside = rt.block_on(async { TokioRuntime.is_forbidden_context().unwrap() });
        assert!(inside);
    }

    #[test]
    fn closures_are_predicates() {
        let always = || true;
        assert!(always.is_forbidden_context().unwrap());
        assert!(!Never.is_forbidden_context().unwrap());
    }
}
