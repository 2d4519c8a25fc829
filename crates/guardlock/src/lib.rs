//! Reentrant locking with forbidden-context diagnostics.
//!
//! Some execution contexts must never block on a lock: an event loop, a Tokio
//! worker, a UI thread. `guardlock` does not stop them from doing it. Instead,
//! every entry into a guarded operation asks a [`ContextPredicate`] whether it
//! is running in the forbidden context, and if so hands a
//! [`DiagnosticEvent`] (operation, defining site, caller, stack) to a
//! [`DiagnosticSink`] before carrying on as usual.
//!
//! ```
//! use guardlock::{ContextGuard, GuardedReentrantLock, NamedThread};
//!
//! let guard = ContextGuard::new(NamedThread::new("reactor"));
//! let lock = GuardedReentrantLock::unit("db.session", guard);
//!
//! assert!(lock.acquire(true));
//! assert!(lock.acquire(true));
//! lock.release().unwrap();
//! lock.release().unwrap();
//! assert!(!lock.is_locked());
//! ```
//!
//! # Cargo features
//!
//! | Feature | Effect |
//! |---------|--------|
//! | `diagnostics` *(default)* | Predicates are evaluated and violations reported. |
//! | *(without it)* | Guards are pass-throughs; lock semantics are unchanged. |

mod config;
mod context;
mod guard;
mod lock;
mod sink;
mod stack;

pub use config::*;
pub use context::*;
pub use guard::*;
pub use lock::*;
pub use sink::*;
pub use stack::{NoStack, StackInspector, StackSnapshot, StdBacktrace};

pub use guardlock_types::DiagnosticEvent;
