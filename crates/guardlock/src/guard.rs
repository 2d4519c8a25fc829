//! The context guard: detect, report, then always run the operation.

use std::cell::Cell;
use std::fmt;
use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::Arc;

use guardlock_types::{DiagnosticEvent, unix_millis_now};

use crate::config::GuardConfig;
use crate::context::{ContextPredicate, Never};
use crate::sink::{DIAGNOSTIC_TARGET, DiagnosticSink, TracingSink};
use crate::stack::{StackInspector, StackSnapshot, StdBacktrace};

thread_local! {
    // Set while this thread is evaluating a predicate or emitting an event.
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

struct ReportingScope;

impl ReportingScope {
    fn enter() -> Option<Self> {
        REPORTING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(Self)
            }
        })
    }
}

impl Drop for ReportingScope {
    fn drop(&mut self) {
        REPORTING.with(|flag| flag.set(false));
    }
}

/// Static identity of a guarded operation, resolved once when it is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSite {
    pub name: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl OperationSite {
    pub const fn new(name: &'static str, file: &'static str, line: u32) -> Self {
        Self { name, file, line }
    }

    #[track_caller]
    pub fn caller(name: &'static str) -> Self {
        let location = Location::caller();
        Self::new(name, location.file(), location.line())
    }
}

impl fmt::Display for OperationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.file, self.line)
    }
}

struct GuardInner {
    predicate: Box<dyn ContextPredicate>,
    sink: Box<dyn DiagnosticSink>,
    inspector: Box<dyn StackInspector>,
    config: GuardConfig,
}

/// Reports calls made from a forbidden execution context without ever
/// preventing them.
///
/// Cloning is cheap; clones share predicate, sink and configuration.
#[derive(Clone)]
pub struct ContextGuard {
    inner: Arc<GuardInner>,
}

impl ContextGuard {
    /// Guard logging through [`TracingSink`] with the default configuration.
    pub fn new(predicate: impl ContextPredicate + 'static) -> Self {
        Self::builder(predicate).build()
    }

    pub fn builder(predicate: impl ContextPredicate + 'static) -> ContextGuardBuilder {
        ContextGuardBuilder {
            predicate: Box::new(predicate),
            sink: Box::new(TracingSink),
            inspector: Box::new(StdBacktrace),
            config: GuardConfig::default(),
        }
    }

    /// A guard whose predicate is never true.
    pub fn unguarded() -> Self {
        Self::new(Never)
    }

    pub fn config(&self) -> &GuardConfig {
        &self.inner.config
    }

    /// Wraps `op`, recording the call site of `wrap` as its defining site.
    #[track_caller]
    pub fn wrap<F>(&self, name: &'static str, op: F) -> Guarded<F> {
        self.wrap_at(OperationSite::caller(name), op)
    }

    pub fn wrap_at<F>(&self, site: OperationSite, op: F) -> Guarded<F> {
        Guarded {
            guard: self.clone(),
            site,
            op,
        }
    }

    /// Reports the call if it comes from the forbidden context, then runs `op`
    /// exactly once and returns whatever it returns.
    pub fn invoke<R>(
        &self,
        site: &OperationSite,
        caller: &'static Location<'static>,
        resource: Option<&str>,
        op: impl FnOnce() -> R,
    ) -> R {
        self.check(site, caller, resource);
        op()
    }

    /// Evaluates the predicate and emits one event on a violation. Returns
    /// whether an event was emitted.
    pub fn check(
        &self,
        site: &OperationSite,
        caller: &'static Location<'static>,
        resource: Option<&str>,
    ) -> bool {
        if !cfg!(feature = "diagnostics") {
            return false;
        }
        let Some(_scope) = ReportingScope::enter() else {
            return false;
        };
        if !self.is_forbidden() {
            return false;
        }
        let event = self.build_event(site, caller, resource);
        let sink = &self.inner.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.emit(&event))).is_err() {
            tracing::warn!(target: DIAGNOSTIC_TARGET, operation = site.name, "diagnostic sink panicked");
        }
        true
    }

    fn is_forbidden(&self) -> bool {
        let predicate = &self.inner.predicate;
        match catch_unwind(AssertUnwindSafe(|| predicate.is_forbidden_context())) {
            Ok(Ok(forbidden)) => forbidden,
            Ok(Err(e)) => {
                tracing::debug!(target: DIAGNOSTIC_TARGET, %e, "context predicate failed; treating as allowed");
                false
            }
            Err(_) => {
                tracing::debug!(target: DIAGNOSTIC_TARGET, "context predicate panicked; treating as allowed");
                false
            }
        }
    }

    fn build_event(
        &self,
        site: &OperationSite,
        caller: &'static Location<'static>,
        resource: Option<&str>,
    ) -> DiagnosticEvent {
        let config = &self.inner.config;
        let stack = if config.capture_stack {
            self.inner.inspector.capture(config.max_frames)
        } else {
            StackSnapshot::default()
        };
        DiagnosticEvent {
            timestamp: unix_millis_now(),
            operation_name: site.name.to_owned(),
            defining_file: site.file.to_owned(),
            defining_line: site.line,
            caller_name: stack.caller_name,
            caller_file: caller.file().to_owned(),
            caller_line: caller.line(),
            resource: resource.map(str::to_owned),
            thread_name: std::thread::current().name().map(str::to_owned),
            product: config.product.as_ref().map(|p| p.full_version()),
            report_email: config
                .product
                .as_ref()
                .and_then(|p| p.report_email.clone()),
            stack: stack.rendered,
        }
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

pub struct ContextGuardBuilder {
    predicate: Box<dyn ContextPredicate>,
    sink: Box<dyn DiagnosticSink>,
    inspector: Box<dyn StackInspector>,
    config: GuardConfig,
}

impl ContextGuardBuilder {
    pub fn sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn inspector(mut self, inspector: impl StackInspector + 'static) -> Self {
        self.inspector = Box::new(inspector);
        self
    }

    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ContextGuard {
        ContextGuard {
            inner: Arc::new(GuardInner {
                predicate: self.predicate,
                sink: self.sink,
                inspector: self.inspector,
                config: self.config,
            }),
        }
    }
}

/// An operation wrapped by a [`ContextGuard`].
///
/// Operations taking several arguments take them as one tuple.
pub struct Guarded<F> {
    guard: ContextGuard,
    site: OperationSite,
    op: F,
}

impl<F> Guarded<F> {
    pub fn site(&self) -> &OperationSite {
        &self.site
    }

    pub fn guard(&self) -> &ContextGuard {
        &self.guard
    }

    pub fn into_inner(self) -> F {
        self.op
    }

    #[track_caller]
    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        let caller = Location::caller();
        self.guard.invoke(&self.site, caller, None, || (self.op)(args))
    }

    #[track_caller]
    pub fn call_mut<A, R>(&mut self, args: A) -> R
    where
        F: FnMut(A) -> R,
    {
        let caller = Location::caller();
        let op = &mut self.op;
        self.guard.invoke(&self.site, caller, None, || op(args))
    }

    #[track_caller]
    pub fn run<R>(&self) -> R
    where
        F: Fn() -> R,
    {
        let caller = Location::caller();
        self.guard.invoke(&self.site, caller, None, || (self.op)())
    }
}

impl<F> fmt::Debug for Guarded<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded").field("site", &self.site).finish_non_exhaustive()
    }
}

/// Wraps an operation with a guard, naming it and recording the macro's
/// location as its defining site.
///
/// ```
/// use guardlock::{ContextGuard, guarded};
///
/// let guard = ContextGuard::unguarded();
/// let double = guarded!(guard, "double", |x: i32| x * 2);
/// assert_eq!(double.call(21), 42);
/// ```
#[macro_export]
macro_rules! guarded {
    ($guard:expr, $name:expr, $op:expr $(,)?) => {{
        $guard.wrap_at($crate::OperationSite::new($name, file!(), line!()), $op)
    }};
}
