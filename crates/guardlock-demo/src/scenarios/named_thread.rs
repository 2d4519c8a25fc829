use std::sync::Arc;

use guardlock::{ContextGuard, DiagnosticSink, GuardConfig, GuardedReentrantLock, NamedThread};

/// Re-enters a lock from the forbidden named thread and from an ordinary one.
pub fn run(
    config: GuardConfig,
    sink: Arc<dyn DiagnosticSink>,
    forbidden: &str,
) -> Result<(), String> {
    let guard = ContextGuard::builder(NamedThread::new(forbidden))
        .sink(sink)
        .config(config)
        .build();
    let lock = Arc::new(GuardedReentrantLock::unit("demo.db", guard));

    for thread_name in [forbidden, "demo.worker"] {
        let lock = Arc::clone(&lock);
        let label = thread_name.to_owned();
        std::thread::Builder::new()
            .name(thread_name.to_owned())
            .spawn(move || -> Result<(), String> {
                lock.acquire(true);
                lock.acquire(true);
                lock.release().map_err(|e| e.to_string())?;
                lock.release().map_err(|e| e.to_string())?;
                println!("{label}: acquired and released demo.db twice");
                Ok(())
            })
            .map_err(|e| format!("failed to spawn {thread_name}: {e}"))?
            .join()
            .map_err(|_| format!("{thread_name} panicked"))??;
    }

    println!("expected four diagnostics from {forbidden:?} and none from \"demo.worker\"");
    Ok(())
}
