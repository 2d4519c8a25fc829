use std::sync::Arc;

use guardlock::{ContextGuard, DiagnosticSink, GuardConfig, GuardedReentrantLock, TokioRuntime};

/// Takes a shared lock from a plain thread (silent), then from an async task on
/// a Tokio worker and from a `spawn_blocking` closure (both reported). Every
/// acquisition succeeds.
pub fn run(config: GuardConfig, sink: Arc<dyn DiagnosticSink>) -> Result<(), String> {
    let guard = ContextGuard::builder(TokioRuntime)
        .sink(sink)
        .config(config)
        .build();
    let lock = Arc::new(GuardedReentrantLock::new("demo.session", 0u64, guard));

    let from_thread = Arc::clone(&lock);
    std::thread::Builder::new()
        .name("demo.worker".into())
        .spawn(move || {
            let count = from_thread.lock();
            println!("demo.worker took demo.session outside the runtime (count = {})", *count);
        })
        .map_err(|e| format!("failed to spawn worker thread: {e}"))?
        .join()
        .map_err(|_| "worker thread panicked".to_owned())?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("demo.reactor")
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let from_task = Arc::clone(&lock);
    let from_pool = Arc::clone(&lock);
    rt.block_on(async move {
        tokio::spawn(async move {
            if from_task.acquire(true) {
                println!("async task took demo.session on a runtime worker; a diagnostic was emitted");
                if let Err(e) = from_task.release() {
                    tracing::error!(%e, "release failed");
                }
            }
        })
        .await
        .map_err(|e| format!("async task failed: {e}"))?;

        // Blocking-pool threads still carry the runtime handle, so they are reported too.
        tokio::task::spawn_blocking(move || {
            from_pool.acquire(true);
            let released = from_pool.release();
            println!("spawn_blocking took demo.session; it is also inside the runtime context");
            released
        })
        .await
        .map_err(|e| format!("blocking task failed: {e}"))?
        .map_err(|e| format!("blocking release failed: {e}"))
    })?;

    println!("lock is free again: {}", !lock.is_locked());
    Ok(())
}
