//! A handle for spawning named tasks bound to a process-wide shutdown signal.
//!
//! Every long-lived task in the client is spawned through a `TaskExecutor` so
//! that dropping the shutdown `Signal` winds the whole process down without
//! each task carrying its own exit plumbing.

use futures::future::FutureExt;
use slog::{debug, Logger};
use std::future::Future;

pub use exit_future::{signal, Exit, Signal};

#[derive(Clone)]
pub struct TaskExecutor {
    handle: tokio::runtime::Handle,
    exit: Exit,
    log: Logger,
}

impl TaskExecutor {
    pub fn new(handle: tokio::runtime::Handle, exit: Exit, log: Logger) -> Self {
        Self { handle, exit, log }
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn exit(&self) -> Exit {
        self.exit.clone()
    }

    /// Spawn a future that runs until completion or process shutdown,
    /// whichever is first.
    pub fn spawn(&self, task: impl Future<Output = ()> + Send + 'static, name: &'static str) {
        let exit = self.exit.clone();
        let log = self.log.clone();

        let future = async move {
            futures::pin_mut!(task);
            futures::select! {
                _ = task.fuse() => {
                    debug!(log, "Task finished"; "task" => name);
                }
                _ = exit.fuse() => {
                    debug!(log, "Task shut down"; "task" => name);
                }
            }
        };

        self.handle.spawn(future);
    }

    /// Spawn a future that must manage its own shutdown (e.g. because it
    /// holds resources needing orderly teardown). Returns the join handle.
    pub fn spawn_handle<T: Send + 'static>(
        &self,
        task: impl Future<Output = T> + Send + 'static,
        _name: &'static str,
    ) -> tokio::task::JoinHandle<T> {
        self.handle.spawn(task)
    }

    /// Run blocking CPU work off the async threads.
    pub fn spawn_blocking<F, T>(&self, func: F) -> tokio::task::JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn_blocking(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn null_log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn shutdown_stops_tasks() {
        let (signal, exit) = exit_future::signal();
        let executor = TaskExecutor::new(tokio::runtime::Handle::current(), exit, null_log());

        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();
        executor.spawn(
            async move {
                tokio::time::sleep(Duration::from_secs(600)).await;
                finished_clone.store(true, Ordering::Relaxed);
            },
            "sleeper",
        );

        drop(signal);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!finished.load(Ordering::Relaxed));
    }
}
