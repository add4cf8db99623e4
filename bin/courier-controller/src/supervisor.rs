//! Supervision of the controller's long-running tasks
//!
//! Every task runs until the shared cancellation token fires. The first task
//! to finish while the process is not shutting down (with an error, or
//! successfully when it was expected to run forever) cancels all others, and
//! its outcome becomes the process outcome.

use anyhow::anyhow;
use std::future::Future;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type TaskExit = (&'static str, anyhow::Result<()>);

pub struct Supervisor {
    tasks: JoinSet<TaskExit>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Start a named task
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        info!(task = name, "Starting task");
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Wait for the first task to exit, then stop and drain the rest.
    ///
    /// Returns the first error observed.
    pub async fn wait(mut self) -> anyhow::Result<()> {
        let mut outcome = Ok(());

        if let Some(joined) = self.tasks.join_next().await {
            outcome = exit_status(joined, self.cancel.is_cancelled());
        }
        self.cancel.cancel();

        while let Some(joined) = self.tasks.join_next().await {
            let status = exit_status(joined, true);
            if outcome.is_ok() {
                outcome = status;
            }
        }
        outcome
    }
}

fn exit_status(
    joined: Result<TaskExit, JoinError>,
    shutting_down: bool,
) -> anyhow::Result<()> {
    match joined {
        Ok((name, Ok(()))) if shutting_down => {
            info!(task = name, "Task stopped");
            Ok(())
        }
        Ok((name, Ok(()))) => {
            error!(task = name, "Task exited unexpectedly");
            Err(anyhow!("task {} exited unexpectedly", name))
        }
        Ok((name, Err(e))) => {
            error!(task = name, error = %e, "Task failed");
            Err(e.context(format!("task {} failed", name)))
        }
        Err(e) => {
            error!(error = %e, "Task panicked or was aborted");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn until_cancelled(cancel: CancellationToken, stopped: Arc<AtomicBool>) -> impl Future<Output = anyhow::Result<()>> {
        async move {
            cancel.cancelled().await;
            stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_error_stops_everything() {
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new(cancel.clone());
        supervisor.spawn("worker", until_cancelled(cancel.clone(), stopped.clone()));
        supervisor.spawn("reconciler", async { Err(anyhow!("fetch failed")) });

        let err = supervisor.wait().await.unwrap_err();

        assert!(format!("{:#}", err).contains("fetch failed"));
        assert!(cancel.is_cancelled());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_is_clean() {
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new(cancel.clone());
        supervisor.spawn("worker", until_cancelled(cancel.clone(), stopped.clone()));
        let signal = cancel.clone();
        supervisor.spawn("signal", async move {
            signal.cancel();
            Ok(())
        });

        supervisor.wait().await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_an_error() {
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::new(cancel.clone());
        supervisor.spawn("watcher", async { Ok(()) });

        assert!(supervisor.wait().await.is_err());
        assert!(cancel.is_cancelled());
    }
}
