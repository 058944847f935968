//! Manages the lifecycle of all spawned tasks in the application.
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type NamedHandle = (&'static str, JoinHandle<()>);

/// Tracks every long-running task together with the shared shutdown signal.
///
/// Components take a shutdown receiver from the manager, spawn themselves
/// through it, and are awaited together in `shutdown`.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<NamedHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    /// Creates a new `TaskManager` bound to `shutdown_rx`.
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns `future` on the runtime and records its handle under `name`.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.lock_handles().push((name, handle));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn task_count(&self) -> usize {
        self.lock_handles().len()
    }

    /// Waits for every managed task and returns how many of them panicked.
    pub async fn shutdown(self) -> usize {
        let handles: Vec<NamedHandle> = self.lock_handles().drain(..).collect();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (names, joins): (Vec<&'static str>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
        let results = join_all(joins).await;

        let mut panicked = 0;
        for (task_name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked += 1;
                }
            }
        }

        if panicked == 0 {
            info!("All tasks shut down gracefully.");
        } else {
            error!("{} tasks panicked during shutdown.", panicked);
        }
        panicked
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<NamedHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks_and_counts_panics() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = TaskManager::new(shutdown_rx);

        let mut rx = manager.get_shutdown_rx();
        manager.spawn("Waiter", async move {
            let _ = rx.changed().await;
        });
        manager.spawn("Panicker", async {
            panic!("boom");
        });
        assert_eq!(manager.task_count(), 2);

        shutdown_tx.send(true).unwrap();
        assert_eq!(manager.shutdown().await, 1);
    }
}
