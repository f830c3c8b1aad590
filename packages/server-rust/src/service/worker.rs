//! Background worker for queued tasks with a periodic tick.
//!
//! `BackgroundWorker<R>` owns a single task that drains an mpsc queue in FIFO
//! order through a `BackgroundRunnable`. Producers hold a cloneable
//! [`WorkerHandle`] and enqueue without waiting.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Processes a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once after the queue has been drained on stop. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Why a task could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("worker queue full")]
    Full,
    #[error("worker stopped")]
    Stopped,
}

// ---------------------------------------------------------------------------
// WorkerHandle
// ---------------------------------------------------------------------------

/// Cloneable producer side of a worker queue.
pub struct WorkerHandle<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for WorkerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for WorkerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("capacity", &self.tx.capacity())
            .finish()
    }
}

impl<T> WorkerHandle<T> {
    /// Enqueues `task` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Full`] when the queue is at capacity and
    /// [`SubmitError::Stopped`] once the worker has exited.
    pub fn try_submit(&self, task: T) -> Result<(), SubmitError> {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Stopped,
        })
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Owns the worker task.
///
/// The task:
/// 1. Receives tasks from the queue and calls `BackgroundRunnable::run()`
/// 2. Calls `BackgroundRunnable::on_tick()` at the configured interval
/// 3. On stop, runs whatever is still queued, then calls `BackgroundRunnable::shutdown()`
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: mpsc::Sender<R::Task>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker with a queue of `capacity` tasks.
    pub fn start(mut runnable: R, capacity: usize, tick_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(tick_interval.max(Duration::from_millis(1)));
            // Skip the immediate first tick.
            ticks.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    task = rx.recv() => match task {
                        Some(t) => runnable.run(t).await,
                        None => break,
                    },
                    _ = ticks.tick() => runnable.on_tick().await,
                }
            }

            rx.close();
            while let Ok(task) = rx.try_recv() {
                runnable.run(task).await;
            }
            runnable.shutdown().await;
        });

        Self {
            tx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Returns a producer handle for this worker's queue.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle<R::Task> {
        WorkerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stops the worker after it has run every task already queued.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "background worker panicked");
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Counters {
        runs: AtomicU32,
        ticks: AtomicU32,
        shutdowns: AtomicU32,
        seen: Mutex<Vec<String>>,
    }

    struct CountingRunnable(Arc<Counters>);

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, task: String) {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
            self.0.seen.lock().push(task);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_tasks_in_submission_order() {
        let counters = Arc::new(Counters::default());
        let mut worker = BackgroundWorker::start(
            CountingRunnable(Arc::clone(&counters)),
            16,
            Duration::from_secs(60),
        );
        let handle = worker.handle();

        for name in ["updated", "deactivated", "added"] {
            handle.try_submit(name.to_string()).unwrap();
        }
        worker.stop().await;

        assert_eq!(counters.runs.load(Ordering::SeqCst), 3);
        assert_eq!(*counters.seen.lock(), vec!["updated", "deactivated", "added"]);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let counters = Arc::new(Counters::default());
        let mut worker = BackgroundWorker::start(
            CountingRunnable(Arc::clone(&counters)),
            16,
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(110)).await;
        worker.stop().await;

        assert!(counters.ticks.load(Ordering::SeqCst) >= 2);
    }

    struct Blocked(Option<oneshot::Receiver<()>>);

    #[async_trait]
    impl BackgroundRunnable for Blocked {
        type Task = u32;

        async fn run(&mut self, _task: u32) {
            if let Some(gate) = self.0.take() {
                let _ = gate.await;
            }
        }
    }

    #[tokio::test]
    async fn full_queue_rejects_without_waiting() {
        let (release, gate) = oneshot::channel();
        let mut worker = BackgroundWorker::start(Blocked(Some(gate)), 1, Duration::from_secs(60));
        let handle = worker.handle();

        handle.try_submit(1).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.try_submit(2).unwrap();
        assert_eq!(handle.try_submit(3), Err(SubmitError::Full));

        release.send(()).unwrap();
        worker.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let counters = Arc::new(Counters::default());
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters), 16, Duration::from_secs(60));
        let handle = worker.handle();
        worker.stop().await;

        assert!(!worker.is_running());
        assert_eq!(handle.try_submit("late".to_string()), Err(SubmitError::Stopped));
    }
}
