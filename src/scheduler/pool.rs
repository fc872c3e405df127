//! Bounded worker pool for session runners
//!
//! Jobs wait for one of `max_concurrency + 1` permits, run to completion and
//! report their outcome as a `SessionCompleted` control event. A panicking
//! job is caught at the worker boundary and reported as `Crashed`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::client::types::SessionId;
use crate::control::event::ControlSender;
use crate::session::SessionOutcome;

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
}

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    completions: ControlSender,
    workers: usize,
    closed: bool,
}

impl WorkerPool {
    /// Pool with one spare worker above the session limit
    pub fn new(max_concurrency: usize, completions: ControlSender) -> Self {
        let workers = max_concurrency + 1;
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            completions,
            workers,
            closed: false,
        }
    }

    /// Queue a job; its outcome is always reported on the control queue
    pub fn submit(
        &mut self,
        session_id: SessionId,
        job: BoxFuture<'static, SessionOutcome>,
    ) -> Result<(), PoolError> {
        if self.closed {
            return Err(PoolError::Closed);
        }
        self.reap();

        let permits = Arc::clone(&self.permits);
        let completions = self.completions.clone();
        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                completions.session_completed(
                    session_id,
                    SessionOutcome::Rejected(PoolError::Closed.to_string()),
                );
                return;
            };

            let outcome = match AssertUnwindSafe(job).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Game {} ended due to error: {}", session_id, message);
                    SessionOutcome::Crashed(message)
                }
            };
            completions.session_completed(session_id, outcome);
        });
        Ok(())
    }

    /// Drop handles of finished workers
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                debug!("Worker task did not finish cleanly: {}", e);
            }
        }
    }

    /// Workers currently running or waiting for a permit
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Workers holding a permit
    pub fn busy(&self) -> usize {
        self.workers - self.permits.available_permits()
    }

    /// Refuse new jobs; queued jobs that have not started are rejected
    pub fn close(&mut self) {
        self.closed = true;
        self.permits.close();
    }

    /// Wait for every worker to finish
    pub async fn join(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                debug!("Worker task did not finish cleanly: {}", e);
            }
        }
    }

    /// Cancel every worker
    pub fn abort_all(&mut self) {
        self.tasks.abort_all();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::event::{control_channel, ControlEvent};
    use std::time::Duration;

    fn completed(event: Option<ControlEvent>) -> (SessionId, SessionOutcome) {
        match event {
            Some(ControlEvent::SessionCompleted { session_id, outcome }) => (session_id, outcome),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_reports_completion() {
        let (tx, mut rx) = control_channel();
        let mut pool = WorkerPool::new(1, tx);

        pool.submit("g1".into(), async { SessionOutcome::Finished }.boxed())
            .unwrap();

        assert_eq!(completed(rx.recv().await), ("g1".to_string(), SessionOutcome::Finished));
    }

    async fn explode() -> SessionOutcome {
        panic!("engine exploded")
    }

    #[tokio::test]
    async fn test_panic_becomes_crashed_outcome() {
        let (tx, mut rx) = control_channel();
        let mut pool = WorkerPool::new(1, tx);

        pool.submit("g1".into(), explode().boxed()).unwrap();

        let (id, outcome) = completed(rx.recv().await);
        assert_eq!(id, "g1");
        assert_eq!(outcome, SessionOutcome::Crashed("engine exploded".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permits_bound_running_jobs() {
        let (tx, mut rx) = control_channel();
        let mut pool = WorkerPool::new(1, tx);

        for id in ["a", "b", "c"] {
            pool.submit(
                id.into(),
                async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    SessionOutcome::Finished
                }
                .boxed(),
            )
            .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pool.busy(), 2);
        assert_eq!(pool.in_flight(), 3);

        // The third job only starts once a permit frees up
        completed(rx.recv().await);
        completed(rx.recv().await);
        completed(rx.recv().await);
        pool.join().await;
        assert_eq!(pool.busy(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let (tx, _rx) = control_channel();
        let mut pool = WorkerPool::new(1, tx);
        pool.close();

        let result = pool.submit("g1".into(), async { SessionOutcome::Finished }.boxed());
        assert_eq!(result, Err(PoolError::Closed));
        assert_eq!(pool.in_flight(), 0);
    }
}
