//! Session scheduling
//!
//! Owns the active session set, the low-time queue and the worker pool.
//! Only the dispatcher touches this state; workers report back by message.

pub mod pool;
pub mod queue;

pub use pool::{PoolError, WorkerPool};
pub use queue::LowTimeQueue;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::challenge::ChallengeRegistry;
use crate::client::types::{OngoingSession, SessionId};
use crate::client::{ClientError, GameServer};
use crate::control::event::ControlSender;
use crate::metrics::Metrics;
use crate::session::{SessionContext, SessionOutcome, SessionRunner};
use crate::shutdown::ShutdownWatch;
use crate::util::Timer;

/// Builds the job that plays one session
pub trait SessionFactory: Send + Sync {
    fn create(&self, session_id: SessionId) -> BoxFuture<'static, SessionOutcome>;
}

impl<F> SessionFactory for F
where
    F: Fn(SessionId) -> BoxFuture<'static, SessionOutcome> + Send + Sync,
{
    fn create(&self, session_id: SessionId) -> BoxFuture<'static, SessionOutcome> {
        self(session_id)
    }
}

/// Factory running a `SessionRunner` per session
pub struct RunnerFactory {
    ctx: Arc<SessionContext>,
    shutdown: ShutdownWatch,
}

impl RunnerFactory {
    pub fn new(ctx: Arc<SessionContext>, shutdown: ShutdownWatch) -> Self {
        Self { ctx, shutdown }
    }
}

impl SessionFactory for RunnerFactory {
    fn create(&self, session_id: SessionId) -> BoxFuture<'static, SessionOutcome> {
        SessionRunner::new(Arc::clone(&self.ctx), session_id, self.shutdown.clone())
            .run()
            .boxed()
    }
}

/// A challenge the server refused to let us accept
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptFailure {
    pub challenge_id: String,
    pub error: ClientError,
}

pub struct SessionScheduler {
    max_concurrency: usize,
    /// Ids occupying a slot
    active: HashSet<SessionId>,
    /// Ids with a runner submitted to the pool
    running: HashSet<SessionId>,
    /// Accepted challenges waiting for their game to start
    reservations: HashMap<SessionId, Timer>,
    accept_timeout: Duration,
    low_time: LowTimeQueue,
    pool: WorkerPool,
    factory: Arc<dyn SessionFactory>,
    completions: ControlSender,
    metrics: Arc<Metrics>,
}

impl SessionScheduler {
    pub fn new(
        max_concurrency: usize,
        accept_timeout: Duration,
        factory: Arc<dyn SessionFactory>,
        completions: ControlSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            max_concurrency,
            active: HashSet::new(),
            running: HashSet::new(),
            reservations: HashMap::new(),
            accept_timeout,
            low_time: LowTimeQueue::new(),
            pool: WorkerPool::new(max_concurrency, completions.clone()),
            factory,
            completions,
            metrics,
        }
    }

    /// Start a session the server has already begun
    ///
    /// Always takes a slot, even past the limit. A session whose runner is
    /// still in flight is never submitted a second time.
    pub fn admit(&mut self, session_id: SessionId) {
        self.low_time.remove(&session_id);
        self.reservations.remove(&session_id);
        self.active.insert(session_id.clone());

        if self.running.contains(&session_id) {
            debug!("Game {} already has a runner", session_id);
            return;
        }
        self.submit(session_id);
        self.log_count("Used");
    }

    fn submit(&mut self, session_id: SessionId) {
        self.running.insert(session_id.clone());
        Metrics::incr(&self.metrics.sessions_started);

        let job = self.factory.create(session_id.clone());
        if let Err(e) = self.pool.submit(session_id.clone(), job) {
            warn!("Could not start game {}: {}", session_id, e);
            self.completions
                .session_completed(session_id, SessionOutcome::Rejected(e.to_string()));
        }
        self.sync_gauges();
    }

    /// Free the slot of a finished session; false when it held none
    pub fn complete(&mut self, session_id: &str, outcome: &SessionOutcome) -> bool {
        self.running.remove(session_id);
        self.reservations.remove(session_id);
        let freed = self.active.remove(session_id);

        Metrics::incr(&self.metrics.sessions_completed);
        if outcome.is_failure() {
            Metrics::incr(&self.metrics.sessions_failed);
        }
        if freed {
            self.log_count("Freed");
        }
        self.sync_gauges();
        freed
    }

    /// Queue a session found in progress so it is resumed once a slot is free
    pub fn enqueue_low_time(&mut self, session: &OngoingSession) -> bool {
        if self.active.contains(&session.id) {
            return false;
        }
        let queued = self.low_time.push(session.id.clone(), session.seconds_left);
        self.sync_gauges();
        queued
    }

    /// Fill free slots: low-time sessions first, then queued challenges
    pub async fn tick(
        &mut self,
        registry: &mut ChallengeRegistry,
        server: &dyn GameServer,
    ) -> Vec<AcceptFailure> {
        self.release_stale_reservations();

        while self.has_capacity() {
            let Some(session_id) = self.low_time.pop() else {
                break;
            };
            info!("Resuming low-time game {}", session_id);
            self.admit(session_id);
        }

        let mut failures = Vec::new();
        while self.has_capacity() {
            let Some(challenge) = registry.pop_front() else {
                break;
            };
            if challenge.from_self {
                continue;
            }

            info!("Accept {}", challenge);
            match server.accept_challenge(&challenge.id).await {
                Ok(()) => {
                    Metrics::incr(&self.metrics.challenges_accepted);
                    self.reservations
                        .insert(challenge.id.clone(), Timer::new(self.accept_timeout));
                    self.active.insert(challenge.id);
                    self.log_count("Queued");
                }
                Err(e) if e.is_not_found() => info!("Skip missing {}", challenge),
                Err(error) => failures.push(AcceptFailure {
                    challenge_id: challenge.id,
                    error,
                }),
            }
        }

        self.metrics
            .challenges_pending
            .store(registry.len() as u64, Ordering::Relaxed);
        self.sync_gauges();
        failures
    }

    /// Accepted challenges whose game never started give their slot back
    pub fn release_stale_reservations(&mut self) {
        let stale: Vec<SessionId> = self
            .reservations
            .iter()
            .filter(|(_, timer)| timer.is_expired())
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in stale {
            warn!("Accepted challenge {} never started, releasing its slot", session_id);
            self.reservations.remove(&session_id);
            if self.active.remove(&session_id) {
                self.log_count("Freed");
            }
        }
    }

    fn log_count(&self, change: &str) {
        let symbol = if change == "Freed" { "+++" } else { "---" };
        let ids = if self.active.is_empty() {
            "None".to_string()
        } else {
            self.active_ids().join(", ")
        };
        info!(
            "{} Process {}. Count: {}. IDs: {}",
            symbol,
            change,
            self.active.len(),
            ids
        );
    }

    fn sync_gauges(&self) {
        self.metrics
            .sessions_active
            .store(self.active.len() as u64, Ordering::Relaxed);
        self.metrics
            .sessions_queued_low_time
            .store(self.low_time.len() as u64, Ordering::Relaxed);
        self.metrics
            .workers_busy
            .store(self.pool.busy() as u64, Ordering::Relaxed);
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.max_concurrency
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active.contains(session_id)
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.running.contains(session_id)
    }

    /// Active ids in a stable order
    pub fn active_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.active.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn low_time_len(&self) -> usize {
        self.low_time.len()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }
}
