//! Prometheus-compatible metrics endpoint
//!
//! Exposes orchestrator metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics_server")]
pub use server::{router, start_metrics_server};

/// Metrics registry for the orchestrator
#[derive(Debug)]
pub struct Metrics {
    // Session slots
    pub sessions_active: AtomicU64,
    pub sessions_queued_low_time: AtomicU64,
    pub workers_busy: AtomicU64,
    pub sessions_started: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub sessions_aborted: AtomicU64,
    pub sessions_failed: AtomicU64,
    pub session_retries: AtomicU64,
    pub stream_reconnects: AtomicU64,

    // Challenges
    pub challenges_received: AtomicU64,
    pub challenges_accepted: AtomicU64,
    pub challenges_declined: AtomicU64,
    pub challenges_pending: AtomicU64,
    pub outbound_challenges: AtomicU64,

    // Play
    pub moves_played: AtomicU64,
    pub engine_errors: AtomicU64,

    // Dispatch loop timing (microseconds)
    pub events_dispatched: AtomicU64,
    pub dispatch_time_us: AtomicU64,
    pub dispatch_time_p95_us: AtomicU64,
    pub dispatch_time_p99_us: AtomicU64,
    pub dispatch_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling dispatch times for percentile calculation
    dispatch_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            sessions_queued_low_time: AtomicU64::new(0),
            workers_busy: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            sessions_aborted: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            session_retries: AtomicU64::new(0),
            stream_reconnects: AtomicU64::new(0),
            challenges_received: AtomicU64::new(0),
            challenges_accepted: AtomicU64::new(0),
            challenges_declined: AtomicU64::new(0),
            challenges_pending: AtomicU64::new(0),
            outbound_challenges: AtomicU64::new(0),
            moves_played: AtomicU64::new(0),
            engine_errors: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            dispatch_time_us: AtomicU64::new(0),
            dispatch_time_p95_us: AtomicU64::new(0),
            dispatch_time_p99_us: AtomicU64::new(0),
            dispatch_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            dispatch_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Bump a counter by one
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the handling time of one control event and update percentiles
    pub fn record_dispatch_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.dispatch_time_us.store(us, Ordering::Relaxed);

        let mut history = self.dispatch_history.write();
        history.push_back(us);

        // Keep last 1000 samples
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.dispatch_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.dispatch_time_p99_us
                .store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.dispatch_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Sessions
        metric!("gambit_sessions_active", "Sessions occupying a slot", "gauge",
            self.sessions_active.load(Ordering::Relaxed));
        metric!("gambit_sessions_low_time_queued", "Sessions waiting in the low-time queue", "gauge",
            self.sessions_queued_low_time.load(Ordering::Relaxed));
        metric!("gambit_workers_busy", "Workers holding a pool permit", "gauge",
            self.workers_busy.load(Ordering::Relaxed));
        metric!("gambit_sessions_started_total", "Session runners started", "counter",
            self.sessions_started.load(Ordering::Relaxed));
        metric!("gambit_sessions_completed_total", "Session runners completed", "counter",
            self.sessions_completed.load(Ordering::Relaxed));
        metric!("gambit_sessions_aborted_total", "Sessions aborted for inactivity", "counter",
            self.sessions_aborted.load(Ordering::Relaxed));
        metric!("gambit_sessions_failed_total", "Sessions that ended with an error", "counter",
            self.sessions_failed.load(Ordering::Relaxed));
        metric!("gambit_session_retries_total", "Session invocations retried after a fault", "counter",
            self.session_retries.load(Ordering::Relaxed));
        metric!("gambit_stream_reconnects_total", "Game streams reopened", "counter",
            self.stream_reconnects.load(Ordering::Relaxed));

        // Challenges
        metric!("gambit_challenges_received_total", "Incoming challenges", "counter",
            self.challenges_received.load(Ordering::Relaxed));
        metric!("gambit_challenges_accepted_total", "Challenges accepted", "counter",
            self.challenges_accepted.load(Ordering::Relaxed));
        metric!("gambit_challenges_declined_total", "Challenges declined", "counter",
            self.challenges_declined.load(Ordering::Relaxed));
        metric!("gambit_challenges_pending", "Eligible challenges waiting for a slot", "gauge",
            self.challenges_pending.load(Ordering::Relaxed));
        metric!("gambit_outbound_challenges_total", "Outbound challenges issued", "counter",
            self.outbound_challenges.load(Ordering::Relaxed));

        // Play
        metric!("gambit_moves_played_total", "Moves submitted", "counter",
            self.moves_played.load(Ordering::Relaxed));
        metric!("gambit_engine_errors_total", "Move selection failures", "counter",
            self.engine_errors.load(Ordering::Relaxed));

        // Dispatch loop
        metric!("gambit_events_dispatched_total", "Control events handled", "counter",
            self.events_dispatched.load(Ordering::Relaxed));
        metric!("gambit_dispatch_time_microseconds", "Last event handling time", "gauge",
            self.dispatch_time_us.load(Ordering::Relaxed));
        metric!("gambit_dispatch_time_p95_microseconds", "95th percentile event handling time", "gauge",
            self.dispatch_time_p95_us.load(Ordering::Relaxed));
        metric!("gambit_dispatch_time_p99_microseconds", "99th percentile event handling time", "gauge",
            self.dispatch_time_p99_us.load(Ordering::Relaxed));
        metric!("gambit_dispatch_time_max_microseconds", "Maximum event handling time", "gauge",
            self.dispatch_time_max_us.load(Ordering::Relaxed));
        metric!("gambit_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "sessions": {
                "active": load(&self.sessions_active),
                "low_time_queued": load(&self.sessions_queued_low_time),
                "workers_busy": load(&self.workers_busy),
                "started": load(&self.sessions_started),
                "completed": load(&self.sessions_completed),
                "aborted": load(&self.sessions_aborted),
                "failed": load(&self.sessions_failed),
                "retries": load(&self.session_retries),
                "stream_reconnects": load(&self.stream_reconnects),
            },
            "challenges": {
                "received": load(&self.challenges_received),
                "accepted": load(&self.challenges_accepted),
                "declined": load(&self.challenges_declined),
                "pending": load(&self.challenges_pending),
                "outbound": load(&self.outbound_challenges),
            },
            "play": {
                "moves": load(&self.moves_played),
                "engine_errors": load(&self.engine_errors),
            },
            "dispatch": {
                "events": load(&self.events_dispatched),
                "time_us": load(&self.dispatch_time_us),
                "time_p95_us": load(&self.dispatch_time_p95_us),
                "time_p99_us": load(&self.dispatch_time_p99_us),
                "time_max_us": load(&self.dispatch_time_max_us),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics_server")]
mod server {
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::header::CONTENT_TYPE;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;
    use tracing::info;

    use super::Metrics;

    const PROMETHEUS: &str = "text/plain; version=0.0.4";

    /// Routes for the metrics endpoint
    pub fn router(metrics: Arc<Metrics>) -> Router {
        Router::new()
            .route("/metrics", get(prometheus))
            .route("/metrics/json", get(json))
            .route("/health", get(health))
            .route("/", get(health))
            .with_state(metrics)
    }

    /// Start the metrics HTTP server
    pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr).await?;

        info!("Metrics server listening on http://{}/metrics", addr);

        axum::serve(listener, router(metrics)).await?;
        Ok(())
    }

    async fn prometheus(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
        ([(CONTENT_TYPE, PROMETHEUS)], metrics.to_prometheus())
    }

    async fn json(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
        ([(CONTENT_TYPE, "application/json")], metrics.to_json())
    }

    async fn health() -> &'static str {
        "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.events_dispatched.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_dispatch_time() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_dispatch_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.events_dispatched.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.dispatch_history.read().len(), 100);
        assert!(metrics.dispatch_time_p95_us.load(Ordering::Relaxed) > 0);
        assert!(metrics.dispatch_time_p99_us.load(Ordering::Relaxed) > 0);
        assert_eq!(metrics.dispatch_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.sessions_active.store(3, Ordering::Relaxed);
        Metrics::incr(&metrics.moves_played);
        Metrics::incr(&metrics.moves_played);

        let output = metrics.to_prometheus();

        assert!(output.contains("gambit_sessions_active 3"));
        assert!(output.contains("gambit_moves_played_total 2"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.challenges_accepted.store(7, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["challenges"]["accepted"], 7);
        assert_eq!(value["sessions"]["active"], 0);
    }

    #[cfg(feature = "metrics_server")]
    #[tokio::test]
    async fn test_routes() {
        use axum::body::{to_bytes, Body};
        use axum::http::{Request, StatusCode};
        use std::sync::Arc;
        use tower::ServiceExt;

        let metrics = Arc::new(Metrics::new());
        metrics.sessions_active.store(2, Ordering::Relaxed);

        let get = |path: &str| Request::get(path).body(Body::empty()).unwrap();

        let response = router(metrics.clone()).oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain; version=0.0.4");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("gambit_sessions_active 2"));

        let response = router(metrics.clone()).oneshot(get("/metrics/json")).await.unwrap();
        assert_eq!(response.headers()["content-type"], "application/json");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["sessions"]["active"], 2);

        let response = router(metrics.clone()).oneshot(get("/health")).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");

        let response = router(metrics.clone()).oneshot(get("/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let post = Request::post("/metrics").body(Body::empty()).unwrap();
        let response = router(metrics).oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
