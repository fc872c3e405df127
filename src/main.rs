use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gambit_bot::client::http::{HttpGameServer, HttpMoveSelector};
use gambit_bot::client::ServerReportedRules;
use gambit_bot::config::BotConfig;
use gambit_bot::metrics::Metrics;
use gambit_bot::shutdown::shutdown_channel;
use gambit_bot::supervisor::{run_orchestrator, supervise, Collaborators};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Gambit Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = BotConfig::load_or_default();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: server={}, concurrency={}, matchmaking={}",
        config.server_url, config.challenge.concurrency, config.matchmaking.enabled
    );

    let metrics = Arc::new(Metrics::new());

    #[cfg(feature = "metrics_server")]
    if let Some(port) = config.metrics_port {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = gambit_bot::metrics::start_metrics_server(metrics, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let collaborators = Collaborators {
        server: Arc::new(
            HttpGameServer::new(&config.server_url, &config.token)
                .context("failed to build game server client")?,
        ),
        rules: Arc::new(ServerReportedRules),
        selector: Arc::new(
            HttpMoveSelector::new(&config.engine_url)
                .context("failed to build move selection client")?,
        ),
    };

    let (trigger, _watch) = shutdown_channel();
    tokio::spawn(trigger.clone().listen_for_ctrl_c());

    let result = supervise(config.restart_enabled, config.restart_delay, &trigger, || {
        run_orchestrator(&config, &collaborators, Arc::clone(&metrics), &trigger)
    })
    .await;

    if let Err(e) = &result {
        error!("Quitting due to an error: {:#}", e);
    }
    result
}
