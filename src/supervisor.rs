//! Orchestrator assembly and restart supervision

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use crate::client::{GameServer, MoveSelector, RulesEngine};
use crate::config::BotConfig;
use crate::control::event::control_channel;
use crate::control::{Dispatcher, RunOutcome};
use crate::metrics::Metrics;
use crate::scheduler::RunnerFactory;
use crate::session::SessionContext;
use crate::shutdown::{ShutdownState, ShutdownTrigger};

/// External collaborators shared across restarts
#[derive(Clone)]
pub struct Collaborators {
    pub server: Arc<dyn GameServer>,
    pub rules: Arc<dyn RulesEngine>,
    pub selector: Arc<dyn MoveSelector>,
}

/// Run the orchestrator once, until it stops or asks for a restart
pub async fn run_orchestrator(
    config: &BotConfig,
    collaborators: &Collaborators,
    metrics: Arc<Metrics>,
    shutdown: &ShutdownTrigger,
) -> anyhow::Result<RunOutcome> {
    let profile = collaborators
        .server
        .profile()
        .await
        .context("failed to fetch the bot profile")?;
    info!(
        "Connected to {} as {} and awaiting challenges",
        config.server_url, profile.username
    );

    let (control, events) = control_channel();

    #[cfg(feature = "webhook")]
    let listener = tokio::spawn(crate::control::webhook::serve(
        config.webhook_addr,
        control.clone(),
    ));

    let ctx = Arc::new(SessionContext {
        server: Arc::clone(&collaborators.server),
        rules: Arc::clone(&collaborators.rules),
        selector: Arc::clone(&collaborators.selector),
        profile: profile.clone(),
        config: config.session.clone(),
        drain_on_shutdown: config.quit_after_all_games_finish,
        metrics: Arc::clone(&metrics),
    });
    let factory = Arc::new(RunnerFactory::new(ctx, shutdown.subscribe()));

    let dispatcher = Dispatcher::new(
        config,
        Arc::clone(&collaborators.server),
        profile,
        factory,
        control,
        metrics,
    );
    let outcome = dispatcher.run(events, shutdown.subscribe()).await;

    #[cfg(feature = "webhook")]
    listener.abort();

    Ok(outcome)
}

/// Run `start` again after `delay` whenever it asks for a restart or fails
///
/// Restarts stop once a shutdown was requested. With restarts disabled a
/// failure is returned to the caller.
pub async fn supervise<F, Fut>(
    restart_enabled: bool,
    delay: Duration,
    shutdown: &ShutdownTrigger,
    mut start: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<RunOutcome>>,
{
    let mut watch = shutdown.subscribe();

    loop {
        let restart = match start().await {
            Ok(outcome) => outcome.restart,
            Err(e) if restart_enabled => {
                error!("Orchestrator failed: {:#}", e);
                true
            }
            Err(e) => return Err(e),
        };

        if !restart || !restart_enabled || !watch.is_running() {
            info!("Stopped");
            return Ok(());
        }

        info!("Restarting in {} seconds", delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = watch.reached(ShutdownState::Graceful) => {
                info!("Stopped");
                return Ok(());
            }
        }
    }
}
