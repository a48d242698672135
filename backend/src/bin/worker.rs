//! Background worker entry point: polls the durable job queue, drives the
//! scheduling orchestrator, and periodically plans the next cadence fires.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mockable::{Clock, DefaultClock};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use gamenight_backend::domain::ports::{JobStore, TokenAnalyticsRepository, TokenRepository};
use gamenight_backend::domain::{
    OrchestratorDeps, PromptLifecycle, SchedulingOrchestrator, SigningContext, TokenCodec,
    TokenService,
};
use gamenight_backend::outbound::email::LoggingMailer;
use gamenight_backend::outbound::persistence::{
    DbPool, DieselAnalyticsRepository, DieselGroupDirectory, DieselPromptRepository,
    DieselResponseRepository, DieselSettingsRepository, DieselSuggestionRepository,
    DieselTokenRepository, PoolConfig,
};
use gamenight_backend::outbound::queue::{DieselJobQueue, DieselJobStore, WorkerPool};

#[derive(Debug, Parser)]
#[command(name = "worker", about = "Availability scheduling background worker")]
struct Args {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// HMAC secret for signing availability-form tokens.
    #[arg(long, env = "TOKEN_SECRET", hide_env_values = true)]
    token_secret: String,
    /// Base URL availability-form links are built on.
    #[arg(long, env = "FORM_BASE_URL", default_value = "http://localhost:8080")]
    form_base_url: String,
    /// Seconds between cadence planning passes.
    #[arg(long, env = "CADENCE_PLAN_INTERVAL_SECS", default_value_t = 3_600)]
    cadence_plan_interval_secs: u64,
    /// Seconds an idle family poller sleeps between claims.
    #[arg(long, env = "QUEUE_POLL_INTERVAL_SECS", default_value_t = 5)]
    queue_poll_interval_secs: u64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = Args::parse();

    let pool = DbPool::new(PoolConfig::new(&args.database_url))
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let tokens: Arc<dyn TokenRepository> = Arc::new(DieselTokenRepository::new(pool.clone()));
    let analytics: Arc<dyn TokenAnalyticsRepository> =
        Arc::new(DieselAnalyticsRepository::new(pool.clone()));
    let prompts = Arc::new(DieselPromptRepository::new(pool.clone()));
    let responses = Arc::new(DieselResponseRepository::new(pool.clone()));
    let suggestions = Arc::new(DieselSuggestionRepository::new(pool.clone()));
    let settings = Arc::new(DieselSettingsRepository::new(pool.clone()));
    let directory = Arc::new(DieselGroupDirectory::new(pool.clone()));
    let queue = Arc::new(DieselJobQueue::new(pool.clone()));
    let store: Arc<dyn JobStore> = Arc::new(DieselJobStore::new(pool.clone()));

    let codec = TokenCodec::new(SigningContext::from_secret(args.token_secret.as_bytes()));
    let token_service = Arc::new(TokenService::new(
        codec,
        tokens,
        analytics.clone(),
        clock.clone(),
    ));

    let lifecycle = Arc::new(PromptLifecycle::new(
        prompts.clone(),
        suggestions.clone(),
        clock.clone(),
    ));
    let orchestrator = Arc::new(SchedulingOrchestrator::new(OrchestratorDeps {
        tokens: token_service,
        lifecycle,
        prompts,
        responses,
        suggestions,
        settings,
        directory,
        mailer: Arc::new(LoggingMailer::new()),
        queue,
        clock: clock.clone(),
        form_base_url: args.form_base_url,
    }));

    let workers = WorkerPool::new(orchestrator.clone(), store, clock)
        .with_poll_interval(Duration::from_secs(args.queue_poll_interval_secs))
        .spawn();

    let planner = {
        let orchestrator = orchestrator.clone();
        let interval = Duration::from_secs(args.cadence_plan_interval_secs);
        tokio::spawn(async move {
            loop {
                match orchestrator.plan_cadence().await {
                    Ok(enqueued) => info!(enqueued, "cadence planning pass complete"),
                    Err(err) => error!(error = %err, "cadence planning pass failed"),
                }
                tokio::time::sleep(interval).await;
            }
        })
    };

    info!("worker running; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    planner.abort();
    workers.shutdown().await;
    Ok(())
}
