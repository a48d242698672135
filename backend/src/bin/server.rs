//! HTTP server entry point: runs migrations, wires the Diesel adapters into
//! the domain services, and serves the REST surface.

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use clap::Parser;
use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use mockable::{Clock, DefaultClock};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use gamenight_backend::domain::ports::{TokenAnalyticsRepository, TokenRepository};
use gamenight_backend::domain::{
    AvailabilityService, OrchestratorDeps, PromptLifecycle, SchedulingOrchestrator,
    SigningContext, TokenCodec, TokenService,
};
use gamenight_backend::inbound::http::health::HealthState;
use gamenight_backend::inbound::http::routes;
use gamenight_backend::inbound::http::state::HttpState;
use gamenight_backend::outbound::email::LoggingMailer;
use gamenight_backend::outbound::persistence::{
    DbPool, DieselAnalyticsRepository, DieselGroupDirectory, DieselPromptRepository,
    DieselResponseRepository, DieselSettingsRepository, DieselSuggestionRepository,
    DieselTokenRepository, PoolConfig,
};
use gamenight_backend::outbound::queue::DieselJobQueue;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, Parser)]
#[command(name = "server", about = "Availability scheduling HTTP server")]
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
    /// Address and port to bind.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,
    /// Skip applying pending migrations at startup.
    #[arg(long, env = "SKIP_MIGRATIONS")]
    skip_migrations: bool,
}

fn run_migrations(database_url: &str) -> std::io::Result<()> {
    let mut conn = PgConnection::establish(database_url)
        .map_err(|err| std::io::Error::other(format!("database connection failed: {err}")))?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| std::io::Error::other(format!("migrations failed: {err}")))?;
    info!(count = applied.len(), "applied pending migrations");
    Ok(())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = Args::parse();

    if args.skip_migrations {
        warn!("skipping migrations at operator request");
    } else {
        let database_url = args.database_url.clone();
        tokio::task::spawn_blocking(move || run_migrations(&database_url))
            .await
            .map_err(|err| std::io::Error::other(err.to_string()))??;
    }

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

    let codec = TokenCodec::new(SigningContext::from_secret(args.token_secret.as_bytes()));
    let token_service = Arc::new(TokenService::new(
        codec,
        tokens,
        analytics.clone(),
        clock.clone(),
    ));

    let availability = Arc::new(AvailabilityService::new(
        token_service.clone(),
        prompts.clone(),
        responses.clone(),
        suggestions.clone(),
        settings.clone(),
        directory.clone(),
        clock.clone(),
    ));

    let lifecycle = Arc::new(PromptLifecycle::new(
        prompts.clone(),
        suggestions.clone(),
        clock.clone(),
    ));
    let orchestrator = Arc::new(SchedulingOrchestrator::new(OrchestratorDeps {
        tokens: token_service.clone(),
        lifecycle,
        prompts,
        responses,
        suggestions,
        settings,
        directory,
        mailer: Arc::new(LoggingMailer::new()),
        queue,
        clock,
        form_base_url: args.form_base_url,
    }));

    let state = HttpState {
        availability,
        tokens: token_service,
        orchestrator,
        analytics,
    };

    let health = web::Data::new(HealthState::new());
    let server_health = health.clone();

    info!(bind = args.bind, "starting HTTP server");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_health.clone())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(args.bind)?
    .run();

    health.mark_ready();
    let result = server.await;
    health.mark_unhealthy();
    result
}
