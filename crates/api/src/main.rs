//! Nutmart API server.
//!
//! One binary serves all three portals under `/api`: the storefront,
//! the back-office (`/api/admin`) and the agent dashboard (`/api/agent`).
//! Shop data and login sessions both live in `PostgreSQL`.
//!
//! Migrations are NOT run on startup. Run them via:
//! `cargo run -p nutmart-cli -- migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::process::ExitCode;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nutmart_api::config::ApiConfig;
use nutmart_api::state::AppState;
use nutmart_api::{app, db, middleware};

const DEFAULT_LOG_FILTER: &str = "nutmart_api=info,tower_http=debug";

/// Start Sentry when a DSN is configured. The guard flushes on drop.
fn init_sentry(config: &ApiConfig) -> Option<sentry::ClientInitGuard> {
    let sentry = &config.sentry;
    let dsn = sentry.dsn.as_deref()?;
    let options = sentry::ClientOptions {
        release: sentry::release_name!(),
        environment: sentry.environment.clone().map(Into::into),
        sample_rate: sentry.sample_rate,
        traces_sample_rate: sentry.traces_sample_rate,
        attach_stacktrace: true,
        ..Default::default()
    };
    Some(sentry::init((dsn, options)))
}

/// Install the tracing subscriber.
///
/// Logs are JSON in production and plain text elsewhere. Warnings and errors
/// become Sentry events; info and debug lines become breadcrumbs.
fn init_tracing(config: &ApiConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = config.sentry.is_production();

    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(sentry_layer)
        .init();
}

async fn serve(config: ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    let sessions = middleware::create_session_layer(&pool, &config);
    let addr = config.socket_addr();
    let router = app(AppState::new(config, pool), sessions)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "nutmart-api listening");

    // Peer addresses feed the rate limiter when no proxy header is present
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

// Tracing is not installed yet when configuration fails
#[allow(clippy::print_stderr)]
#[tokio::main]
async fn main() -> ExitCode {
    let config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Sentry first so the tracing layer has a client to report to
    let _sentry = init_sentry(&config);
    init_tracing(&config);

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "nutmart-api failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received, draining connections");
}
