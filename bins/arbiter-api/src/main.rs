mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use arbiter_common::config::Config;
use arbiter_judge::engine::{self, ExecutionClient};
use arbiter_judge::store::RedisStore;
use arbiter_judge::{HarnessRegistry, Judge, JudgeSettings, SubmissionService};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubmissionService>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Arbiter API booting...");

    let config = Config::from_env().context("Invalid configuration")?;

    let registry = HarnessRegistry::load(&config.languages_path)?;
    let engine = engine::from_config(&config).context("Failed to initialize execution engine")?;
    info!(engine = ?config.engine, "Execution engine ready");

    let judge = Judge::new(
        Arc::new(registry),
        ExecutionClient::new(engine, config.timeout_grace).with_setup_limit(config.setup_timeout),
        JudgeSettings::from(&config),
    );

    let store = Arc::new(
        RedisStore::connect(&config.redis_url, config.submission_ttl_secs)
            .await
            .context("Failed to connect to Redis")?,
    );
    info!(redis_url = %config.redis_url, "Connected to Redis");

    let service = SubmissionService::new(
        Arc::new(judge),
        store.clone(),
        store,
        config.default_timeout,
    );

    let state = Arc::new(AppState {
        service: Arc::new(service),
    });

    let app = Router::new()
        .merge(routes::routes())
        .layer(axum::middleware::from_fn(metrics::track_requests))
        .with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "HTTP server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
