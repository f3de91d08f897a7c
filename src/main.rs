//! Loan Matching Engine bootstrap
//!
//! Loads configuration, prepares the database schema and verifies that the
//! engine can be wired against it. The engine carries no network surface of
//! its own; embedding services construct `AppState` the same way.

use std::sync::Arc;

use anyhow::Context;
use loanmatch_engine::config::Config;
use loanmatch_engine::db;
use loanmatch_engine::storage::{MatchStorage, PostgresStorage};
use loanmatch_engine::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        exposure_cap = %config.exposure_cap,
        "Starting loan matching engine"
    );

    let pool = db::bootstrap(&config)
        .await
        .context("Database bootstrap failed")?;

    let store: Arc<dyn MatchStorage> = Arc::new(PostgresStorage::new(pool.clone()));
    let state = AppState::from_config(store, &config);

    let totals = state
        .feed
        .list_open_requests(uuid::Uuid::nil(), Default::default())
        .await
        .context("Engine self-check failed")?;

    tracing::info!(
        open_requests = totals.total,
        open_value = %totals.aggregate_value,
        "Loan matching engine ready"
    );

    pool.close().await;
    Ok(())
}
