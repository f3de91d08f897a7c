//! PostgreSQL pool setup for the matching engine
//!
//! `bootstrap` is the only entry point the binary needs: it opens the pool,
//! applies the schema under `migrations/` and confirms the store answers.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

/// Idle connections are recycled after this long
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Failure while preparing the matching store
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("cannot reach matching store: {0}")]
    Connect(String),

    #[error("matching schema migration failed: {0}")]
    Migrate(String),

    #[error("matching store did not answer a health query: {0}")]
    Unhealthy(String),
}

pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!(
        database = %config.database_url_masked(),
        environment = ?config.environment,
        "Opening matching store pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .idle_timeout(POOL_IDLE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::Connect(e.to_string()))?;

    tracing::info!(
        max_connections = config.db_max_connections,
        acquire_timeout_secs = config.db_acquire_timeout_secs,
        "Matching store pool ready"
    );

    Ok(pool)
}

/// Apply the loan matching schema (requests, proposals, overlays)
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::Migrate(e.to_string()))?;

    tracing::info!("Loan matching schema is current");
    Ok(())
}

pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>("SELECT count(*) FROM loan_requests WHERE funded_at IS NULL")
        .fetch_one(pool)
        .await
        .map(|open| tracing::debug!(open_requests = open, "Matching store answered"))
        .map_err(|e| DbError::Unhealthy(e.to_string()))
}

/// Connect, migrate and verify in one step
pub async fn bootstrap(config: &Config) -> Result<PgPool, DbError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    check_health(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_name_the_matching_store() {
        let err = DbError::Connect("connection refused".to_string());
        assert_eq!(err.to_string(), "cannot reach matching store: connection refused");
        assert!(DbError::Migrate("checksum".to_string())
            .to_string()
            .starts_with("matching schema migration failed"));
    }
}
