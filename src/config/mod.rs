//! Configuration management for the loan matching engine
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::exposure::DEFAULT_EXPOSURE_CAP;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Seconds to wait for a pooled connection
    pub db_acquire_timeout_secs: u64,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// Maximum aggregate value of a borrower's unsealed requests
    pub exposure_cap: Decimal,

    /// Page size used by the lender feed when the caller gives none
    pub feed_default_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let db_acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u64>()
            .unwrap_or(5);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let exposure_cap = match env::var("EXPOSURE_CAP") {
            Ok(raw) => parse_exposure_cap(&raw)?,
            Err(_) => DEFAULT_EXPOSURE_CAP,
        };

        let feed_default_limit = match env::var("FEED_DEFAULT_LIMIT") {
            Ok(raw) => parse_feed_limit(&raw)?,
            Err(_) => 20,
        };

        Ok(Config {
            database_url,
            environment,
            db_max_connections,
            db_acquire_timeout_secs,
            log_level,
            exposure_cap,
            feed_default_limit,
        })
    }

    /// Get database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}

fn parse_exposure_cap(raw: &str) -> Result<Decimal, ConfigError> {
    let cap = Decimal::from_str(raw.trim()).map_err(|_| {
        ConfigError::InvalidValue(format!("EXPOSURE_CAP must be a decimal, got '{}'", raw))
    })?;
    if cap <= Decimal::ZERO {
        return Err(ConfigError::InvalidValue(
            "EXPOSURE_CAP must be positive".to_string(),
        ));
    }
    Ok(cap)
}

fn parse_feed_limit(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(limit) if (1..=100).contains(&limit) => Ok(limit),
        _ => Err(ConfigError::InvalidValue(format!(
            "FEED_DEFAULT_LIMIT must be between 1 and 100, got '{}'",
            raw
        ))),
    }
}
