//! Application configuration loaded from environment variables.

use std::time::Duration;

use grant_ledger::RetryPolicy;

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Grants a newly provisioned user starts with
    pub default_grants: i64,
    /// How long a writer waits on a locked database before giving up
    pub lock_timeout: Duration,
    /// Contended transfer attempts before answering `Busy`
    pub transfer_max_attempts: u32,
    /// Base delay between contended attempts
    pub transfer_backoff: Duration,
    /// Folder provisioning for new campaigns; `None` when disabled
    pub drive: Option<DriveConfig>,
}

/// Document-storage script endpoint used when a campaign is created.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub script_url: String,
    pub function: String,
    pub token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let drive_enabled: bool = parse_or("DRIVE_INTEGRATION", "false")?;
        let drive = if drive_enabled {
            Some(DriveConfig {
                script_url: env_var("APPS_SCRIPT_URL").map_err(|_| {
                    ApiError::Config(
                        "APPS_SCRIPT_URL is required when DRIVE_INTEGRATION is enabled"
                            .to_string(),
                    )
                })?,
                function: env_var("APPS_SCRIPT_FUNCTION")
                    .unwrap_or_else(|_| "createNewDreamFolder".to_string()),
                token: env_var("APPS_SCRIPT_TOKEN").ok(),
            })
        } else {
            None
        };

        let default_grants: i64 = parse_or("DEFAULT_GRANTS", "10")?;
        if default_grants < 0 {
            return Err(ApiError::Config(
                "DEFAULT_GRANTS must not be negative".to_string(),
            ));
        }

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./camps.db".to_string()),
            api_port: parse_or("API_PORT", "3001")?,
            default_grants,
            lock_timeout: Duration::from_millis(parse_or("LOCK_TIMEOUT_MS", "2000")?),
            transfer_max_attempts: parse_or("TRANSFER_MAX_ATTEMPTS", "5")?,
            transfer_backoff: Duration::from_millis(parse_or("TRANSFER_BACKOFF_MS", "20")?),
            drive,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.transfer_max_attempts,
            backoff: self.transfer_backoff,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ApiError::Config(format!("Invalid {key}")))
}
