//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables once at startup and
//! handed to the constructors that need it. The `.env` file is used for local
//! development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where and how the external provisioning tool is run.
#[derive(Clone, Debug)]
pub struct KopsConfig {
    pub program: PathBuf,
    /// Leading arguments placed before the mode (`create` / `delete`).
    pub extra_args: Vec<String>,
    /// Parent of the per-session working directories.
    pub work_dir: PathBuf,
    pub timeout: Duration,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub auth_expire: Duration,
    pub cleanup_interval: Duration,
    pub known_domains: Vec<String>,
    pub kops: KopsConfig,
}

const DEFAULT_AUTH_EXPIRE_SECS: u64 = 8760 * 60 * 60;
const DEFAULT_KOPS_TIMEOUT_SECS: u64 = 60 * 60;

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Storage Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./kuberstack-installer.db".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Session Lifetime ---
        let auth_expire =
            Duration::from_secs(secs_var("AUTH_EXPIRE_SECS")?.unwrap_or(DEFAULT_AUTH_EXPIRE_SECS));
        if auth_expire.is_zero() {
            return Err(ConfigError::InvalidValue(
                "AUTH_EXPIRE_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let cleanup_interval = match secs_var("CLEANUP_INTERVAL_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue(
                    "CLEANUP_INTERVAL_SECS".to_string(),
                    "must be greater than zero".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => (auth_expire / 2).max(Duration::from_secs(1)),
        };

        let known_domains = std::env::var("KNOWN_DOMAINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        // --- Provisioning Tool ---
        let program = std::env::var("KOPS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("kops"));
        let extra_args = std::env::var("KOPS_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let work_dir = std::env::var("KOPS_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("kuberstack-installer"));
        let timeout = Duration::from_secs(
            secs_var("KOPS_TIMEOUT_SECS")?.unwrap_or(DEFAULT_KOPS_TIMEOUT_SECS),
        );

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            auth_expire,
            cleanup_interval,
            known_domains,
            kops: KopsConfig {
                program,
                extra_args,
                work_dir,
                timeout,
            },
        })
    }
}

fn secs_var(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
