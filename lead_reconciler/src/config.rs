//! Application configuration: parsing, validation, and loading.
//!
//! One TOML file describes the database, the account time zone, the commerce
//! and ads clients, the worker pool and logging. Every section is optional
//! except `[ads]`, whose account ids have no sensible default. Secrets never
//! live in the file; clients read them from the environment.
//!
//! ```toml
//! database_url = "sqlite:leads.db"
//! timezone = "America/New_York"
//!
//! [ads]
//! customer_id = "123-456-7890"
//! conversion_action = "987654321"
//!
//! [worker]
//! concurrency = 2
//! ```
//!
//! Entrypoints: [`load_config_str`] and [`load_config_path`]. `DATABASE_URL`
//! in the environment overrides `database_url`.

use std::{path::Path, time::Duration};

use ad_conversions::uploader::google_ads::GoogleAdsSettings;
use anyhow::Context;
use chrono_tz::Tz;
use commerce_orders::providers::shopmonkey::ShopmonkeySettings;
use serde::{Deserialize, Serialize};
use shared_utils::{env::get_env_var_opt, tz::parse_zone};
use thiserror::Error;

use crate::observability::LogFormat;

/// Environment variable overriding [`AppConfig::database_url`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Semantic problems found after parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown time zone {0:?}")]
    UnknownZone(String),
    #[error("worker.concurrency must be at least 1")]
    NoWorkers,
    #[error("ads.{0} must be set")]
    MissingAdsSetting(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// IANA zone used for wall-clock timestamps without an offset.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub commerce: ShopmonkeySettings,
    pub ads: GoogleAdsSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_database_url() -> String {
    "sqlite:lead_reconciler.db".into()
}

fn default_timezone() -> String {
    "UTC".into()
}

/// Worker pool and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkerSettings {
    /// Concurrent reconciliation loops, each with its own connection.
    pub concurrency: usize,
    /// Idle sleep between empty polls.
    pub poll_interval_ms: u64,
    /// Lease duration; expired leases are reclaimed.
    pub lease_ttl_secs: u64,
    /// How long an attempt holds its lead while uploading.
    pub claim_ttl_secs: u64,
    /// Retries after the first run before a task is failed.
    pub max_retries: u32,
    /// SQLite busy timeout for worker connections.
    pub busy_timeout_ms: u64,
    /// Commerce API unavailable.
    pub short_backoff_secs: u64,
    /// A conversion upload failed.
    pub medium_backoff_secs: u64,
    /// No orders yet, or none finalized.
    pub long_backoff_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1_000,
            lease_ttl_secs: 300,
            claim_ttl_secs: 600,
            max_retries: 3,
            busy_timeout_ms: 30_000,
            short_backoff_secs: 30,
            medium_backoff_secs: 2 * 60 * 60,
            long_backoff_secs: 24 * 60 * 60,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSettings {
    pub format: LogFormat,
}

impl AppConfig {
    /// The configured zone. Valid after [`AppConfig::validate`].
    pub fn zone(&self) -> Result<Tz, ConfigError> {
        parse_zone(&self.timezone).map_err(|_| ConfigError::UnknownZone(self.timezone.clone()))
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zone()?;
        if self.worker.concurrency == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.ads.customer_id_digits().is_empty() {
            return Err(ConfigError::MissingAdsSetting("customer_id"));
        }
        if self.ads.conversion_action.trim().is_empty() {
            return Err(ConfigError::MissingAdsSetting("conversion_action"));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = get_env_var_opt(DATABASE_URL_ENV) {
            self.database_url = url;
        }
    }
}

/// Parse and validate a TOML string, then apply environment overrides.
pub fn load_config_str(s: &str) -> anyhow::Result<AppConfig> {
    let mut cfg: AppConfig = toml::from_str(s).context("invalid config TOML")?;
    cfg.validate()?;
    cfg.apply_env_overrides();
    Ok(cfg)
}

/// Read a TOML file and delegate to [`load_config_str`].
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    load_config_str(&s).with_context(|| format!("loading config {}", path.display()))
}
