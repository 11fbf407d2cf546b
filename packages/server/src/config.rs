//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub admin_jwt_secret: String,
    /// Delivered webhook events older than this are pruned.
    pub webhook_prune_retention_days: i64,
    pub jobs: JobsConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_env("PORT", 8080)?,
            admin_jwt_secret: env::var("ADMIN_JWT_SECRET")
                .context("ADMIN_JWT_SECRET must be set")?,
            webhook_prune_retention_days: parse_env("WEBHOOK_PRUNE_RETENTION_DAYS", 30)?,
            jobs: JobsConfig::from_env()?,
        })
    }
}

/// Configuration for the jobs subsystem.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Master switch; when false only the legacy webhook pruner runs.
    pub enabled: bool,
    pub scheduler_enabled: bool,
    pub worker_count: usize,
    pub claim_interval: Duration,
    pub lease_duration: Duration,
    pub renew_interval: Duration,
    pub scheduler_tick_interval: Duration,
    pub recovery_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_jitter_fraction: f64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scheduler_enabled: true,
            worker_count: 4,
            claim_interval: Duration::from_millis(500),
            lease_duration: Duration::from_secs(60),
            renew_interval: Duration::from_secs(20),
            scheduler_tick_interval: Duration::from_secs(10),
            recovery_interval: Duration::from_secs(30),
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(300),
            backoff_jitter_fraction: 0.2,
        }
    }
}

impl JobsConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            enabled: parse_env("JOBS_ENABLED", true)?,
            scheduler_enabled: parse_env("JOBS_SCHEDULER_ENABLED", true)?,
            worker_count: parse_env("JOBS_WORKER_COUNT", 4usize)?,
            claim_interval: Duration::from_millis(parse_env("JOBS_CLAIM_INTERVAL_MS", 500u64)?),
            lease_duration: Duration::from_secs(parse_env("JOBS_LEASE_DURATION_SEC", 60u64)?),
            renew_interval: Duration::from_secs(parse_env("JOBS_RENEW_INTERVAL_SEC", 20u64)?),
            scheduler_tick_interval: Duration::from_secs(parse_env(
                "JOBS_SCHEDULER_TICK_INTERVAL_SEC",
                10u64,
            )?),
            recovery_interval: Duration::from_secs(parse_env("JOBS_RECOVERY_INTERVAL_SEC", 30u64)?),
            backoff_base: Duration::from_millis(parse_env("JOBS_BACKOFF_BASE_MS", 1000u64)?),
            backoff_cap: Duration::from_secs(parse_env("JOBS_BACKOFF_CAP_SEC", 300u64)?),
            backoff_jitter_fraction: parse_env("JOBS_BACKOFF_JITTER_FRACTION", 0.2f64)?,
        };

        if config.worker_count < 1 {
            anyhow::bail!("JOBS_WORKER_COUNT must be >= 1");
        }
        if !(0.0..=1.0).contains(&config.backoff_jitter_fraction) {
            anyhow::bail!("JOBS_BACKOFF_JITTER_FRACTION must be in [0, 1]");
        }

        Ok(config)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_defaults_match_documented_values() {
        let config = JobsConfig::default();
        assert!(config.enabled);
        assert!(config.scheduler_enabled);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.claim_interval, Duration::from_millis(500));
        assert_eq!(config.lease_duration, Duration::from_secs(60));
        assert_eq!(config.renew_interval, Duration::from_secs(20));
        assert_eq!(config.scheduler_tick_interval, Duration::from_secs(10));
        assert_eq!(config.recovery_interval, Duration::from_secs(30));
        assert_eq!(config.backoff_base, Duration::from_millis(1000));
        assert_eq!(config.backoff_cap, Duration::from_secs(300));
        assert!((config.backoff_jitter_fraction - 0.2).abs() < f64::EPSILON);
    }
}
