use crate::metrics::MetricsConfig;
use crate::network::{Network, NetworkSpec};
use crate::units::PrecisionTable;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub network: Option<Network>,
    pub provider_urls: Vec<String>,
    pub database_url: String,
    pub max_blocks: Option<u64>,
    pub ignore_warning: bool,
    pub ignore_not_sync: bool,
    pub scan_interval: Duration,
    pub check_interval: Duration,
    pub is_prod: bool,
    pub precision: PrecisionTable,
    /// Ledger rows created before this instant are never audited.
    pub ledger_epoch: DateTime<Utc>,
    pub withdraw_create_tx_verify: bool,
    pub send_notifications: bool,
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let flag = |key: &str, default: bool| -> Result<bool> {
            match lookup(key) {
                Some(value) => parse_flag(&value).with_context(|| format!("Invalid {key}")),
                None => Ok(default),
            }
        };
        let seconds = |key: &str, default: u64| -> Result<Duration> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{key} must be a number of seconds")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let network = lookup("NETWORK")
            .map(|value| Network::from_str(&value))
            .transpose()?;

        let provider_urls = lookup("PROVIDER_URLS")
            .map(|urls| {
                urls.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:./recon.db".to_string());

        let max_blocks = lookup("MAX_BLOCKS")
            .map(|value| value.trim().parse::<u64>())
            .transpose()
            .context("MAX_BLOCKS must be a positive integer")?;

        let is_prod = flag("IS_PROD", false)?;

        let precision = match lookup("PRECISION_OVERRIDES") {
            Some(overrides) => PrecisionTable::default()
                .with_overrides(&overrides)
                .context("Invalid PRECISION_OVERRIDES")?,
            None => PrecisionTable::default(),
        };

        let ledger_epoch = match lookup("LEDGER_EPOCH") {
            Some(value) => DateTime::parse_from_rfc3339(value.trim())
                .context("LEDGER_EPOCH must be an RFC 3339 timestamp")?
                .with_timezone(&Utc),
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        let defaults = MetricsConfig::default();
        let metrics = MetricsConfig {
            enabled: flag("METRICS_ENABLED", is_prod)?,
            address: match lookup("METRICS_ADDRESS") {
                Some(value) => value
                    .trim()
                    .parse()
                    .context("METRICS_ADDRESS must be an IP address")?,
                None => defaults.address,
            },
            port: match lookup("METRICS_PORT") {
                Some(value) => value.trim().parse().context("METRICS_PORT must be a port number")?,
                None => defaults.port,
            },
        };

        Ok(Config {
            network,
            provider_urls,
            database_url,
            max_blocks,
            ignore_warning: flag("IGNORE_WARNING", false)?,
            ignore_not_sync: flag("IGNORE_NOT_SYNC", true)?,
            scan_interval: seconds("SCAN_INTERVAL_SECS", 12)?,
            check_interval: seconds("CHECK_INTERVAL_SECS", if is_prod { 5 } else { 120 })?,
            is_prod,
            precision,
            ledger_epoch,
            withdraw_create_tx_verify: flag("WITHDRAW_CREATE_TX_VERIFY", true)?,
            send_notifications: flag("SEND_NOTIFICATIONS", is_prod)?,
            metrics,
        })
    }

    /// Scanner parameters of the configured network with the environment
    /// overrides applied.
    pub fn network_spec(&self) -> Result<NetworkSpec> {
        let network = self
            .network
            .context("NETWORK must be set in .env")?;
        let mut spec = network
            .spec()
            .ok_or_else(|| anyhow!("Network {} has no block scanner", network))?;
        if let Some(max_blocks) = self.max_blocks {
            spec.max_blocks = max_blocks;
        }
        spec.ignore_warning = self.ignore_warning;
        spec.ignore_not_sync = self.ignore_not_sync;
        Ok(spec)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("not a boolean: {}", other)),
    }
}
