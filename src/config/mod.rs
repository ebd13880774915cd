//! Configuration module for the backtester.
//!
//! Settings are read from an optional TOML file (the `--config` flag, else
//! the path in `BACKTEST_CONFIG`) and then from environment variables, which take precedence. `.env` files
//! are loaded by the binary before any of this runs.

mod strategy_config;

pub use strategy_config::StrategyConfig;
use strategy_config::override_with;

use crate::application::strategies::StrategyFactory;
use crate::infrastructure::simulation::markets::MarketFactory;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Shape of the optional config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    market: Option<String>,
    strategy: Option<String>,
    ticks_dir: Option<PathBuf>,
    ledger_dir: Option<PathBuf>,
    initial_cash: Option<Decimal>,
    analyzer_shards: Option<usize>,
    channel_capacity: Option<usize>,
    reset_on_new_day: Option<bool>,
    strategy_params: Option<StrategyConfig>,
    listings: HashMap<String, String>,
}

/// Resolved configuration of one backtest run
#[derive(Debug, Clone)]
pub struct Config {
    pub market_id: String,
    pub strategy_id: String,
    pub ticks_dir: PathBuf,
    pub ledger_dir: PathBuf,
    pub initial_cash: Decimal,
    pub analyzer_shards: usize,
    pub channel_capacity: usize,
    pub reset_on_new_day: bool,
    pub strategy: StrategyConfig,
    /// symbol -> venue name
    pub listings: HashMap<String, String>,
}

impl Config {
    /// Reads the environment. An explicit `config_file` wins over `BACKTEST_CONFIG`.
    pub fn from_env(config_file: Option<&Path>) -> Result<Self> {
        Self::from_source(with_config_file(config_file, |key| env::var(key).ok()))
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `from_env` passes `std::env::var`; tests pass a map.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match lookup("BACKTEST_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                toml::from_str::<FileConfig>(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path))?
            }
            None => FileConfig::default(),
        };

        let market_id = lookup("MARKET")
            .or(file.market)
            .context("MARKET is required (env or config file)")?;
        let strategy_id = lookup("STRATEGY")
            .or(file.strategy)
            .context("STRATEGY is required (env or config file)")?;
        let ticks_dir = lookup("TICKS_DIR")
            .map(PathBuf::from)
            .or(file.ticks_dir)
            .context("TICKS_DIR is required (env or config file)")?;
        let ledger_dir = lookup("LEDGER_DIR")
            .map(PathBuf::from)
            .or(file.ledger_dir)
            .context("LEDGER_DIR is required (env or config file)")?;

        let mut initial_cash = file.initial_cash.unwrap_or(Decimal::from(1_000_000));
        override_with(&lookup, "INITIAL_CASH", &mut initial_cash)?;

        let mut analyzer_shards = file.analyzer_shards.unwrap_or_else(default_shards);
        override_with(&lookup, "ANALYZER_SHARDS", &mut analyzer_shards)?;

        let mut channel_capacity = file.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        override_with(&lookup, "CHANNEL_CAPACITY", &mut channel_capacity)?;

        let mut reset_on_new_day = file.reset_on_new_day.unwrap_or(false);
        override_with(&lookup, "RESET_ON_NEW_DAY", &mut reset_on_new_day)?;

        let mut strategy = file.strategy_params.unwrap_or_default();
        strategy.apply_overrides(&lookup)?;

        Ok(Self {
            market_id,
            strategy_id,
            ticks_dir,
            ledger_dir,
            initial_cash,
            analyzer_shards,
            channel_capacity,
            reset_on_new_day,
            strategy,
            listings: file.listings,
        })
    }

    /// Checks the configuration before the engine is built.
    ///
    /// Creates the ledger directory when it does not exist yet.
    pub fn validate(&self) -> Result<()> {
        if self.initial_cash <= Decimal::ZERO {
            anyhow::bail!("INITIAL_CASH must be positive, got {}", self.initial_cash);
        }
        if self.analyzer_shards == 0 {
            anyhow::bail!("ANALYZER_SHARDS must be at least 1");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("CHANNEL_CAPACITY must be at least 1");
        }
        if !self.ticks_dir.is_dir() {
            anyhow::bail!("TICKS_DIR {} is not a directory", self.ticks_dir.display());
        }
        std::fs::create_dir_all(&self.ledger_dir).with_context(|| {
            format!("Failed to create LEDGER_DIR {}", self.ledger_dir.display())
        })?;

        MarketFactory::create(&self.market_id, &self.listings)
            .with_context(|| format!("Invalid MARKET '{}'", self.market_id))?;
        StrategyFactory::create(&self.strategy_id, &self.strategy)
            .with_context(|| format!("Invalid STRATEGY '{}'", self.strategy_id))?;
        Ok(())
    }
}

/// One shard per core, leaving a core for the Router and Broker.
fn default_shards() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

fn with_config_file<F>(config_file: Option<&Path>, lookup: F) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let config_file = config_file.map(|path| path.display().to_string());
    move |key: &str| match (key, &config_file) {
        ("BACKTEST_CONFIG", Some(path)) => Some(path.clone()),
        _ => lookup(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MARKET", "krx"),
            ("STRATEGY", "passive"),
            ("TICKS_DIR", "/tmp/ticks"),
            ("LEDGER_DIR", "/tmp/ledger"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(lookup_from(&required())).unwrap();
        assert_eq!(config.market_id, "krx");
        assert_eq!(config.initial_cash, dec!(1000000));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.analyzer_shards >= 1);
        assert!(!config.reset_on_new_day);
        assert_eq!(config.strategy, StrategyConfig::default());
    }

    #[test]
    fn test_missing_required_key() {
        let err = Config::from_source(lookup_from(&[("MARKET", "krx")])).unwrap_err();
        assert!(err.to_string().contains("STRATEGY"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
market = "us"
strategy = "sma_crossover"
ticks_dir = "/data/ticks"
ledger_dir = "/data/ledger"
initial_cash = "50000"
analyzer_shards = 3

[strategy_params]
fast_sma_period = 4

[listings]
AAPL = "NASDAQ"
"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::from_source(lookup_from(&[
            ("BACKTEST_CONFIG", path.as_str()),
            ("ANALYZER_SHARDS", "2"),
            ("SLOW_SMA_PERIOD", "30"),
        ]))
        .unwrap();

        assert_eq!(config.market_id, "us");
        assert_eq!(config.initial_cash, dec!(50000));
        assert_eq!(config.analyzer_shards, 2);
        assert_eq!(config.strategy.fast_sma_period, 4);
        assert_eq!(config.strategy.slow_sma_period, 30);
        assert_eq!(config.listings.get("AAPL").map(String::as_str), Some("NASDAQ"));
    }

    #[test]
    fn test_config_flag_takes_precedence_over_env_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
market = "krx"
strategy = "passive"
ticks_dir = "/data/ticks"
ledger_dir = "/data/ledger"
"#
        )
        .unwrap();

        let lookup = with_config_file(
            Some(file.path()),
            lookup_from(&[("BACKTEST_CONFIG", "/does/not/exist.toml")]),
        );
        let config = Config::from_source(lookup).unwrap();
        assert_eq!(config.market_id, "krx");
        assert_eq!(config.strategy_id, "passive");

        let fallback = with_config_file(None, lookup_from(&[("BACKTEST_CONFIG", "/does/not/exist.toml")]));
        assert!(Config::from_source(fallback).is_err());
    }

    #[test]
    fn test_validate_creates_ledger_dir_and_resolves_plugins() {
        let ticks = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let ledger = root.path().join("out");

        let mut config = Config::from_source(lookup_from(&required())).unwrap();
        config.ticks_dir = ticks.path().to_path_buf();
        config.ledger_dir = ledger.clone();
        config.validate().unwrap();
        assert!(ledger.is_dir());

        config.strategy_id = "martingale".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_cash() {
        let mut config = Config::from_source(lookup_from(&required())).unwrap();
        config.initial_cash = Decimal::ZERO;
        assert!(config.validate().is_err());
    }
}
