//! Strategy parameter parsing.
//!
//! Values come from the `[strategy_params]` table of the config file and can
//! be overridden one by one from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::str::FromStr;

/// Parameters shared by the built-in strategies
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    // SMA crossover
    pub fast_sma_period: usize,
    pub slow_sma_period: usize,
    pub sensitivity: f64,

    // Mean reversion
    pub mean_reversion_period: usize,
    pub mean_reversion_entry_z: f64,

    // Shared exits and sizing
    pub trailing_stop_pct: f64,
    pub max_position_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_sma_period: 5,
            slow_sma_period: 20,
            sensitivity: 50.0,
            mean_reversion_period: 20,
            mean_reversion_entry_z: 1.5,
            trailing_stop_pct: 0.05,
            max_position_pct: 0.1,
        }
    }
}

impl StrategyConfig {
    /// Applies environment overrides on top of the current values
    pub fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(lookup, "FAST_SMA_PERIOD", &mut self.fast_sma_period)?;
        override_with(lookup, "SLOW_SMA_PERIOD", &mut self.slow_sma_period)?;
        override_with(lookup, "SMA_SENSITIVITY", &mut self.sensitivity)?;
        override_with(lookup, "MEAN_REVERSION_PERIOD", &mut self.mean_reversion_period)?;
        override_with(lookup, "MEAN_REVERSION_ENTRY_Z", &mut self.mean_reversion_entry_z)?;
        override_with(lookup, "TRAILING_STOP_PCT", &mut self.trailing_stop_pct)?;
        override_with(lookup, "MAX_POSITION_PCT", &mut self.max_position_pct)?;
        Ok(())
    }
}

pub(crate) fn override_with<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}={}", key, raw))?;
    }
    Ok(())
}
