mod mean_reversion;
mod passive;
mod sizing;
mod sma_crossover;
mod trailing_stop;

pub use mean_reversion::MeanReversionStrategy;
pub use passive::PassiveStrategy;
pub use sizing::SizingEngine;
pub use sma_crossover::SmaCrossoverStrategy;
pub use trailing_stop::TrailingStop;

use crate::config::StrategyConfig;
use crate::domain::errors::PluginError;
use crate::domain::ports::Strategy;
use std::sync::Arc;

pub const STRATEGY_IDS: [&str; 3] = ["sma_crossover", "mean_reversion", "passive"];

pub struct StrategyFactory;

impl StrategyFactory {
    /// Resolves a strategy id into a plugin handle shared by every worker
    pub fn create(id: &str, config: &StrategyConfig) -> Result<Arc<dyn Strategy>, PluginError> {
        let strategy: Arc<dyn Strategy> = match id.to_lowercase().as_str() {
            "sma_crossover" => Arc::new(SmaCrossoverStrategy::new(
                config.fast_sma_period,
                config.slow_sma_period,
                config.sensitivity,
                TrailingStop::new(config.trailing_stop_pct)?,
                SizingEngine::new(config.max_position_pct)?,
            )?),
            "mean_reversion" => Arc::new(MeanReversionStrategy::new(
                config.mean_reversion_period,
                config.mean_reversion_entry_z,
                TrailingStop::new(config.trailing_stop_pct)?,
                SizingEngine::new(config.max_position_pct)?,
            )?),
            "passive" => Arc::new(PassiveStrategy),
            _ => {
                return Err(PluginError::Unknown {
                    kind: "strategy",
                    id: id.to_string(),
                });
            }
        };
        Ok(strategy)
    }
}
