use super::sizing::SizingEngine;
use super::trailing_stop::TrailingStop;
use crate::domain::errors::PluginError;
use crate::domain::ports::{SizingRequest, Strategy};
use crate::domain::trading::timeseries::Timeseries;
use rust_decimal::Decimal;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

/// Dual Simple Moving Average (SMA) crossover strategy
///
/// Strength is the relative gap between the fast and slow SMA, scaled by
/// `sensitivity` and clamped to [-1, 1]: positive while the fast average is
/// above the slow one, negative below. A close under the stop-loss forces a
/// full exit (-1).
#[derive(Debug, Clone)]
pub struct SmaCrossoverStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    pub sensitivity: f64,
    stop: TrailingStop,
    sizing: SizingEngine,
}

impl SmaCrossoverStrategy {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        sensitivity: f64,
        stop: TrailingStop,
        sizing: SizingEngine,
    ) -> Result<Self, PluginError> {
        if fast_period == 0 || fast_period >= slow_period {
            return Err(PluginError::InvalidInput {
                model: "sma_crossover".to_string(),
                reason: format!(
                    "need 0 < fast ({}) < slow ({})",
                    fast_period, slow_period
                ),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            sensitivity,
            stop,
            sizing,
        })
    }

    fn averages(&self, history: &Timeseries) -> Result<(f64, f64), PluginError> {
        let mut fast = SimpleMovingAverage::new(self.fast_period).map_err(|e| {
            PluginError::Indicator {
                indicator: "fast SMA".to_string(),
                reason: format!("{:?}", e),
            }
        })?;
        let mut slow = SimpleMovingAverage::new(self.slow_period).map_err(|e| {
            PluginError::Indicator {
                indicator: "slow SMA".to_string(),
                reason: format!("{:?}", e),
            }
        })?;

        let mut last = (0.0, 0.0);
        for price in history.tail_prices_f64(self.slow_period) {
            last = (fast.next(price), slow.next(price));
        }
        Ok(last)
    }
}

impl Strategy for SmaCrossoverStrategy {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn calc_strength(
        &self,
        history: &Timeseries,
        stoploss: Option<Decimal>,
    ) -> Result<f64, PluginError> {
        let Some(last) = history.last_price() else {
            return Ok(0.0);
        };

        if self.stop.is_breached(last, stoploss) {
            tracing::debug!("SmaCrossover: stop-loss breached at {}", last);
            return Ok(-1.0);
        }

        if history.len() < self.slow_period {
            return Ok(0.0);
        }

        let (fast, slow) = self.averages(history)?;
        if slow <= 0.0 {
            return Ok(0.0);
        }

        let gap = (fast - slow) / slow;
        Ok((gap * self.sensitivity).clamp(-1.0, 1.0))
    }

    fn calc_stoploss(
        &self,
        history: &Timeseries,
        prior: Option<Decimal>,
    ) -> Result<Decimal, PluginError> {
        Ok(self.stop.next_level(history, prior))
    }

    fn calc_quantity(&self, request: &SizingRequest<'_>) -> Result<Decimal, PluginError> {
        self.sizing.calculate_quantity(request)
    }
}
