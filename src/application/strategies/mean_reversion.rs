use super::sizing::SizingEngine;
use super::trailing_stop::TrailingStop;
use crate::domain::errors::PluginError;
use crate::domain::ports::{SizingRequest, Strategy};
use crate::domain::trading::timeseries::Timeseries;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::BollingerBands;

/// Mean Reversion Strategy
///
/// Scores the z-score of the latest price against a rolling window: a price
/// stretched below the mean is a buy, above the mean a sell. Inside
/// `entry_z` standard deviations there is no trade.
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    pub period: usize,
    pub entry_z: f64,
    stop: TrailingStop,
    sizing: SizingEngine,
}

impl MeanReversionStrategy {
    pub fn new(
        period: usize,
        entry_z: f64,
        stop: TrailingStop,
        sizing: SizingEngine,
    ) -> Result<Self, PluginError> {
        if period < 2 || entry_z <= 0.0 {
            return Err(PluginError::InvalidInput {
                model: "mean_reversion".to_string(),
                reason: format!("need period >= 2 and entry_z > 0, got {} / {}", period, entry_z),
            });
        }
        Ok(Self {
            period,
            entry_z,
            stop,
            sizing,
        })
    }

    fn zscore(&self, history: &Timeseries, last: f64) -> Result<Option<f64>, PluginError> {
        let mut bands =
            BollingerBands::new(self.period, 1.0).map_err(|e| PluginError::Indicator {
                indicator: "bollinger bands".to_string(),
                reason: format!("{:?}", e),
            })?;

        let mut output = None;
        for price in history.tail_prices_f64(self.period) {
            output = Some(bands.next(price));
        }

        Ok(output.and_then(|bb| {
            // multiplier 1.0: the band half-width is one standard deviation
            let sd = bb.upper - bb.average;
            if sd > f64::EPSILON {
                Some((last - bb.average) / sd)
            } else {
                None
            }
        }))
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "mean_reversion"
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
            return Ok(-1.0);
        }

        if history.len() < self.period {
            return Ok(0.0);
        }

        let Some(z) = self.zscore(history, last.to_f64().unwrap_or(0.0))? else {
            return Ok(0.0);
        };

        if z.abs() < self.entry_z {
            return Ok(0.0);
        }

        Ok((-z / (2.0 * self.entry_z)).clamp(-1.0, 1.0))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> MeanReversionStrategy {
        MeanReversionStrategy::new(
            5,
            1.0,
            TrailingStop::new(0.05).unwrap(),
            SizingEngine::new(0.1).unwrap(),
        )
        .unwrap()
    }

    fn series(prices: &[i64]) -> Timeseries {
        let mut ts = Timeseries::new();
        for (i, p) in prices.iter().enumerate() {
            ts.push(Decimal::from(*p), i as i64);
        }
        ts
    }

    #[test]
    fn test_drop_below_mean_is_a_buy() {
        let s = strategy();
        let strength = s.calc_strength(&series(&[100, 100, 100, 100, 80]), None).unwrap();
        assert!(strength > 0.0, "expected buy, got {}", strength);
    }

    #[test]
    fn test_spike_above_mean_is_a_sell() {
        let s = strategy();
        let strength = s.calc_strength(&series(&[100, 100, 100, 100, 120]), None).unwrap();
        assert!(strength < 0.0, "expected sell, got {}", strength);
    }

    #[test]
    fn test_constant_prices_are_neutral() {
        let s = strategy();
        assert_eq!(
            s.calc_strength(&series(&[100, 100, 100, 100, 100]), None).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_warmup_is_neutral() {
        let s = strategy();
        assert_eq!(s.calc_strength(&series(&[100, 80]), None).unwrap(), 0.0);
    }
}
