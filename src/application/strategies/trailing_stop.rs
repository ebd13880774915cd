//! Percentage trailing stop.
//!
//! The level ratchets up behind the latest price and never moves down while
//! a position is open:
//!
//! ```rust
//! use rustbacktest::application::strategies::TrailingStop;
//! use rustbacktest::domain::trading::timeseries::Timeseries;
//! use rust_decimal::Decimal;
//!
//! let stop = TrailingStop::new(0.10).unwrap();
//! let mut history = Timeseries::new();
//! history.push(Decimal::from(100), 0);
//!
//! let level = stop.next_level(&history, None);
//! assert_eq!(level, Decimal::from(90));
//!
//! history.push(Decimal::from(80), 1);
//! assert_eq!(stop.next_level(&history, Some(level)), level);
//! ```

use crate::domain::errors::PluginError;
use crate::domain::trading::timeseries::Timeseries;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

#[derive(Debug, Clone)]
pub struct TrailingStop {
    trail: Decimal,
}

impl TrailingStop {
    pub fn new(trail_pct: f64) -> Result<Self, PluginError> {
        let trail = Decimal::from_f64(trail_pct)
            .filter(|t| *t > Decimal::ZERO && *t < Decimal::ONE)
            .ok_or_else(|| PluginError::InvalidInput {
                model: "trailing_stop".to_string(),
                reason: format!("trail must be in (0, 1), got {}", trail_pct),
            })?;
        Ok(Self { trail })
    }

    /// Next stop level from the latest price and the prior level.
    ///
    /// With no history the prior level is kept (zero when there is none, a
    /// level that can never be breached).
    pub fn next_level(&self, history: &Timeseries, prior: Option<Decimal>) -> Decimal {
        let floor = prior.unwrap_or(Decimal::ZERO);
        match history.last_price() {
            Some(last) => (last * (Decimal::ONE - self.trail)).round_dp(4).max(floor),
            None => floor,
        }
    }

    pub fn is_breached(&self, price: Decimal, level: Option<Decimal>) -> bool {
        matches!(level, Some(stop) if price < stop)
    }
}
