use crate::domain::errors::PluginError;
use crate::domain::ports::{SizingRequest, Strategy};
use crate::domain::trading::timeseries::Timeseries;
use rust_decimal::Decimal;

/// Never trades. Used as a control run and for pipeline tests.
#[derive(Debug, Clone, Default)]
pub struct PassiveStrategy;

impl Strategy for PassiveStrategy {
    fn name(&self) -> &str {
        "passive"
    }

    fn calc_strength(
        &self,
        _history: &Timeseries,
        _stoploss: Option<Decimal>,
    ) -> Result<f64, PluginError> {
        Ok(0.0)
    }

    fn calc_stoploss(
        &self,
        history: &Timeseries,
        prior: Option<Decimal>,
    ) -> Result<Decimal, PluginError> {
        Ok(prior.or(history.last_price()).unwrap_or(Decimal::ZERO))
    }

    fn calc_quantity(&self, _request: &SizingRequest<'_>) -> Result<Decimal, PluginError> {
        Ok(Decimal::ZERO)
    }
}
