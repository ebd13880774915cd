use crate::domain::errors::PluginError;
use crate::domain::trading::positions::Positions;
use crate::domain::trading::timeseries::Timeseries;
use crate::domain::trading::types::{CashSnapshot, Order};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Inputs to position sizing
#[derive(Debug, Clone, Copy)]
pub struct SizingRequest<'a> {
    pub symbol: &'a str,
    pub price: Decimal,
    pub strength: f64,
    pub cash: Decimal,
    pub positions: &'a Positions,
}

/// Strategy plugin: scores conviction, trails stops and sizes orders.
///
/// Implementations must be deterministic and free of side effects. The
/// Analyzer calls the first two methods, the Broker the third.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn calc_strength(
        &self,
        history: &Timeseries,
        stoploss: Option<Decimal>,
    ) -> Result<f64, PluginError>;

    fn calc_stoploss(
        &self,
        history: &Timeseries,
        prior: Option<Decimal>,
    ) -> Result<Decimal, PluginError>;

    fn calc_quantity(&self, request: &SizingRequest<'_>) -> Result<Decimal, PluginError>;
}

/// Durable destination for executed orders and cash snapshots
#[async_trait]
pub trait LedgerSink: Send {
    async fn record_order(&mut self, order: &Order) -> Result<()>;
    async fn record_cash(&mut self, snapshot: &CashSnapshot) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
}
