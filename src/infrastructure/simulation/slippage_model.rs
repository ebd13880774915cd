use rust_decimal::Decimal;
use std::fmt::Debug;

/// Trait defining a slippage simulation model.
pub trait SlippageModel: Debug + Send + Sync {
    /// Calculates the effective execution price for a signed order quantity.
    /// Must be deterministic: the same inputs always yield the same price.
    fn calculate_execution_price(&self, price: Decimal, quantity: Decimal) -> Decimal;
}

/// Market-impact slippage that grows linearly with order size.
///
/// Buys fill above the quote and sells below it by
/// `base_bps + bps_per_1k_units * |q| / 1000`, capped at `max_bps`.
#[derive(Debug, Clone)]
pub struct LinearImpactSlippage {
    base_bps: Decimal,
    bps_per_1k_units: Decimal,
    max_bps: Decimal,
}

impl LinearImpactSlippage {
    pub fn new(base_bps: Decimal, bps_per_1k_units: Decimal, max_bps: Decimal) -> Self {
        Self {
            base_bps,
            bps_per_1k_units,
            max_bps,
        }
    }

    fn impact_bps(&self, quantity: Decimal) -> Decimal {
        let size_bps = self.bps_per_1k_units * quantity.abs() / Decimal::from(1000);
        (self.base_bps + size_bps).min(self.max_bps)
    }
}

impl SlippageModel for LinearImpactSlippage {
    fn calculate_execution_price(&self, price: Decimal, quantity: Decimal) -> Decimal {
        if quantity.is_zero() {
            return price;
        }

        let pct_change = self.impact_bps(quantity) / Decimal::from(10_000);
        let adjusted = if quantity > Decimal::ZERO {
            price * (Decimal::ONE + pct_change)
        } else {
            price * (Decimal::ONE - pct_change)
        };

        // Price never goes negative, whatever the configured cap
        adjusted.max(Decimal::ZERO).round_dp(4)
    }
}

/// No Slippage model (perfect execution).
#[derive(Debug, Clone)]
pub struct ZeroSlippage;

impl SlippageModel for ZeroSlippage {
    fn calculate_execution_price(&self, price: Decimal, _quantity: Decimal) -> Decimal {
        price
    }
}
