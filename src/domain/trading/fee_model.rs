use rust_decimal::Decimal;
use std::fmt::Debug;

/// Broker commission charged on an execution.
///
/// `quantity` is signed (negative for sells); implementations charge on the
/// absolute notional and return zero for a zero quantity.
pub trait CommissionModel: Debug + Send + Sync {
    fn calculate(&self, price: Decimal, quantity: Decimal) -> Decimal;

    fn description(&self) -> String;
}

/// Transaction tax or regulatory fee levied on an execution
pub trait TaxModel: Debug + Send + Sync {
    fn calculate(&self, price: Decimal, quantity: Decimal) -> Decimal;

    fn description(&self) -> String;
}

/// Percentage of notional, with an optional floor per order
#[derive(Debug, Clone)]
pub struct PercentCommission {
    pub rate: Decimal,
    pub minimum: Decimal,
}

impl PercentCommission {
    pub fn new(rate: Decimal, minimum: Decimal) -> Self {
        Self { rate, minimum }
    }
}

impl CommissionModel for PercentCommission {
    fn calculate(&self, price: Decimal, quantity: Decimal) -> Decimal {
        if quantity.is_zero() {
            return Decimal::ZERO;
        }
        let fee = price * quantity.abs() * self.rate;
        fee.max(self.minimum)
    }

    fn description(&self) -> String {
        format!(
            "Percent Commission ({:.4}%, min {})",
            self.rate * Decimal::from(100),
            self.minimum
        )
    }
}

#[derive(Debug, Clone)]
pub struct PerShareCommission {
    pub per_share: Decimal,
    pub minimum: Decimal,
}

impl PerShareCommission {
    pub fn new(per_share: Decimal, minimum: Decimal) -> Self {
        Self { per_share, minimum }
    }
}

impl CommissionModel for PerShareCommission {
    fn calculate(&self, _price: Decimal, quantity: Decimal) -> Decimal {
        if quantity.is_zero() {
            return Decimal::ZERO;
        }
        (quantity.abs() * self.per_share).max(self.minimum)
    }

    fn description(&self) -> String {
        format!(
            "Per-Share Commission ({} per share, min {})",
            self.per_share, self.minimum
        )
    }
}

#[derive(Debug, Clone)]
pub struct NoCommission;

impl CommissionModel for NoCommission {
    fn calculate(&self, _price: Decimal, _quantity: Decimal) -> Decimal {
        Decimal::ZERO
    }

    fn description(&self) -> String {
        "No Commission".to_string()
    }
}

/// Tax charged on the sell side only
#[derive(Debug, Clone)]
pub struct SellSideTax {
    pub rate: Decimal,
}

impl SellSideTax {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

impl TaxModel for SellSideTax {
    fn calculate(&self, price: Decimal, quantity: Decimal) -> Decimal {
        if quantity >= Decimal::ZERO {
            return Decimal::ZERO;
        }
        price * quantity.abs() * self.rate
    }

    fn description(&self) -> String {
        format!("Sell-Side Tax ({:.4}%)", self.rate * Decimal::from(100))
    }
}

#[derive(Debug, Clone)]
pub struct NoTax;

impl TaxModel for NoTax {
    fn calculate(&self, _price: Decimal, _quantity: Decimal) -> Decimal {
        Decimal::ZERO
    }

    fn description(&self) -> String {
        "No Tax".to_string()
    }
}
