use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub price: Decimal,
    pub timestamp: i64,
}

/// Append-only price history for a single symbol.
///
/// Grows by one sample per TICK and is only ever cleared as a whole (RESET).
#[derive(Debug, Clone, Default)]
pub struct Timeseries {
    samples: Vec<Sample>,
}

impl Timeseries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, price: Decimal, timestamp: i64) {
        self.samples.push(Sample { price, timestamp });
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.samples.last().map(|s| s.price)
    }

    /// The most recent `n` samples (fewer if the history is shorter)
    pub fn tail(&self, n: usize) -> &[Sample] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }

    /// Prices of the most recent `n` samples as `f64`, for indicator input
    pub fn tail_prices_f64(&self, n: usize) -> Vec<f64> {
        self.tail(n)
            .iter()
            .map(|s| s.price.to_f64().unwrap_or(0.0))
            .collect()
    }
}
