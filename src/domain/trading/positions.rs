use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Signed quantity held per symbol. Unseen symbols hold zero.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Positions {
    quantities: HashMap<String, Decimal>,
}

impl Positions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Decimal {
        self.quantities
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Adds `delta` to the held quantity and returns the new holding.
    /// Flat positions are dropped from the map.
    pub fn apply(&mut self, symbol: &str, delta: Decimal) -> Decimal {
        let updated = self.get(symbol) + delta;
        if updated.is_zero() {
            self.quantities.remove(symbol);
        } else {
            self.quantities.insert(symbol.to_string(), updated);
        }
        updated
    }

    /// Number of symbols with a non-zero holding
    pub fn open_count(&self) -> usize {
        self.quantities.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.quantities.iter().map(|(s, q)| (s.as_str(), *q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unseen_symbol_is_flat() {
        let positions = Positions::new();
        assert_eq!(positions.get("AAPL"), Decimal::ZERO);
    }

    #[test]
    fn test_accumulates_buys_and_sells() {
        let mut positions = Positions::new();
        assert_eq!(positions.apply("AAPL", dec!(100)), dec!(100));
        assert_eq!(positions.apply("AAPL", dec!(-40)), dec!(60));
        assert_eq!(positions.get("AAPL"), dec!(60));
        assert_eq!(positions.open_count(), 1);

        assert_eq!(positions.apply("AAPL", dec!(-60)), Decimal::ZERO);
        assert_eq!(positions.open_count(), 0);
    }

    #[test]
    fn test_short_positions_are_signed() {
        let mut positions = Positions::new();
        positions.apply("TSLA", dec!(-5));
        assert_eq!(positions.get("TSLA"), dec!(-5));
    }
}
