use crate::domain::errors::PluginError;
use crate::domain::ports::SizingRequest;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::debug;

/// Long-only fixed-fraction sizing shared by the built-in strategies.
///
/// - zero strength never trades
/// - positive strength buys up to `max_position_pct` of cash, scaled by conviction
/// - negative strength sells a conviction-scaled share of the holding, never more than held
#[derive(Debug, Clone)]
pub struct SizingEngine {
    max_position_pct: f64,
}

impl SizingEngine {
    pub fn new(max_position_pct: f64) -> Result<Self, PluginError> {
        if !(max_position_pct > 0.0 && max_position_pct <= 1.0) {
            return Err(PluginError::InvalidInput {
                model: "sizing".to_string(),
                reason: format!("max_position_pct must be in (0, 1], got {}", max_position_pct),
            });
        }
        Ok(Self { max_position_pct })
    }

    pub fn calculate_quantity(&self, request: &SizingRequest<'_>) -> Result<Decimal, PluginError> {
        let strength = request.strength;
        if !strength.is_finite() {
            return Err(PluginError::InvalidInput {
                model: "sizing".to_string(),
                reason: format!("strength for {} is not finite", request.symbol),
            });
        }
        if strength == 0.0 {
            return Ok(Decimal::ZERO);
        }

        let conviction = Decimal::from_f64(strength.abs().min(1.0)).unwrap_or(Decimal::ZERO);

        if strength > 0.0 {
            if request.cash <= Decimal::ZERO || request.price <= Decimal::ZERO {
                debug!(
                    "SizingEngine: Cannot buy {} - Cash={}, Price={}",
                    request.symbol, request.cash, request.price
                );
                return Ok(Decimal::ZERO);
            }

            let budget = request.cash
                * Decimal::from_f64(self.max_position_pct).unwrap_or(Decimal::ZERO)
                * conviction;
            let quantity = (budget / request.price).floor();

            debug!(
                "SizingEngine: Buy {} x{} (budget {} at {})",
                request.symbol, quantity, budget, request.price
            );
            return Ok(quantity);
        }

        let held = request.positions.get(request.symbol);
        if held <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let quantity = (held * conviction).floor().min(held);
        debug!(
            "SizingEngine: Sell {} x{} of {} held",
            request.symbol, quantity, held
        );
        Ok(-quantity)
    }
}
