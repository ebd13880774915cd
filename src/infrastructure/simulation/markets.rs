use crate::domain::errors::PluginError;
use crate::domain::trading::fee_model::{
    NoCommission, NoTax, PerShareCommission, PercentCommission, SellSideTax,
};
use crate::infrastructure::simulation::market::{Market, Venue};
use crate::infrastructure::simulation::slippage_model::{LinearImpactSlippage, ZeroSlippage};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::info;

pub const MARKET_IDS: [&str; 3] = ["krx", "us", "frictionless"];

pub struct MarketFactory;

impl MarketFactory {
    /// Builds a built-in market and applies the `symbol -> venue` listings
    pub fn create(id: &str, listings: &HashMap<String, String>) -> Result<Market, PluginError> {
        let mut market = match id.to_lowercase().as_str() {
            "krx" => Market::new("krx", vec![Self::krx_venue("KOSPI"), Self::krx_venue("KOSDAQ")])?,
            "us" => Market::new("us", vec![Self::us_venue("NYSE"), Self::us_venue("NASDAQ")])?,
            "frictionless" => Market::new(
                "frictionless",
                vec![Venue::new(
                    "SIM",
                    Box::new(ZeroSlippage),
                    Box::new(NoCommission),
                    Box::new(NoTax),
                )],
            )?,
            _ => {
                return Err(PluginError::Unknown {
                    kind: "market",
                    id: id.to_string(),
                });
            }
        };

        for (symbol, venue) in listings {
            market.list(symbol, venue)?;
        }

        for venue in market.venues() {
            info!("Market {}: venue {}", market.id(), venue.description());
        }

        Ok(market)
    }

    fn krx_venue(name: &str) -> Venue {
        Venue::new(
            name,
            Box::new(LinearImpactSlippage::new(dec!(2), dec!(5), dec!(30))),
            Box::new(PercentCommission::new(dec!(0.00015), dec!(0))),
            Box::new(SellSideTax::new(dec!(0.0018))),
        )
    }

    fn us_venue(name: &str) -> Venue {
        Venue::new(
            name,
            Box::new(LinearImpactSlippage::new(dec!(1), dec!(2), dec!(25))),
            Box::new(PerShareCommission::new(dec!(0.005), dec!(1))),
            Box::new(SellSideTax::new(dec!(0.0000278))),
        )
    }
}
