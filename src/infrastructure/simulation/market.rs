//! Market plugin: venues and the symbol listings that map onto them.
//!
//! A [`Venue`] bundles the three cost behaviours of a trading market
//! (slippage, commission, tax). A [`Market`] is an ordered list of venues plus
//! the listing table used to resolve a symbol to its venue. All lookups and
//! cost functions are deterministic and side-effect free; the Broker is the
//! only caller.

use crate::domain::errors::PluginError;
use crate::domain::trading::fee_model::{CommissionModel, TaxModel};
use crate::infrastructure::simulation::slippage_model::SlippageModel;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug)]
pub struct Venue {
    name: String,
    slippage: Box<dyn SlippageModel>,
    commission: Box<dyn CommissionModel>,
    tax: Box<dyn TaxModel>,
}

impl Venue {
    pub fn new(
        name: impl Into<String>,
        slippage: Box<dyn SlippageModel>,
        commission: Box<dyn CommissionModel>,
        tax: Box<dyn TaxModel>,
    ) -> Self {
        Self {
            name: name.into(),
            slippage,
            commission,
            tax,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simulate_price(&self, price: Decimal, quantity: Decimal) -> Decimal {
        self.slippage.calculate_execution_price(price, quantity)
    }

    pub fn calc_commission(&self, price: Decimal, quantity: Decimal) -> Decimal {
        self.commission.calculate(price, quantity)
    }

    pub fn calc_tax(&self, price: Decimal, quantity: Decimal) -> Decimal {
        self.tax.calculate(price, quantity)
    }

    pub fn description(&self) -> String {
        format!(
            "{} [{} / {}]",
            self.name,
            self.commission.description(),
            self.tax.description()
        )
    }
}

#[derive(Debug)]
pub struct Market {
    id: String,
    venues: Vec<Venue>,
    listings: HashMap<String, usize>,
}

impl Market {
    /// Builds a market; the first venue is the fallback for unlisted symbols.
    pub fn new(id: impl Into<String>, venues: Vec<Venue>) -> Result<Self, PluginError> {
        let id = id.into();
        if venues.is_empty() {
            return Err(PluginError::InvalidInput {
                model: id,
                reason: "a market needs at least one venue".to_string(),
            });
        }
        Ok(Self {
            id,
            venues,
            listings: HashMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn venues(&self) -> &[Venue] {
        &self.venues
    }

    /// Lists `symbol` on the venue named `venue`
    pub fn list(&mut self, symbol: &str, venue: &str) -> Result<(), PluginError> {
        let index = self
            .venues
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(venue))
            .ok_or_else(|| PluginError::InvalidInput {
                model: self.id.clone(),
                reason: format!("symbol {} listed on unknown venue {}", symbol, venue),
            })?;
        self.listings.insert(symbol.to_string(), index);
        Ok(())
    }

    pub fn listed_venue(&self, symbol: &str) -> Option<&Venue> {
        self.listings.get(symbol).map(|&i| &self.venues[i])
    }

    pub fn default_venue(&self) -> &Venue {
        &self.venues[0]
    }

    /// Resolves the venue for `symbol`, falling back to the first venue.
    /// The second element is `true` when the fallback was used.
    pub fn get_exchange(&self, symbol: &str) -> (&Venue, bool) {
        match self.listed_venue(symbol) {
            Some(venue) => (venue, false),
            None => (self.default_venue(), true),
        }
    }
}
