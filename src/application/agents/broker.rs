use crate::application::agents::WorkerState;
use crate::domain::errors::EngineError;
use crate::domain::ports::{SizingRequest, Strategy};
use crate::domain::trading::positions::Positions;
use crate::domain::trading::types::{CashSnapshot, Message, Order, Signal};
use crate::infrastructure::simulation::market::Market;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Final account state handed back when the Broker stops
#[derive(Debug, Clone, Serialize)]
pub struct BrokerSummary {
    pub cash: Decimal,
    pub positions: Positions,
    pub orders: u64,
}

/// The single executor of the run.
///
/// Sizes every SIGNAL with the strategy, prices it with the market plugin and
/// books the result. Cash and positions live here and nowhere else.
pub struct Broker {
    name: String,
    inbound: Receiver<Message>,
    outbound: UnboundedSender<Message>,
    strategy: Arc<dyn Strategy>,
    market: Arc<Market>,
    cash: Decimal,
    positions: Positions,
    unlisted: HashSet<String>,
    orders: u64,
    state: WorkerState,
}

impl Broker {
    pub fn new(
        inbound: Receiver<Message>,
        outbound: UnboundedSender<Message>,
        strategy: Arc<dyn Strategy>,
        market: Arc<Market>,
        initial_cash: Decimal,
    ) -> Self {
        Self {
            name: "Broker".to_string(),
            inbound,
            outbound,
            strategy,
            market,
            cash: initial_cash,
            positions: Positions::new(),
            unlisted: HashSet::new(),
            orders: 0,
            state: WorkerState::Running,
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub async fn run(&mut self) -> Result<BrokerSummary, EngineError> {
        info!(
            "{} started (market: {}, cash: {}).",
            self.name,
            self.market.id(),
            self.cash
        );
        self.emit(Message::Cash(CashSnapshot { cash: self.cash }))?;

        while self.state == WorkerState::Running {
            let msg = self
                .inbound
                .recv()
                .await
                .ok_or_else(|| EngineError::closed(&self.name, "Router"))?;
            debug!("{} received: {}", self.name, msg);
            self.handle(msg)?;
        }

        info!(
            "{} stopped: {} orders, cash {}, {} open positions.",
            self.name,
            self.orders,
            self.cash,
            self.positions.open_count()
        );
        Ok(BrokerSummary {
            cash: self.cash,
            positions: self.positions.clone(),
            orders: self.orders,
        })
    }

    pub fn handle(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Signal(signal) => {
                let order = self.execute(signal)?;
                let quantity = Message::quantity(
                    order.symbol.clone(),
                    self.positions.get(&order.symbol),
                );
                self.emit(Message::Order(order))?;
                self.emit(quantity)
            }
            Message::Reset => {
                // cash and positions carry across sessions
                debug!("{}: RESET ignored", self.name);
                Ok(())
            }
            Message::Quit => {
                self.state = WorkerState::Stopped;
                Ok(())
            }
            other @ (Message::Tick(_)
            | Message::Order(_)
            | Message::Quantity(_)
            | Message::Cash(_)) => Err(EngineError::ProtocolViolation {
                worker: self.name.clone(),
                kind: other.kind(),
                source_name: "Router".to_string(),
            }),
        }
    }

    /// Sizes, prices and books one signal. Returns the executed order.
    pub fn execute(&mut self, signal: Signal) -> Result<Order, EngineError> {
        let plugin_error = |source| EngineError::Plugin {
            worker: "Broker".to_string(),
            message: format!(
                "SIGNAL({} @ {}, strength={}, t={})",
                signal.symbol, signal.price, signal.strength, signal.timestamp
            ),
            source,
        };

        let quantity = self
            .strategy
            .calc_quantity(&SizingRequest {
                symbol: &signal.symbol,
                price: signal.price,
                strength: signal.strength,
                cash: self.cash,
                positions: &self.positions,
            })
            .map_err(plugin_error)?;

        let (venue, fallback) = self.market.get_exchange(&signal.symbol);
        if fallback && self.unlisted.insert(signal.symbol.clone()) {
            warn!(
                "{}: {} is not listed on {}, routing to {}",
                self.name,
                signal.symbol,
                self.market.id(),
                venue.name()
            );
        }

        let exec_price = venue.simulate_price(signal.price, quantity);
        let commission = venue.calc_commission(exec_price, quantity);
        let tax = venue.calc_tax(exec_price, quantity);

        let cost = total_cost(quantity, exec_price, commission, tax);
        self.cash -= cost;
        let held = self.positions.apply(&signal.symbol, quantity);

        let order = Order {
            symbol: signal.symbol,
            price: exec_price,
            quantity,
            strength: signal.strength,
            commission,
            tax,
            slippage: signal.price - exec_price,
            cash: self.cash,
            timestamp: signal.timestamp,
        };

        if let Some(side) = order.side() {
            self.orders += 1;
            info!(
                "{}: {} {} x{} @ {} on {} (fee {}, tax {}) -> cash {}, held {}",
                self.name,
                side,
                order.symbol,
                quantity.abs(),
                exec_price,
                venue.name(),
                commission,
                tax,
                self.cash,
                held
            );
        }

        Ok(order)
    }

    fn emit(&self, msg: Message) -> Result<(), EngineError> {
        self.outbound
            .send(msg)
            .map_err(|_| EngineError::closed(&self.name, "Router"))
    }
}

/// Signed cash impact of a fill: buys cost notional plus fees, sells return
/// notional minus fees, a zero quantity costs nothing.
pub fn total_cost(quantity: Decimal, price: Decimal, commission: Decimal, tax: Decimal) -> Decimal {
    let sign = if quantity > Decimal::ZERO {
        Decimal::ONE
    } else if quantity < Decimal::ZERO {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ZERO
    };
    sign * (quantity.abs() * price + commission + tax)
}
