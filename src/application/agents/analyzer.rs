use crate::application::agents::WorkerState;
use crate::domain::errors::EngineError;
use crate::domain::ports::Strategy;
use crate::domain::trading::timeseries::Timeseries;
use crate::domain::trading::types::{Message, QuantityUpdate, Signal, Tick};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, UnboundedSender};
use tracing::{debug, info};

/// One shard of the signal-generating pool.
///
/// Owns the price history and stop-loss levels of the symbols the Router
/// assigns to it; nothing else reads or writes that state.
pub struct Analyzer {
    name: String,
    inbound: Receiver<Message>,
    outbound: UnboundedSender<Message>,
    strategy: Arc<dyn Strategy>,
    timeseries: HashMap<String, Timeseries>,
    stoploss: HashMap<String, Decimal>,
    state: WorkerState,
}

impl Analyzer {
    pub fn new(
        shard: usize,
        inbound: Receiver<Message>,
        outbound: UnboundedSender<Message>,
        strategy: Arc<dyn Strategy>,
    ) -> Self {
        Self {
            name: format!("Analyzer{}", shard),
            inbound,
            outbound,
            strategy,
            timeseries: HashMap::new(),
            stoploss: HashMap::new(),
            state: WorkerState::Running,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn history(&self, symbol: &str) -> Option<&Timeseries> {
        self.timeseries.get(symbol)
    }

    pub fn stoploss(&self, symbol: &str) -> Option<Decimal> {
        self.stoploss.get(symbol).copied()
    }

    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!(
            "{} started (strategy: {}).",
            self.name,
            self.strategy.name()
        );

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
            "{} stopped ({} symbols, {} open stops).",
            self.name,
            self.timeseries.len(),
            self.stoploss.len()
        );
        Ok(())
    }

    pub fn handle(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Tick(tick) => self.on_tick(tick),
            Message::Quantity(update) => self.on_quantity(update),
            Message::Reset => {
                self.on_reset();
                Ok(())
            }
            Message::Quit => {
                self.state = WorkerState::Stopped;
                Ok(())
            }
            other @ (Message::Signal(_) | Message::Order(_) | Message::Cash(_)) => {
                Err(EngineError::ProtocolViolation {
                    worker: self.name.clone(),
                    kind: other.kind(),
                    source_name: "Router".to_string(),
                })
            }
        }
    }

    fn on_tick(&mut self, tick: Tick) -> Result<(), EngineError> {
        let history = self.timeseries.entry(tick.symbol.clone()).or_default();
        history.push(tick.price, tick.timestamp);

        if let Some(current) = self.stoploss.get(&tick.symbol).copied() {
            let level = self
                .strategy
                .calc_stoploss(history, Some(current))
                .map_err(|source| EngineError::Plugin {
                    worker: self.name.clone(),
                    message: format!("TICK({} @ {}, t={})", tick.symbol, tick.price, tick.timestamp),
                    source,
                })?;
            self.stoploss.insert(tick.symbol.clone(), level);
        }

        let strength = self
            .strategy
            .calc_strength(history, self.stoploss.get(&tick.symbol).copied())
            .map_err(|source| EngineError::Plugin {
                worker: self.name.clone(),
                message: format!("TICK({} @ {}, t={})", tick.symbol, tick.price, tick.timestamp),
                source,
            })?;

        let signal = Message::Signal(Signal {
            symbol: tick.symbol,
            price: tick.price,
            strength,
            timestamp: tick.timestamp,
        });

        self.outbound
            .send(signal)
            .map_err(|_| EngineError::closed(&self.name, "Router"))
    }

    fn on_quantity(&mut self, update: QuantityUpdate) -> Result<(), EngineError> {
        if update.quantity.is_zero() {
            if self.stoploss.remove(&update.symbol).is_some() {
                debug!("{}: position in {} closed, stop-loss dropped", self.name, update.symbol);
            }
            return Ok(());
        }

        let history = self.timeseries.entry(update.symbol.clone()).or_default();
        let prior = self.stoploss.get(&update.symbol).copied();
        let level = self
            .strategy
            .calc_stoploss(history, prior)
            .map_err(|source| EngineError::Plugin {
                worker: self.name.clone(),
                message: format!("QUANTITY({} = {})", update.symbol, update.quantity),
                source,
            })?;

        if prior.is_none() {
            debug!("{}: stop-loss for {} opened at {}", self.name, update.symbol, level);
        }
        self.stoploss.insert(update.symbol, level);
        Ok(())
    }

    fn on_reset(&mut self) {
        for history in self.timeseries.values_mut() {
            history.clear();
        }
        debug!("{}: history reset ({} open stops kept)", self.name, self.stoploss.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::{PassiveStrategy, SizingEngine, SmaCrossoverStrategy, TrailingStop};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn analyzer(strategy: Arc<dyn Strategy>) -> (Analyzer, mpsc::Sender<Message>, mpsc::UnboundedReceiver<Message>) {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (Analyzer::new(0, in_rx, out_tx, strategy), in_tx, out_rx)
    }

    fn trend_strategy() -> Arc<dyn Strategy> {
        Arc::new(
            SmaCrossoverStrategy::new(
                2,
                3,
                10.0,
                TrailingStop::new(0.1).unwrap(),
                SizingEngine::new(0.1).unwrap(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_tick_always_emits_signal() {
        let (mut a, _tx, mut out) = analyzer(Arc::new(PassiveStrategy));
        a.handle(Message::tick("AAPL", dec!(100), 1)).unwrap();

        match out.try_recv().unwrap() {
            Message::Signal(s) => {
                assert_eq!(s.symbol, "AAPL");
                assert_eq!(s.price, dec!(100));
                assert_eq!(s.strength, 0.0);
                assert_eq!(s.timestamp, 1);
            }
            other => panic!("expected SIGNAL, got {}", other),
        }
        assert_eq!(a.history("AAPL").unwrap().len(), 1);
    }

    #[test]
    fn test_quantity_opens_and_zero_closes_stop() {
        let (mut a, _tx, _out) = analyzer(trend_strategy());
        a.handle(Message::tick("AAPL", dec!(100), 1)).unwrap();

        a.handle(Message::quantity("AAPL", dec!(100))).unwrap();
        assert_eq!(a.stoploss("AAPL"), Some(dec!(90)));

        a.handle(Message::quantity("AAPL", dec!(60))).unwrap();
        assert_eq!(a.stoploss("AAPL"), Some(dec!(90)));

        a.handle(Message::quantity("AAPL", Decimal::ZERO)).unwrap();
        assert_eq!(a.stoploss("AAPL"), None);
    }

    #[test]
    fn test_zero_quantity_without_position_creates_no_stop() {
        let (mut a, _tx, _out) = analyzer(trend_strategy());
        a.handle(Message::tick("AAPL", dec!(100), 1)).unwrap();
        a.handle(Message::quantity("AAPL", Decimal::ZERO)).unwrap();
        assert_eq!(a.stoploss("AAPL"), None);
    }

    #[test]
    fn test_tick_trails_open_stop() {
        let (mut a, _tx, _out) = analyzer(trend_strategy());
        a.handle(Message::tick("AAPL", dec!(100), 1)).unwrap();
        a.handle(Message::quantity("AAPL", dec!(10))).unwrap();
        a.handle(Message::tick("AAPL", dec!(120), 2)).unwrap();
        assert_eq!(a.stoploss("AAPL"), Some(dec!(108)));
    }

    #[test]
    fn test_reset_clears_history_but_keeps_stops() {
        let (mut a, _tx, _out) = analyzer(trend_strategy());

        // no-op on a fresh shard
        a.handle(Message::Reset).unwrap();
        assert!(a.history("AAPL").is_none());

        for (t, p) in [dec!(100), dec!(101), dec!(102)].into_iter().enumerate() {
            a.handle(Message::tick("AAPL", p, t as i64)).unwrap();
        }
        a.handle(Message::quantity("AAPL", dec!(5))).unwrap();
        let stop = a.stoploss("AAPL");
        assert!(stop.is_some());

        a.handle(Message::Reset).unwrap();
        assert!(a.history("AAPL").unwrap().is_empty());
        assert_eq!(a.stoploss("AAPL"), stop);
    }

    #[test]
    fn test_unexpected_kind_is_protocol_violation() {
        let (mut a, _tx, _out) = analyzer(Arc::new(PassiveStrategy));
        let err = a
            .handle(Message::Cash(crate::domain::trading::types::CashSnapshot { cash: dec!(1) }))
            .unwrap_err();
        assert!(matches!(err, EngineError::ProtocolViolation { kind: "CASH", .. }));
    }

    #[tokio::test]
    async fn test_run_exits_on_quit() {
        let (mut a, tx, mut out) = analyzer(Arc::new(PassiveStrategy));
        tx.send(Message::tick("AAPL", dec!(1), 1)).await.unwrap();
        tx.send(Message::Quit).await.unwrap();

        a.run().await.unwrap();
        assert_eq!(a.state(), WorkerState::Stopped);
        assert!(matches!(out.recv().await, Some(Message::Signal(_))));
    }

    #[tokio::test]
    async fn test_run_fails_when_router_hangs_up() {
        let (mut a, tx, _out) = analyzer(Arc::new(PassiveStrategy));
        drop(tx);
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed { .. }));
    }
}
