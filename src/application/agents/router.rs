use crate::domain::errors::EngineError;
use crate::domain::trading::types::{Message, Tick};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic shard index for a symbol: FNV-1a 64 modulo `shards`.
///
/// Stable across runs and platforms, unlike `std`'s randomly seeded hasher.
pub fn shard_for(symbol: &str, shards: usize) -> usize {
    let shards = shards.max(1);
    let hash = symbol.bytes().fold(FNV_OFFSET, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    });
    (hash % shards as u64) as usize
}

/// Fatal error reported by a worker task before it exits
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub worker: String,
    pub reason: String,
}

/// Messages routed per kind during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingStats {
    pub ticks: u64,
    pub signals: u64,
    pub orders: u64,
    pub quantities: u64,
    pub resets: u64,
    pub cash: u64,
}

/// Every channel of one run, wired around a Router.
///
/// Worker-bound channels are bounded so the Router applies backpressure.
/// Channels into the Router from the Analyzer pool and the Broker are
/// unbounded so those workers never wait on the Router, which keeps the
/// Broker -> Router -> Analyzer -> Router -> Broker loop free of deadlock.
pub struct Topology {
    pub router: Router,
    pub fetcher_tx: Sender<Message>,
    pub analyzer_rxs: Vec<Receiver<Message>>,
    pub analyzer_out: UnboundedSender<Message>,
    pub broker_rx: Receiver<Message>,
    pub broker_out: UnboundedSender<Message>,
    pub ledger_rx: Receiver<Message>,
    pub failures: UnboundedSender<WorkerFailure>,
}

impl Topology {
    pub fn build(shards: usize, capacity: usize) -> Self {
        let shards = shards.max(1);
        let capacity = capacity.max(1);

        let (fetcher_tx, fetcher_rx) = mpsc::channel(capacity);
        let (analyzer_out, analyzer_in) = mpsc::unbounded_channel();
        let (broker_out, broker_in) = mpsc::unbounded_channel();
        let (failures, failure_rx) = mpsc::unbounded_channel();

        let mut analyzer_txs = Vec::with_capacity(shards);
        let mut analyzer_rxs = Vec::with_capacity(shards);
        for _ in 0..shards {
            let (tx, rx) = mpsc::channel(capacity);
            analyzer_txs.push(tx);
            analyzer_rxs.push(rx);
        }
        let (broker_tx, broker_rx) = mpsc::channel(capacity);
        let (ledger_tx, ledger_rx) = mpsc::channel(capacity);

        let router = Router {
            fetcher_rx,
            analyzer_rx: analyzer_in,
            broker_rx: broker_in,
            failure_rx,
            analyzers: analyzer_txs,
            broker: broker_tx,
            ledger: ledger_tx,
            assignments: HashMap::new(),
            awaiting: HashMap::new(),
            held: 0,
            hold_limit: capacity,
            reset_pending: false,
            // the Broker's startup CASH is owed before anything else
            in_flight: 1,
            fetcher_done: false,
            stats: RoutingStats::default(),
        };

        Self {
            router,
            fetcher_tx,
            analyzer_rxs,
            analyzer_out,
            broker_rx,
            broker_out,
            ledger_rx,
            failures,
        }
    }
}

/// Central dispatcher. The only component that knows the topology.
pub struct Router {
    fetcher_rx: Receiver<Message>,
    analyzer_rx: UnboundedReceiver<Message>,
    broker_rx: UnboundedReceiver<Message>,
    failure_rx: UnboundedReceiver<WorkerFailure>,
    analyzers: Vec<Sender<Message>>,
    broker: Sender<Message>,
    ledger: Sender<Message>,
    assignments: HashMap<String, usize>,
    /// Symbols with a TICK in the pipeline, each with the TICKs held back
    /// until its QUANTITY comes back
    awaiting: HashMap<String, VecDeque<Tick>>,
    held: usize,
    hold_limit: usize,
    /// RESET waits until every held TICK has been released
    reset_pending: bool,
    /// TICKs and the startup CASH whose QUANTITY (or CASH) has not come back yet
    in_flight: i64,
    fetcher_done: bool,
    stats: RoutingStats,
}

impl Router {
    pub async fn run(&mut self) -> Result<RoutingStats, EngineError> {
        info!("Router started with {} analyzer shards.", self.analyzers.len());

        if let Err(e) = self.route_until_drained().await {
            error!("Router: fatal error, stopping all workers: {}", e);
            self.abort();
            return Err(e);
        }

        if let Err(e) = self.shutdown().await {
            error!("Router: shutdown cascade failed: {}", e);
            self.abort();
            return Err(e);
        }

        info!(
            "Router stopped. Routed {} ticks, {} signals, {} orders, {} quantities, {} resets.",
            self.stats.ticks,
            self.stats.signals,
            self.stats.orders,
            self.stats.quantities,
            self.stats.resets
        );
        Ok(self.stats.clone())
    }

    async fn route_until_drained(&mut self) -> Result<(), EngineError> {
        while !(self.fetcher_done && self.in_flight == 0) {
            tokio::select! {
                biased;

                Some(failure) = self.failure_rx.recv() => {
                    return Err(EngineError::WorkerFailed {
                        worker: failure.worker,
                        reason: failure.reason,
                    });
                }

                msg = self.broker_rx.recv() => {
                    let msg = msg.ok_or_else(|| EngineError::closed("Router", "Broker"))?;
                    self.on_broker(msg).await?;
                }

                msg = self.analyzer_rx.recv() => {
                    let msg = msg.ok_or_else(|| EngineError::closed("Router", "Analyzer"))?;
                    self.on_analyzer(msg).await?;
                }

                msg = self.fetcher_rx.recv(), if self.accepts_input() => {
                    let msg = msg.ok_or_else(|| EngineError::closed("Router", "Fetcher"))?;
                    self.on_fetcher(msg).await?;
                }
            }
        }
        Ok(())
    }

    async fn on_fetcher(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Tick(tick) => {
                self.stats.ticks += 1;
                self.in_flight += 1;
                if let Some(queue) = self.awaiting.get_mut(&tick.symbol) {
                    queue.push_back(tick);
                    self.held += 1;
                    return Ok(());
                }
                self.awaiting.insert(tick.symbol.clone(), VecDeque::new());
                self.dispatch(tick).await
            }
            Message::Reset => {
                self.stats.resets += 1;
                if self.held > 0 {
                    debug!("Router: holding RESET behind {} queued ticks", self.held);
                    self.reset_pending = true;
                    return Ok(());
                }
                debug!("Router: broadcasting RESET");
                self.broadcast(Message::Reset).await
            }
            Message::Quit => {
                self.fetcher_done = true;
                info!(
                    "Router: tick source finished after {} ticks, draining {} in flight",
                    self.stats.ticks, self.in_flight
                );
                Ok(())
            }
            other => Err(Self::violation(&other, "Fetcher")),
        }
    }

    async fn on_analyzer(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Signal(signal) => {
                self.stats.signals += 1;
                Self::forward(&self.broker, Message::Signal(signal), "Broker").await
            }
            other => Err(Self::violation(&other, "Analyzer")),
        }
    }

    async fn on_broker(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Order(order) => {
                self.stats.orders += 1;
                Self::forward(&self.ledger, Message::Order(order), "Ledger").await
            }
            Message::Quantity(update) => {
                self.stats.quantities += 1;
                self.settle(&Message::Quantity(update.clone()))?;
                let symbol = update.symbol.clone();
                let shard = self.shard_of(&symbol);
                Self::forward(&self.analyzers[shard], Message::Quantity(update), "Analyzer").await?;
                self.release(&symbol).await
            }
            Message::Cash(snapshot) => {
                self.stats.cash += 1;
                self.settle(&Message::Cash(snapshot.clone()))?;
                Self::forward(&self.ledger, Message::Cash(snapshot), "Ledger").await
            }
            other => Err(Self::violation(&other, "Broker")),
        }
    }

    /// Fetcher input is paused while a RESET waits for held TICKs, or while
    /// too many TICKs are held back.
    fn accepts_input(&self) -> bool {
        !self.fetcher_done && !self.reset_pending && self.held < self.hold_limit
    }

    async fn dispatch(&mut self, tick: Tick) -> Result<(), EngineError> {
        let shard = self.shard_of(&tick.symbol);
        Self::forward(&self.analyzers[shard], Message::Tick(tick), "Analyzer").await
    }

    /// The QUANTITY for `symbol` has been delivered: its next held TICK may go.
    async fn release(&mut self, symbol: &str) -> Result<(), EngineError> {
        let next = match self.awaiting.get_mut(symbol) {
            Some(queue) => queue.pop_front(),
            None => {
                return Err(EngineError::ProtocolViolation {
                    worker: "Router".to_string(),
                    kind: "QUANTITY",
                    source_name: "Broker".to_string(),
                });
            }
        };

        match next {
            Some(tick) => {
                self.held -= 1;
                self.dispatch(tick).await?;
            }
            None => {
                self.awaiting.remove(symbol);
            }
        }

        if self.reset_pending && self.held == 0 {
            self.reset_pending = false;
            debug!("Router: broadcasting held RESET");
            self.broadcast(Message::Reset).await?;
        }
        Ok(())
    }

    /// Marks one owed reply as received. More replies than requests means
    /// the Broker broke the one-QUANTITY-per-SIGNAL contract.
    fn settle(&mut self, msg: &Message) -> Result<(), EngineError> {
        self.in_flight -= 1;
        if self.in_flight < 0 {
            return Err(Self::violation(msg, "Broker"));
        }
        Ok(())
    }

    fn shard_of(&mut self, symbol: &str) -> usize {
        if let Some(&shard) = self.assignments.get(symbol) {
            return shard;
        }
        let shard = if symbol.is_empty() {
            warn!("Router: message without a symbol, routing to shard 0");
            0
        } else {
            shard_for(symbol, self.analyzers.len())
        };
        debug!("Router: {} assigned to Analyzer{}", symbol, shard);
        self.assignments.insert(symbol.to_string(), shard);
        shard
    }

    async fn broadcast(&self, msg: Message) -> Result<(), EngineError> {
        for analyzer in &self.analyzers {
            Self::forward(analyzer, msg.clone(), "Analyzer").await?;
        }
        Self::forward(&self.broker, msg.clone(), "Broker").await?;
        Self::forward(&self.ledger, msg, "Ledger").await
    }

    /// QUIT to the Analyzer pool and Broker, then to the Ledger last.
    async fn shutdown(&self) -> Result<(), EngineError> {
        info!("Router: all work drained, stopping workers");
        for analyzer in &self.analyzers {
            Self::forward(analyzer, Message::Quit, "Analyzer").await?;
        }
        Self::forward(&self.broker, Message::Quit, "Broker").await?;
        Self::forward(&self.ledger, Message::Quit, "Ledger").await
    }

    /// Best-effort QUIT to every worker after a fatal error. Never blocks.
    fn abort(&self) {
        for tx in self
            .analyzers
            .iter()
            .chain([&self.broker, &self.ledger])
        {
            let _ = tx.try_send(Message::Quit);
        }
    }

    async fn forward(tx: &Sender<Message>, msg: Message, peer: &str) -> Result<(), EngineError> {
        tx.send(msg)
            .await
            .map_err(|_| EngineError::closed("Router", peer))
    }

    fn violation(msg: &Message, source: &str) -> EngineError {
        EngineError::ProtocolViolation {
            worker: "Router".to_string(),
            kind: msg.kind(),
            source_name: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{CashSnapshot, Order, Signal};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn signal(symbol: &str) -> Message {
        Message::Signal(Signal {
            symbol: symbol.to_string(),
            price: dec!(10),
            strength: 0.0,
            timestamp: 1,
        })
    }

    fn order(symbol: &str) -> Message {
        Message::Order(Order {
            symbol: symbol.to_string(),
            price: dec!(10),
            quantity: Decimal::ZERO,
            strength: 0.0,
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
            slippage: Decimal::ZERO,
            cash: dec!(100),
            timestamp: 1,
        })
    }

    #[test]
    fn test_shard_for_is_stable_and_in_range() {
        for symbol in ["005930", "AAPL", "MSFT", "000660", "TSLA"] {
            let first = shard_for(symbol, 7);
            assert!(first < 7);
            assert_eq!(first, shard_for(symbol, 7));
        }
        assert_eq!(shard_for("AAPL", 1), 0);
        assert_eq!(shard_for("AAPL", 0), 0);
    }

    #[test]
    fn test_shard_for_spreads_symbols() {
        let mut used = std::collections::HashSet::new();
        for i in 0..64 {
            used.insert(shard_for(&format!("SYM{}", i), 4));
        }
        assert_eq!(used.len(), 4);
    }

    #[tokio::test]
    async fn test_full_round_trip_and_shutdown_cascade() {
        let Topology {
            mut router,
            fetcher_tx,
            mut analyzer_rxs,
            analyzer_out,
            mut broker_rx,
            broker_out,
            mut ledger_rx,
            failures: _failures,
        } = Topology::build(2, 8);
        let shard = shard_for("AAPL", 2);
        let handle = tokio::spawn(async move { router.run().await });

        broker_out.send(Message::Cash(CashSnapshot { cash: dec!(100) })).unwrap();
        assert!(matches!(ledger_rx.recv().await, Some(Message::Cash(_))));

        fetcher_tx.send(Message::tick("AAPL", dec!(10), 1)).await.unwrap();
        fetcher_tx.send(Message::Quit).await.unwrap();
        assert!(matches!(analyzer_rxs[shard].recv().await, Some(Message::Tick(_))));

        analyzer_out.send(signal("AAPL")).unwrap();
        assert!(matches!(broker_rx.recv().await, Some(Message::Signal(_))));

        // QUIT must wait for the owed QUANTITY
        tokio::task::yield_now().await;
        assert!(broker_rx.try_recv().is_err());

        broker_out.send(order("AAPL")).unwrap();
        broker_out.send(Message::quantity("AAPL", Decimal::ZERO)).unwrap();
        assert!(matches!(ledger_rx.recv().await, Some(Message::Order(_))));
        assert!(matches!(analyzer_rxs[shard].recv().await, Some(Message::Quantity(_))));

        for rx in analyzer_rxs.iter_mut() {
            assert_eq!(rx.recv().await, Some(Message::Quit));
        }
        assert_eq!(broker_rx.recv().await, Some(Message::Quit));
        assert_eq!(ledger_rx.recv().await, Some(Message::Quit));

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.signals, 1);
        assert_eq!(stats.orders, 1);
        assert_eq!(stats.quantities, 1);
        assert_eq!(stats.cash, 1);
    }

    #[tokio::test]
    async fn test_next_tick_of_a_symbol_waits_for_its_quantity() {
        let Topology {
            mut router,
            fetcher_tx,
            mut analyzer_rxs,
            analyzer_out: _analyzer_out,
            mut broker_rx,
            broker_out,
            mut ledger_rx,
            failures: _failures,
        } = Topology::build(1, 8);
        let handle = tokio::spawn(async move { router.run().await });

        broker_out.send(Message::Cash(CashSnapshot { cash: dec!(100) })).unwrap();
        for msg in [
            Message::tick("AAPL", dec!(10), 1),
            Message::tick("AAPL", dec!(11), 2),
            Message::tick("MSFT", dec!(20), 1),
            Message::Reset,
            Message::Quit,
        ] {
            fetcher_tx.send(msg).await.unwrap();
        }

        let shard = &mut analyzer_rxs[0];
        assert_eq!(shard.recv().await, Some(Message::tick("AAPL", dec!(10), 1)));
        assert_eq!(shard.recv().await, Some(Message::tick("MSFT", dec!(20), 1)));
        tokio::task::yield_now().await;
        assert!(shard.try_recv().is_err(), "AAPL@2 and RESET are held");

        broker_out.send(Message::quantity("AAPL", dec!(1))).unwrap();
        assert_eq!(shard.recv().await, Some(Message::quantity("AAPL", dec!(1))));
        assert_eq!(shard.recv().await, Some(Message::tick("AAPL", dec!(11), 2)));
        // the last held tick is out, so the RESET follows it
        assert_eq!(shard.recv().await, Some(Message::Reset));

        broker_out.send(Message::quantity("MSFT", Decimal::ZERO)).unwrap();
        broker_out.send(Message::quantity("AAPL", Decimal::ZERO)).unwrap();
        assert_eq!(shard.recv().await, Some(Message::quantity("MSFT", Decimal::ZERO)));
        assert_eq!(shard.recv().await, Some(Message::quantity("AAPL", Decimal::ZERO)));
        assert_eq!(shard.recv().await, Some(Message::Quit));

        assert_eq!(broker_rx.recv().await, Some(Message::Reset));
        assert_eq!(broker_rx.recv().await, Some(Message::Quit));
        assert!(matches!(ledger_rx.recv().await, Some(Message::Cash(_))));
        assert_eq!(ledger_rx.recv().await, Some(Message::Reset));
        assert_eq!(ledger_rx.recv().await, Some(Message::Quit));

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.quantities, 3);
        assert_eq!(stats.resets, 1);
    }

    #[tokio::test]
    async fn test_quantity_for_idle_symbol_is_protocol_violation() {
        let Topology {
            mut router,
            fetcher_tx,
            analyzer_rxs: _analyzer_rxs,
            analyzer_out: _analyzer_out,
            broker_rx: _broker_rx,
            broker_out,
            ledger_rx: _ledger_rx,
            failures: _failures,
        } = Topology::build(1, 8);
        let handle = tokio::spawn(async move { router.run().await });

        broker_out.send(Message::Cash(CashSnapshot { cash: dec!(1) })).unwrap();
        fetcher_tx.send(Message::tick("AAPL", dec!(10), 1)).await.unwrap();
        tokio::task::yield_now().await;
        broker_out.send(Message::quantity("MSFT", dec!(1))).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProtocolViolation { kind: "QUANTITY", .. }
        ));
    }

    #[tokio::test]
    async fn test_reset_is_broadcast_to_every_worker() {
        let Topology {
            mut router,
            fetcher_tx,
            mut analyzer_rxs,
            analyzer_out: _analyzer_out,
            mut broker_rx,
            broker_out,
            mut ledger_rx,
            failures: _failures,
        } = Topology::build(3, 8);
        let handle = tokio::spawn(async move { router.run().await });

        broker_out.send(Message::Cash(CashSnapshot { cash: dec!(1) })).unwrap();
        fetcher_tx.send(Message::Reset).await.unwrap();
        fetcher_tx.send(Message::Quit).await.unwrap();

        for rx in analyzer_rxs.iter_mut() {
            assert_eq!(rx.recv().await, Some(Message::Reset));
        }
        assert_eq!(broker_rx.recv().await, Some(Message::Reset));
        assert!(matches!(ledger_rx.recv().await, Some(Message::Cash(_) | Message::Reset)));

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.resets, 1);
    }

    #[tokio::test]
    async fn test_signal_from_fetcher_is_protocol_violation() {
        let Topology {
            mut router,
            fetcher_tx,
            mut analyzer_rxs,
            analyzer_out: _analyzer_out,
            mut broker_rx,
            broker_out: _broker_out,
            ledger_rx: _ledger_rx,
            failures: _failures,
        } = Topology::build(1, 8);
        let handle = tokio::spawn(async move { router.run().await });

        fetcher_tx.send(signal("AAPL")).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProtocolViolation { kind: "SIGNAL", .. }
        ));
        assert_eq!(analyzer_rxs[0].recv().await, Some(Message::Quit));
        assert_eq!(broker_rx.recv().await, Some(Message::Quit));
    }

    #[tokio::test]
    async fn test_extra_quantity_is_protocol_violation() {
        let topology = Topology::build(1, 8);
        let Topology {
            mut router,
            broker_out,
            ..
        } = topology;
        let handle = tokio::spawn(async move { router.run().await });

        broker_out.send(Message::Cash(CashSnapshot { cash: dec!(1) })).unwrap();
        broker_out.send(Message::quantity("AAPL", dec!(1))).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProtocolViolation { kind: "QUANTITY", .. }
        ));
    }

    #[tokio::test]
    async fn test_worker_failure_stops_the_router() {
        let Topology {
            mut router,
            fetcher_tx: _fetcher_tx,
            mut analyzer_rxs,
            analyzer_out: _analyzer_out,
            broker_rx: _broker_rx,
            broker_out: _broker_out,
            ledger_rx: _ledger_rx,
            failures,
        } = Topology::build(2, 8);
        let handle = tokio::spawn(async move { router.run().await });

        failures
            .send(WorkerFailure {
                worker: "Analyzer1".to_string(),
                reason: "boom".to_string(),
            })
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::WorkerFailed { ref worker, .. } if worker == "Analyzer1"));
        assert_eq!(analyzer_rxs[0].recv().await, Some(Message::Quit));
    }
}
