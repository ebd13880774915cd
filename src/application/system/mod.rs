use crate::application::agents::{
    Analyzer, Broker, BrokerSummary, Fetcher, Ledger, LedgerSummary, RoutingStats, Topology,
    WorkerFailure,
};
use crate::application::strategies::StrategyFactory;
use crate::config::Config;
use crate::domain::errors::EngineError;
use crate::domain::ports::{LedgerSink, Strategy};
use crate::infrastructure::persistence::jsonl_ledger::JsonlLedgerSink;
use crate::infrastructure::simulation::market::Market;
use crate::infrastructure::simulation::markets::MarketFactory;
use crate::infrastructure::tick_source::TickSource;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// Runtime parameters of the core, already validated
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub analyzer_shards: usize,
    pub channel_capacity: usize,
    pub initial_cash: Decimal,
    pub reset_on_new_day: bool,
}

/// Everything a finished run produced, besides the ledger files
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    pub routing: RoutingStats,
    pub broker: BrokerSummary,
    pub ledger: LedgerSummary,
}

/// One backtest: a tick source, resolved plugins and a ledger sink
pub struct Engine {
    config: EngineConfig,
    strategy: Arc<dyn Strategy>,
    market: Arc<Market>,
    source: TickSource,
    sink: Box<dyn LedgerSink>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        strategy: Arc<dyn Strategy>,
        market: Arc<Market>,
        source: TickSource,
        sink: Box<dyn LedgerSink>,
    ) -> Self {
        Self {
            config,
            strategy,
            market,
            source,
            sink,
        }
    }

    /// Spawns every worker, waits for the shutdown cascade and collects the
    /// results. The first root-cause worker error wins over the errors it
    /// caused downstream.
    pub async fn run(self) -> Result<RunReport, EngineError> {
        let Engine {
            config,
            strategy,
            market,
            source,
            sink,
        } = self;

        info!(
            "Starting engine: {} analyzer shards, strategy {}, market {}, cash {}",
            config.analyzer_shards.max(1),
            strategy.name(),
            market.id(),
            config.initial_cash
        );

        let Topology {
            mut router,
            fetcher_tx,
            analyzer_rxs,
            analyzer_out,
            broker_rx,
            broker_out,
            ledger_rx,
            failures,
        } = Topology::build(config.analyzer_shards, config.channel_capacity);

        let mut analyzer_handles = Vec::with_capacity(analyzer_rxs.len());
        for (shard, inbound) in analyzer_rxs.into_iter().enumerate() {
            let mut analyzer =
                Analyzer::new(shard, inbound, analyzer_out.clone(), strategy.clone());
            let name = analyzer.name().to_string();
            analyzer_handles.push(spawn_worker(name, &failures, async move {
                analyzer.run().await
            }));
        }
        drop(analyzer_out);

        let mut broker = Broker::new(broker_rx, broker_out, strategy, market, config.initial_cash);
        let broker_handle =
            spawn_worker("Broker".to_string(), &failures, async move { broker.run().await });

        let mut ledger = Ledger::new(ledger_rx, sink);
        let ledger_handle =
            spawn_worker("Ledger".to_string(), &failures, async move { ledger.run().await });

        let mut fetcher = Fetcher::new(source, fetcher_tx, config.reset_on_new_day);
        let fetcher_handle =
            spawn_worker("Fetcher".to_string(), &failures, async move { fetcher.run().await });
        drop(failures);

        let router_handle = tokio::spawn(async move { router.run().await });

        let (routing, analyzers, broker, ledger, ticks) = tokio::join!(
            router_handle,
            join_all(analyzer_handles),
            broker_handle,
            ledger_handle,
            fetcher_handle,
        );

        let mut errors = Vec::new();
        let ticks = settle("Fetcher", ticks, &mut errors);
        for (shard, result) in analyzers.into_iter().enumerate() {
            settle(&format!("Analyzer{}", shard), result, &mut errors);
        }
        let broker = settle("Broker", broker, &mut errors);
        let ledger = settle("Ledger", ledger, &mut errors);
        let routing = settle("Router", routing, &mut errors);

        if let Some(root) = root_cause(errors) {
            return Err(root);
        }

        match (ticks, routing, broker, ledger) {
            (Some(ticks), Some(routing), Some(broker), Some(ledger)) => {
                info!(
                    "Run complete: {} ticks, {} orders ({} traded), final cash {}",
                    ticks, ledger.orders, ledger.traded_orders, broker.cash
                );
                Ok(RunReport {
                    ticks,
                    routing,
                    broker,
                    ledger,
                })
            }
            _ => Err(EngineError::WorkerFailed {
                worker: "Engine".to_string(),
                reason: "a worker ended without a result".to_string(),
            }),
        }
    }
}

/// Spawns a worker task that reports its own fatal error to the Router
fn spawn_worker<T, F>(
    name: String,
    failures: &UnboundedSender<WorkerFailure>,
    work: F,
) -> JoinHandle<Result<T, EngineError>>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let failures = failures.clone();
    tokio::spawn(async move {
        let result = work.await;
        if let Err(e) = &result {
            error!("{} failed: {}", name, e);
            let _ = failures.send(WorkerFailure {
                worker: name,
                reason: e.to_string(),
            });
        }
        result
    })
}

fn settle<T>(
    worker: &str,
    joined: Result<Result<T, EngineError>, JoinError>,
    errors: &mut Vec<EngineError>,
) -> Option<T> {
    match joined {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            errors.push(e);
            None
        }
        Err(e) => {
            errors.push(EngineError::WorkerFailed {
                worker: worker.to_string(),
                reason: format!("task aborted: {}", e),
            });
            None
        }
    }
}

/// Broken channels and the Router's relay of a failure are consequences;
/// anything else is where the run actually went wrong.
fn root_cause(errors: Vec<EngineError>) -> Option<EngineError> {
    let is_consequence = |e: &EngineError| {
        matches!(
            e,
            EngineError::ChannelClosed { .. } | EngineError::WorkerFailed { .. }
        )
    };
    match errors.iter().position(|e| !is_consequence(e)) {
        Some(index) => errors.into_iter().nth(index),
        None => errors.into_iter().next(),
    }
}

/// Resolves configuration into a ready-to-run engine
pub struct Application;

impl Application {
    pub async fn build(config: &Config) -> Result<Engine> {
        info!(
            "Building backtest (market: {}, strategy: {})...",
            config.market_id, config.strategy_id
        );

        let market = MarketFactory::create(&config.market_id, &config.listings)
            .with_context(|| format!("Failed to build market '{}'", config.market_id))?;
        let strategy = StrategyFactory::create(&config.strategy_id, &config.strategy)
            .with_context(|| format!("Failed to build strategy '{}'", config.strategy_id))?;
        let sink = JsonlLedgerSink::create(&config.ledger_dir).await?;

        Ok(Engine::new(
            EngineConfig {
                analyzer_shards: config.analyzer_shards,
                channel_capacity: config.channel_capacity,
                initial_cash: config.initial_cash,
                reset_on_new_day: config.reset_on_new_day,
            },
            strategy,
            Arc::new(market),
            TickSource::Directory(config.ticks_dir.clone()),
            Box::new(sink),
        ))
    }
}
