//! Backtest runner.
//!
//! Replays the tick files of `TICKS_DIR` through the Router, Analyzer shards
//! and Broker, and writes the executed orders to `LEDGER_DIR`.
//!
//! # Usage
//! ```sh
//! MARKET=krx STRATEGY=sma_crossover TICKS_DIR=data/ticks LEDGER_DIR=out cargo run
//! cargo run -- --config backtest.toml
//! ```
//!
//! # Environment Variables
//! - `BACKTEST_CONFIG` - optional TOML file; environment values override it
//! - `ANALYZER_SHARDS` - number of Analyzer workers (default: cores - 1)
//! - `INITIAL_CASH` - starting cash (default: 1000000)
//! - `RUST_LOG` - log filter (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use rustbacktest::application::system::Application;
use rustbacktest::config::Config;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (overrides BACKTEST_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).compact();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stdout_layer)
        .init();

    info!("Backtester {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Configuration loaded: market={}, strategy={}, shards={}, ticks={}, ledger={}",
        config.market_id,
        config.strategy_id,
        config.analyzer_shards,
        config.ticks_dir.display(),
        config.ledger_dir.display()
    );

    let engine = Application::build(&config).await?;
    let report = engine.run().await.context("Backtest failed")?;

    info!(
        "Routed: {} ticks, {} signals, {} orders, {} quantities, {} resets",
        report.routing.ticks,
        report.routing.signals,
        report.routing.orders,
        report.routing.quantities,
        report.routing.resets
    );
    info!(
        "Ledger: {} orders ({} traded), commission {}, tax {}",
        report.ledger.orders,
        report.ledger.traded_orders,
        report.ledger.total_commission,
        report.ledger.total_tax
    );
    info!(
        "Final cash {} with {} open positions",
        report.broker.cash,
        report.broker.positions.open_count()
    );
    for (symbol, quantity) in report.broker.positions.iter() {
        info!("  {} x{}", symbol, quantity);
    }

    Ok(())
}
