//! In-memory ledger sink.
//!
//! Clones share the same storage, so a test can hand one clone to the Ledger
//! worker and inspect the recorded orders through another after the run.

use crate::domain::ports::LedgerSink;
use crate::domain::trading::types::{CashSnapshot, Order};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Records {
    orders: Vec<Order>,
    cash: Vec<CashSnapshot>,
    flushed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerSink {
    records: Arc<RwLock<Records>>,
}

impl InMemoryLedgerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.records.read().await.orders.clone()
    }

    pub async fn orders_for(&self, symbol: &str) -> Vec<Order> {
        self.records
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect()
    }

    pub async fn cash_snapshots(&self) -> Vec<CashSnapshot> {
        self.records.read().await.cash.clone()
    }

    pub async fn is_flushed(&self) -> bool {
        self.records.read().await.flushed
    }
}

#[async_trait]
impl LedgerSink for InMemoryLedgerSink {
    async fn record_order(&mut self, order: &Order) -> Result<()> {
        self.records.write().await.orders.push(order.clone());
        Ok(())
    }

    async fn record_cash(&mut self, snapshot: &CashSnapshot) -> Result<()> {
        self.records.write().await.cash.push(snapshot.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.records.write().await.flushed = true;
        Ok(())
    }
}
