use crate::domain::ports::LedgerSink;
use crate::domain::trading::types::{CashSnapshot, Order};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

pub const ORDERS_FILE: &str = "orders.jsonl";
pub const CASH_FILE: &str = "cash.jsonl";

/// Writes one JSON object per line: orders to `orders.jsonl`, cash
/// snapshots to `cash.jsonl`. Files are truncated when the sink is created.
pub struct JsonlLedgerSink {
    dir: PathBuf,
    orders: BufWriter<File>,
    cash: BufWriter<File>,
}

impl JsonlLedgerSink {
    pub async fn create(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create ledger directory {}", dir.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            orders: BufWriter::new(Self::open(&dir.join(ORDERS_FILE)).await?),
            cash: BufWriter::new(Self::open(&dir.join(CASH_FILE)).await?),
        })
    }

    async fn open(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open ledger file {}", path.display()))
    }

    async fn append<T: Serialize>(writer: &mut BufWriter<File>, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("Failed to serialize ledger record")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("Failed to write ledger record")
    }
}

#[async_trait]
impl LedgerSink for JsonlLedgerSink {
    async fn record_order(&mut self, order: &Order) -> Result<()> {
        Self::append(&mut self.orders, order).await
    }

    async fn record_cash(&mut self, snapshot: &CashSnapshot) -> Result<()> {
        Self::append(&mut self.cash, snapshot).await?;
        // snapshots are rare, keep them on disk immediately
        self.cash.flush().await.context("Failed to flush cash ledger")
    }

    async fn flush(&mut self) -> Result<()> {
        self.orders.flush().await.context("Failed to flush order ledger")?;
        self.cash.flush().await.context("Failed to flush cash ledger")?;
        info!("Ledger written to {:?}", self.dir);
        Ok(())
    }
}
