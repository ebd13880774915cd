use crate::application::agents::WorkerState;
use crate::domain::errors::EngineError;
use crate::domain::ports::LedgerSink;
use crate::domain::trading::types::Message;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

/// Totals over everything the Ledger recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub orders: u64,
    /// Orders with a non-zero quantity
    pub traded_orders: u64,
    pub last_cash: Option<Decimal>,
    pub total_commission: Decimal,
    pub total_tax: Decimal,
}

/// Terminal consumer of ORDER and CASH messages
pub struct Ledger {
    inbound: Receiver<Message>,
    sink: Box<dyn LedgerSink>,
    summary: LedgerSummary,
    state: WorkerState,
}

impl Ledger {
    pub fn new(inbound: Receiver<Message>, sink: Box<dyn LedgerSink>) -> Self {
        Self {
            inbound,
            sink,
            summary: LedgerSummary::default(),
            state: WorkerState::Running,
        }
    }

    pub fn summary(&self) -> &LedgerSummary {
        &self.summary
    }

    pub async fn run(&mut self) -> Result<LedgerSummary, EngineError> {
        info!("Ledger started.");

        if let Err(e) = self.consume().await {
            // keep whatever was recorded before the failure
            error!("Ledger: stopping on fatal error, flushing partial output: {}", e);
            if let Err(flush_err) = self.sink.flush().await {
                error!("Ledger: failed to flush partial output: {:#}", flush_err);
            }
            return Err(e);
        }

        info!(
            "Ledger stopped: {} orders ({} traded), commission {}, tax {}.",
            self.summary.orders,
            self.summary.traded_orders,
            self.summary.total_commission,
            self.summary.total_tax
        );
        Ok(self.summary.clone())
    }

    async fn consume(&mut self) -> Result<(), EngineError> {
        while self.state == WorkerState::Running {
            let msg = self
                .inbound
                .recv()
                .await
                .ok_or_else(|| EngineError::closed("Ledger", "Router"))?;
            debug!("Ledger received: {}", msg);
            self.handle(msg).await?;
        }
        Ok(())
    }

    pub async fn handle(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Order(order) => {
                self.sink.record_order(&order).await.map_err(sink_error)?;
                self.summary.orders += 1;
                if !order.quantity.is_zero() {
                    self.summary.traded_orders += 1;
                }
                self.summary.total_commission += order.commission;
                self.summary.total_tax += order.tax;
                self.summary.last_cash = Some(order.cash);
                Ok(())
            }
            Message::Cash(snapshot) => {
                self.sink.record_cash(&snapshot).await.map_err(sink_error)?;
                self.summary.last_cash = Some(snapshot.cash);
                Ok(())
            }
            Message::Reset => Ok(()),
            Message::Quit => {
                self.sink.flush().await.map_err(sink_error)?;
                self.state = WorkerState::Stopped;
                Ok(())
            }
            other @ (Message::Tick(_) | Message::Signal(_) | Message::Quantity(_)) => {
                Err(EngineError::ProtocolViolation {
                    worker: "Ledger".to_string(),
                    kind: other.kind(),
                    source_name: "Router".to_string(),
                })
            }
        }
    }
}

fn sink_error(e: anyhow::Error) -> EngineError {
    EngineError::Sink {
        reason: format!("{:#}", e),
    }
}
