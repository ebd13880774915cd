use crate::domain::errors::EngineError;
use crate::domain::trading::types::{Message, Tick};
use crate::infrastructure::tick_source::TickSource;
use chrono::{DateTime, NaiveDate};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

/// Replays historical ticks into the Router, then sends a single QUIT.
pub struct Fetcher {
    source: Option<TickSource>,
    market_tx: Sender<Message>,
    reset_on_new_day: bool,
}

impl Fetcher {
    pub fn new(source: TickSource, market_tx: Sender<Message>, reset_on_new_day: bool) -> Self {
        Self {
            source: Some(source),
            market_tx,
            reset_on_new_day,
        }
    }

    /// Returns the number of ticks sent
    pub async fn run(&mut self) -> Result<u64, EngineError> {
        let source = self.source.take().ok_or_else(|| EngineError::Source {
            reason: "tick source already consumed".to_string(),
        })?;
        let ticks = source.load().await?;
        info!("Fetcher replaying {} ticks.", ticks.len());

        let mut session: Option<NaiveDate> = None;
        let mut sent = 0u64;
        for tick in ticks {
            if self.reset_on_new_day {
                let day = utc_day(&tick);
                if session.is_some_and(|current| current != day) {
                    debug!("Fetcher: new session {}, sending RESET", day);
                    self.send(Message::Reset).await?;
                }
                session = Some(day);
            }
            self.send(Message::Tick(tick)).await?;
            sent += 1;
        }

        self.send(Message::Quit).await?;
        info!("Fetcher finished: {} ticks sent.", sent);
        Ok(sent)
    }

    async fn send(&self, msg: Message) -> Result<(), EngineError> {
        self.market_tx
            .send(msg)
            .await
            .map_err(|_| EngineError::closed("Fetcher", "Router"))
    }
}

fn utc_day(tick: &Tick) -> NaiveDate {
    DateTime::from_timestamp_millis(tick.timestamp)
        .unwrap_or_default()
        .date_naive()
}
