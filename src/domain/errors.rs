use thiserror::Error;

/// Errors raised by strategy and market models
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid input for {model}: {reason}")]
    InvalidInput { model: String, reason: String },

    #[error("Indicator {indicator} could not be built: {reason}")]
    Indicator { indicator: String, reason: String },

    #[error("Unknown {kind} plugin: {id}")]
    Unknown { kind: &'static str, id: String },
}

/// Errors that stop a worker (and therefore the run)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Channel closed: {worker} lost its link to {peer}")]
    ChannelClosed { worker: String, peer: String },

    #[error("Protocol violation: {worker} received unexpected {kind} from {source_name}")]
    ProtocolViolation {
        worker: String,
        kind: &'static str,
        source_name: String,
    },

    #[error("{worker} failed while handling {message}: {source}")]
    Plugin {
        worker: String,
        message: String,
        #[source]
        source: PluginError,
    },

    #[error("Tick source failed: {reason}")]
    Source { reason: String },

    #[error("Ledger sink failed: {reason}")]
    Sink { reason: String },

    #[error("Worker {worker} failed: {reason}")]
    WorkerFailed { worker: String, reason: String },
}

impl EngineError {
    pub fn closed(worker: &str, peer: &str) -> Self {
        Self::ChannelClosed {
            worker: worker.to_string(),
            peer: peer.to_string(),
        }
    }
}
