// Worker agents - one tokio task each, connected by mpsc channels
pub mod analyzer;
pub mod broker;
pub mod fetcher;
pub mod ledger;
pub mod router;

pub use analyzer::Analyzer;
pub use broker::{Broker, BrokerSummary};
pub use fetcher::Fetcher;
pub use ledger::{Ledger, LedgerSummary};
pub use router::{Router, RoutingStats, Topology, WorkerFailure};

/// Lifecycle of a worker's receive loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped,
}
