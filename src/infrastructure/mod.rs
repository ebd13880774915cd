pub mod persistence;
pub mod repositories;
pub mod simulation;
pub mod tick_source;

pub use repositories::InMemoryLedgerSink;
