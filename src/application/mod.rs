// Worker agents - Router, Analyzer shards, Broker, Fetcher, Ledger
pub mod agents;

// Strategy plugins and shared sizing
pub mod strategies;

// Engine wiring and bootstrap
pub mod system;
