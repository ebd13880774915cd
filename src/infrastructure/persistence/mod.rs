pub mod jsonl_ledger;

pub use jsonl_ledger::JsonlLedgerSink;
