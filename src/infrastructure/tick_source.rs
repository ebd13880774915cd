//! Historical tick loading.
//!
//! A tick directory holds one or more `*.csv` files with a
//! `timestamp,symbol,price` header. The `symbol` column may be left out, in
//! which case the file stem names the symbol. Timestamps are epoch
//! milliseconds or RFC 3339.

use crate::domain::errors::EngineError;
use crate::domain::trading::types::Tick;
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TickRow {
    timestamp: String,
    #[serde(default)]
    symbol: Option<String>,
    price: String,
}

/// Where the Fetcher reads its ticks from
#[derive(Debug, Clone)]
pub enum TickSource {
    Directory(PathBuf),
    /// Pre-built ticks, used by tests and embedding callers
    Memory(Vec<Tick>),
}

impl TickSource {
    /// Loads every tick, merged into non-decreasing timestamp order.
    ///
    /// The sort is stable: ticks sharing a timestamp keep file and row order.
    pub async fn load(self) -> Result<Vec<Tick>, EngineError> {
        let mut ticks = match self {
            TickSource::Memory(ticks) => ticks,
            TickSource::Directory(dir) => tokio::task::spawn_blocking(move || load_directory(&dir))
                .await
                .map_err(|e| EngineError::Source {
                    reason: format!("tick loader task failed: {}", e),
                })??,
        };
        ticks.sort_by_key(|t| t.timestamp);
        Ok(ticks)
    }
}

/// Reads every `*.csv` file of `dir`, in file name order
pub fn load_directory(dir: &Path) -> Result<Vec<Tick>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::Source {
        reason: format!("cannot read tick directory {}: {}", dir.display(), e),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    let mut ticks = Vec::new();
    for path in &files {
        let loaded = load_file(path)?;
        debug!("Loaded {} ticks from {}", loaded.len(), path.display());
        ticks.extend(loaded);
    }

    info!(
        "Loaded {} ticks from {} files in {}",
        ticks.len(),
        files.len(),
        dir.display()
    );
    Ok(ticks)
}

pub fn load_file(path: &Path) -> Result<Vec<Tick>, EngineError> {
    let malformed = |line: u64, reason: String| EngineError::Source {
        reason: format!("{} line {}: {}", path.display(), line, reason),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| EngineError::Source {
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;

    let headers = reader
        .headers()
        .map_err(|e| malformed(1, e.to_string()))?
        .clone();

    let mut ticks = Vec::new();
    let mut record = csv::StringRecord::new();
    loop {
        let more = reader.read_record(&mut record).map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(line, e.to_string())
        })?;
        if !more {
            break;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: TickRow = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(line, e.to_string()))?;

        let timestamp = parse_timestamp(&row.timestamp)
            .ok_or_else(|| malformed(line, format!("invalid timestamp '{}'", row.timestamp)))?;
        let price = Decimal::from_str(&row.price)
            .ok()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| malformed(line, format!("invalid price '{}'", row.price)))?;
        let symbol = row
            .symbol
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| stem.clone());

        ticks.push(Tick {
            symbol,
            price,
            timestamp,
        });
    }
    Ok(ticks)
}

/// Epoch milliseconds or an RFC 3339 date-time
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Some(millis);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp("1970-01-01T00:00:01Z"), Some(1000));
        assert_eq!(parse_timestamp("1970-01-01T09:00:01+09:00"), Some(1000));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_symbol_column_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("005930.csv");
        fs::write(&path, "timestamp,price\n1000,71200\n2000,71300.5\n").unwrap();

        let ticks = load_file(&path).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "005930");
        assert_eq!(ticks[1].price, dec!(71300.5));
    }

    #[test]
    fn test_malformed_row_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "timestamp,symbol,price\n1000,AAPL,10\n2000,AAPL,abc\n").unwrap();

        let err = load_file(&path).unwrap_err().to_string();
        assert!(err.contains("bad.csv"), "{}", err);
        assert!(err.contains("line 3"), "{}", err);
    }

    #[test]
    fn test_line_number_accounts_for_multiline_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quoted.csv");
        fs::write(
            &path,
            "timestamp,symbol,price\n1000,\"AA\nPL\",10\n2000,AAPL,-1\n",
        )
        .unwrap();

        let err = load_file(&path).unwrap_err().to_string();
        assert!(err.contains("line 4"), "{}", err);
    }

    #[tokio::test]
    async fn test_directory_is_merged_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.csv"),
            "timestamp,symbol,price\n1000,AAPL,10\n3000,AAPL,11\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.csv"),
            "timestamp,symbol,price\n1000,MSFT,20\n2000,MSFT,21\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ticks = TickSource::Directory(dir.path().to_path_buf())
            .load()
            .await
            .unwrap();
        let order: Vec<(&str, i64)> = ticks
            .iter()
            .map(|t| (t.symbol.as_str(), t.timestamp))
            .collect();
        assert_eq!(
            order,
            vec![("AAPL", 1000), ("MSFT", 1000), ("MSFT", 2000), ("AAPL", 3000)]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let result = TickSource::Directory(PathBuf::from("/definitely/not/here"))
            .load()
            .await;
        assert!(matches!(result, Err(EngineError::Source { .. })));
    }
}
