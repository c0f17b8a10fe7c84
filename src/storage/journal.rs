// src/storage/journal.rs
//! Append-only CSV files read by the dashboard.
//!
//! Every row is rendered in memory first and then written with a single
//! `write_all` + `flush` under a lock, so concurrent appends never interleave.
//! The header is written only when the file is empty.

use crate::error::{TradingError, TradingResult};
use csv::WriterBuilder;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvJournal<R> {
    path: PathBuf,
    lock: Mutex<()>,
    _record: PhantomData<fn(&R)>,
}

impl<R: Serialize> CsvJournal<R> {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &R) -> TradingResult<()> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut row = WriterBuilder::new().has_headers(is_new).from_writer(Vec::new());
        row.serialize(record)?;
        let bytes = row
            .into_inner()
            .map_err(|e| TradingError::Journal(e.to_string()))?;

        file.write_all(&bytes)?;
        file.flush()?;

        debug!(path = %self.path.display(), header = is_new, "Journal row appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortfolioSnapshot, Side, TradeRecord};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn trade(pnl: rust_decimal::Decimal) -> TradeRecord {
        TradeRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            pair: "SHIB/USD".into(),
            side: Side::Buy,
            volume: dec!(6000),
            price: dec!(0.000007),
            pnl_delta: pnl,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let journal = CsvJournal::new(dir.path().join("trade_log.csv"));

        journal.append(&trade(dec!(-3.0))).unwrap();
        journal.append(&trade(dec!(3.0))).unwrap();

        let content = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,pair,side,volume,price,pnl_delta");
        assert!(lines[1].contains("SHIB/USD,buy,6000,0.000007,-3.0"));
        assert!(lines[2].ends_with(",3.0"));
    }

    #[test]
    fn test_existing_file_is_appended_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio_values.csv");

        CsvJournal::new(&path)
            .append(&PortfolioSnapshot {
                timestamp: Utc::now(),
                value: dec!(10),
            })
            .unwrap();
        // a second journal over the same file, as after a restart
        CsvJournal::new(&path)
            .append(&PortfolioSnapshot {
                timestamp: Utc::now(),
                value: dec!(11),
            })
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.starts_with("timestamp,Portfolio_Value\n"));
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(CsvJournal::new(dir.path().join("nested/trade_log.csv")));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let journal = Arc::clone(&journal);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        journal.append(&trade(dec!(-3.0))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 201);
        assert!(lines[1..].iter().all(|l| l.split(',').count() == 6));
    }
}
