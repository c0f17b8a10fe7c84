// src/storage/mod.rs
pub mod journal;

use crate::types::{PortfolioSnapshot, TradeRecord};

pub use journal::CsvJournal;

pub type TradeJournal = CsvJournal<TradeRecord>;
pub type PortfolioJournal = CsvJournal<PortfolioSnapshot>;
