// src/error.rs
use rust_decimal::Decimal;
use thiserror::Error;

/// Every failure the trading core can report.
///
/// `Api` means the exchange answered and said no; `Transport` means we never
/// got a usable answer. Callers rely on that split to decide what to log.
#[derive(Debug, Error)]
pub enum TradingError {
    /// The private key is not valid base64.
    #[error("Invalid private key format: {0}")]
    InvalidKeyFormat(String),

    /// Timeout, refused connection, malformed JSON and the like.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Business error reported by the exchange.
    #[error("Exchange error [{code}]: {message}")]
    Api { code: String, message: String },

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Invalid thresholds: buy {buy} must be strictly below sell {sell}")]
    InvalidThresholds { buy: Decimal, sell: Decimal },

    #[error("Stream decode error: {0}")]
    StreamDecode(String),

    /// Append to a CSV journal failed.
    #[error("Journal write failed: {0}")]
    Journal(String),
}

impl TradingError {
    /// Splits a Kraken error string such as `EOrder:Insufficient funds`.
    pub fn from_exchange_message(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((code, message)) => TradingError::Api {
                code: code.to_string(),
                message: message.to_string(),
            },
            None => TradingError::Api {
                code: raw.to_string(),
                message: String::new(),
            },
        }
    }
}

impl From<reqwest::Error> for TradingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TradingError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            TradingError::Transport(format!("connection failed: {}", err))
        } else {
            TradingError::Transport(err.to_string())
        }
    }
}

impl From<csv::Error> for TradingError {
    fn from(err: csv::Error) -> Self {
        TradingError::Journal(err.to_string())
    }
}

impl From<std::io::Error> for TradingError {
    fn from(err: std::io::Error) -> Self {
        TradingError::Journal(err.to_string())
    }
}

pub type TradingResult<T> = Result<T, TradingError>;
