// src/config.rs

use crate::types::OrderType;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    pub buy_threshold: Decimal,
    pub sell_threshold: Decimal,
    /// Smallest balance (in asset units) worth trading.
    pub min_trade_volume: Decimal,
    /// Quote-currency amount committed per trade.
    pub max_trade_notional: Decimal,
    pub target_profit: Decimal,
    pub cycle_interval_secs: u64,
    /// Asset symbol -> pair used to price and trade it.
    pub pairs: BTreeMap<String, String>,
    pub quote_asset: String,
    pub volume_step: Decimal,
    /// `limit` (at the observed price) or `market`.
    pub order_type: OrderType,
    pub cancel_orders_on_exit: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub short_interval_ms: u64,
    pub long_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub request_timeout_ms: u64,
    pub recv_timeout_ms: u64,
    pub stream_channel: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub trade_log: String,
    pub portfolio_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub dir: String,
    pub file: String,
    pub level: String,
}

/// The configuration record written by the dashboard. Only ever read here.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_secret: String,
    pub live_trading: bool,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_per_trade: f64,
    pub trading: TradingConfig,
    pub rate_limit: RateLimitConfig,
    pub endpoints: EndpointConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Defaults, then `path` if it exists, then `APP_*` environment overrides
    /// (`APP_TRADING__BUY_THRESHOLD=...`).
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("api_key", "")?
            .set_default("api_secret", "")?
            .set_default("live_trading", false)?
            .set_default("stop_loss", 0.95)?
            .set_default("take_profit", 1.05)?
            .set_default("risk_per_trade", 0.01)?
            .set_default("trading.buy_threshold", "0.0000075")?
            .set_default("trading.sell_threshold", "0.0000085")?
            .set_default("trading.min_trade_volume", "5000")?
            .set_default("trading.max_trade_notional", "3.0")?
            .set_default("trading.target_profit", "100.0")?
            .set_default("trading.cycle_interval_secs", 60)?
            .set_default("trading.pairs.SHIB", "SHIB/USD")?
            .set_default("trading.quote_asset", "ZUSD")?
            .set_default("trading.volume_step", "1")?
            .set_default("trading.order_type", "limit")?
            .set_default("trading.cancel_orders_on_exit", false)?
            .set_default("rate_limit.short_interval_ms", 5_000)?
            .set_default("rate_limit.long_interval_ms", 10_000)?
            .set_default("endpoints.rest_url", "https://api.kraken.com")?
            .set_default("endpoints.ws_url", "wss://ws-auth.kraken.com/")?
            .set_default("endpoints.request_timeout_ms", 10_000)?
            .set_default("endpoints.recv_timeout_ms", 1_000)?
            .set_default("endpoints.stream_channel", "ownTrades")?
            .set_default("storage.trade_log", "trade_log.csv")?
            .set_default("storage.portfolio_log", "portfolio_values.csv")?
            .set_default("logging.dir", "logs")?
            .set_default("logging.file", "bot.log")?
            .set_default("logging.level", "info")
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.trading.cycle_interval_secs)
    }
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}
