// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire name used by Kraken (`type` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

/// A single order about to be submitted. Built fresh for every decision.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    pub volume: Decimal,
    pub price: Option<Decimal>,
    pub pair: String,
}

impl OrderRequest {
    /// Limit order at `price`; the shape the decision engine submits.
    pub fn limit(pair: &str, side: Side, volume: Decimal, price: Decimal) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            volume,
            price: Some(price),
            pair: pair.to_string(),
        }
    }

    /// Market order; no price is sent.
    pub fn market(pair: &str, side: Side, volume: Decimal) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            volume,
            price: None,
            pair: pair.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderDescription {
    #[serde(default)]
    pub pair: String,
    #[serde(default, rename = "type")]
    pub side: String,
    #[serde(default)]
    pub ordertype: String,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// One entry of the `OpenOrders` result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderDetail {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub descr: OrderDescription,
    #[serde(default)]
    pub vol: Decimal,
    #[serde(default)]
    pub vol_exec: Decimal,
}

/// Balances, open orders and realized PnL. Owned by the decision engine.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    pub balances: BTreeMap<String, Decimal>,
    pub open_orders: BTreeMap<String, OrderDetail>,
    pub realized_pnl: Decimal,
}

/// Row of `trade_log.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub pair: String,
    pub side: Side,
    pub volume: Decimal,
    pub price: Decimal,
    pub pnl_delta: Decimal,
}

/// Row of `portfolio_values.csv`. Column name matches what the dashboard plots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Portfolio_Value")]
    pub value: Decimal,
}

/// A fill reported on the private `ownTrades` channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnTrade {
    pub trade_id: String,
    pub order_id: String,
    pub pair: String,
    pub side: Side,
    pub order_type: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub time: String,
}
