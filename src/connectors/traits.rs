// src/connectors/traits.rs
use crate::connectors::messages::{StreamData, StreamEvent};
use crate::error::TradingResult;
use crate::types::{OrderDetail, OrderRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// REST surface the decision engine and supervisor talk to.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_balance(&self) -> TradingResult<BTreeMap<String, Decimal>>;

    async fn get_open_orders(&self) -> TradingResult<BTreeMap<String, OrderDetail>>;

    /// Last trade price of `pair`. Public endpoint, not signed.
    async fn get_price(&self, pair: &str) -> TradingResult<Decimal>;

    /// Returns the exchange order id.
    async fn place_order(&self, order: &OrderRequest) -> TradingResult<String>;

    /// Returns how many orders were cancelled.
    async fn cancel_all(&self) -> TradingResult<u64>;

    /// Session token for the private websocket.
    async fn get_stream_token(&self) -> TradingResult<String>;
}

/// Receives decoded stream messages. Read path only: implementations get no
/// handle that could submit orders.
pub trait StreamHandler: Send {
    fn on_event(&mut self, event: &StreamEvent);

    fn on_data(&mut self, data: StreamData);
}
