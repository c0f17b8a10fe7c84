// src/core/testing.rs
//! In-memory exchange for engine and supervisor tests.

use crate::connectors::traits::ExchangeClient;
use crate::error::{TradingError, TradingResult};
use crate::types::{OrderDetail, OrderRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct MockExchange {
    pub balances: Mutex<BTreeMap<String, Decimal>>,
    pub open_orders: Mutex<BTreeMap<String, OrderDetail>>,
    pub prices: Mutex<BTreeMap<String, Decimal>>,
    pub fail_balance: bool,
    pub reject_orders: bool,
    pub stream_token: Option<String>,
    pub placed: Mutex<Vec<OrderRequest>>,
    pub balance_calls: AtomicUsize,
    pub price_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
}

impl MockExchange {
    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.balances.lock().insert(asset.to_string(), amount);
        self
    }

    pub fn with_price(self, pair: &str, price: Decimal) -> Self {
        self.prices.lock().insert(pair.to_string(), price);
        self
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_balance(&self) -> TradingResult<BTreeMap<String, Decimal>> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balance {
            return Err(TradingError::Transport("connection refused".into()));
        }
        Ok(self.balances.lock().clone())
    }

    async fn get_open_orders(&self) -> TradingResult<BTreeMap<String, OrderDetail>> {
        Ok(self.open_orders.lock().clone())
    }

    async fn get_price(&self, pair: &str) -> TradingResult<Decimal> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.prices
            .lock()
            .get(pair)
            .copied()
            .ok_or_else(|| TradingError::PriceUnavailable(pair.to_string()))
    }

    async fn place_order(&self, order: &OrderRequest) -> TradingResult<String> {
        if self.reject_orders {
            return Err(TradingError::Api {
                code: "EOrder".into(),
                message: "Insufficient funds".into(),
            });
        }
        let mut placed = self.placed.lock();
        placed.push(order.clone());
        Ok(format!("O-{}", placed.len()))
    }

    async fn cancel_all(&self) -> TradingResult<u64> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.open_orders.lock().len() as u64)
    }

    async fn get_stream_token(&self) -> TradingResult<String> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.stream_token.clone().ok_or_else(|| TradingError::Api {
            code: "EAPI".into(),
            message: "Invalid key".into(),
        })
    }
}
