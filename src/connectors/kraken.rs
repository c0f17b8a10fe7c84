// src/connectors/kraken.rs
use crate::config::AppConfig;
use crate::connectors::auth::{sign, Credentials, NonceSource};
use crate::connectors::rate_limiter::{CostClass, RateLimiter};
use crate::connectors::traits::ExchangeClient;
use crate::error::{TradingError, TradingResult};
use crate::types::{OrderDetail, OrderRequest};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const BALANCE: &str = "/0/private/Balance";
const OPEN_ORDERS: &str = "/0/private/OpenOrders";
const ADD_ORDER: &str = "/0/private/AddOrder";
const CANCEL_ALL: &str = "/0/private/CancelAll";
const WS_TOKEN: &str = "/0/private/GetWebSocketsToken";
const TICKER: &str = "/0/public/Ticker";

/// Path, ordered form parameters and nonce of one private call.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub path: &'static str,
    pub params: Vec<(String, String)>,
    pub nonce: u64,
}

impl RequestEnvelope {
    pub fn new(path: &'static str, params: Vec<(&str, String)>, nonce: u64) -> Self {
        Self {
            path,
            params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            nonce,
        }
    }

    /// Form fields in send order, nonce first. This exact list is signed.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(self.params.len() + 1);
        fields.push(("nonce".to_string(), self.nonce.to_string()));
        fields.extend(self.params.iter().cloned());
        fields
    }
}

pub struct KrakenClient {
    credentials: Credentials,
    http_client: Client,
    base_rest_url: String,
    limiter: Arc<RateLimiter>,
    nonces: NonceSource,
}

impl KrakenClient {
    pub fn new(
        credentials: Credentials,
        base_rest_url: &str,
        timeout: Duration,
        limiter: Arc<RateLimiter>,
    ) -> TradingResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradingError::Transport(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            http_client,
            base_rest_url: base_rest_url.trim_end_matches('/').to_string(),
            limiter,
            nonces: NonceSource::new(),
        })
    }

    pub fn from_config(config: &AppConfig) -> TradingResult<Self> {
        let credentials = Credentials::new(config.api_key.clone(), config.api_secret.clone())?;
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(config.rate_limit.short_interval_ms),
            Duration::from_millis(config.rate_limit.long_interval_ms),
        ));
        Self::new(
            credentials,
            &config.endpoints.rest_url,
            config.endpoints.request_timeout(),
            limiter,
        )
    }

    async fn send_private<T: DeserializeOwned>(
        &self,
        path: &'static str,
        params: Vec<(&str, String)>,
        class: CostClass,
    ) -> TradingResult<T> {
        self.limiter.acquire(class).await;

        let envelope = RequestEnvelope::new(path, params, self.nonces.next());
        let fields = envelope.form_fields();
        let signature = sign(
            envelope.path,
            &fields,
            envelope.nonce,
            self.credentials.expose_secret(),
        )?;
        let body = serde_urlencoded::to_string(&fields)
            .map_err(|e| TradingError::Transport(format!("cannot encode body: {}", e)))?;

        let url = format!("{}{}", self.base_rest_url, path);
        debug!(endpoint = path, nonce = envelope.nonce, "POST private request");

        let result = async {
            let response = self
                .http_client
                .post(&url)
                .header("API-Key", self.credentials.api_key())
                .header("API-Sign", signature)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, TradingError>((status, text))
        }
        .await;

        let (status, text) = result.map_err(|e| {
            error!(endpoint = path, nonce = envelope.nonce, error = %e, "Request failed");
            e
        })?;

        parse_envelope(status, &text).map_err(|e| {
            error!(endpoint = path, nonce = envelope.nonce, status = %status, body = %text, error = %e, "API call rejected");
            e
        })
    }

    async fn send_public<T: DeserializeOwned>(
        &self,
        path: &'static str,
        query: &[(&str, &str)],
    ) -> TradingResult<T> {
        self.limiter.acquire(CostClass::Short).await;

        let url = format!("{}{}", self.base_rest_url, path);
        debug!(endpoint = path, "GET public request");

        let result = async {
            let response = self.http_client.get(&url).query(query).send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, TradingError>((status, text))
        }
        .await;

        let (status, text) = result.map_err(|e| {
            error!(endpoint = path, error = %e, "Request failed");
            e
        })?;

        parse_envelope(status, &text).map_err(|e| {
            error!(endpoint = path, status = %status, body = %text, error = %e, "Public call failed");
            e
        })
    }
}

#[derive(Debug, Deserialize)]
struct KrakenEnvelope {
    #[serde(default)]
    error: Vec<String>,
    result: Option<Value>,
}

/// Turns a raw response into its `result` payload.
///
/// Error list first (`Api`), then HTTP status (`Api` with the status as
/// code), then shape problems (`Transport`).
pub fn parse_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> TradingResult<T> {
    let envelope: KrakenEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            return Err(TradingError::Transport(format!("malformed JSON: {}", e)))
        }
        Err(_) => {
            return Err(TradingError::Api {
                code: status.as_u16().to_string(),
                message: body.to_string(),
            })
        }
    };

    if let Some(first) = envelope.error.first() {
        return Err(TradingError::from_exchange_message(first));
    }
    if !status.is_success() {
        return Err(TradingError::Api {
            code: status.as_u16().to_string(),
            message: body.to_string(),
        });
    }

    let result = envelope
        .result
        .ok_or_else(|| TradingError::Transport("response has neither error nor result".into()))?;
    serde_json::from_value(result)
        .map_err(|e| TradingError::Transport(format!("unexpected result shape: {}", e)))
}

/// Finds `pair` in a Ticker result and reads the last trade price (`c[0]`).
pub fn extract_last_price(result: &BTreeMap<String, Value>, pair: &str) -> TradingResult<Decimal> {
    let compact = pair.replace('/', "");
    let entry = result
        .get(pair)
        .or_else(|| result.get(&compact))
        .or_else(|| match result.len() {
            1 => result.values().next(),
            _ => None,
        })
        .ok_or_else(|| TradingError::PriceUnavailable(pair.to_string()))?;

    entry
        .get("c")
        .and_then(|c| c.get(0))
        .and_then(Value::as_str)
        .and_then(|p| Decimal::from_str(p).ok())
        .ok_or_else(|| TradingError::PriceUnavailable(pair.to_string()))
}

#[derive(Deserialize)]
struct OpenOrdersResult {
    #[serde(default)]
    open: BTreeMap<String, OrderDetail>,
}

#[derive(Deserialize)]
struct AddOrderResult {
    #[serde(default)]
    txid: Vec<String>,
}

#[derive(Deserialize)]
struct CancelAllResult {
    count: u64,
}

#[derive(Deserialize)]
struct WsTokenResult {
    token: String,
}

#[async_trait]
impl ExchangeClient for KrakenClient {
    async fn get_balance(&self) -> TradingResult<BTreeMap<String, Decimal>> {
        let raw: BTreeMap<String, String> =
            self.send_private(BALANCE, vec![], CostClass::Short).await?;

        let balances = raw
            .into_iter()
            .map(|(asset, amount)| {
                Decimal::from_str(&amount)
                    .map(|d| (asset.clone(), d))
                    .map_err(|e| TradingError::Transport(format!("bad balance for {}: {}", asset, e)))
            })
            .collect::<TradingResult<BTreeMap<_, _>>>()?;

        info!(?balances, "Wallet balance");
        Ok(balances)
    }

    async fn get_open_orders(&self) -> TradingResult<BTreeMap<String, OrderDetail>> {
        let resp: OpenOrdersResult = self
            .send_private(OPEN_ORDERS, vec![], CostClass::Short)
            .await?;
        info!(count = resp.open.len(), "Open orders");
        for (id, order) in &resp.open {
            debug!(
                order_id = %id,
                pair = %order.descr.pair,
                side = %order.descr.side,
                ordertype = %order.descr.ordertype,
                price = ?order.descr.price,
                vol = %order.vol,
                vol_exec = %order.vol_exec,
                status = %order.status,
                "Open order"
            );
        }
        Ok(resp.open)
    }

    async fn get_price(&self, pair: &str) -> TradingResult<Decimal> {
        let result: BTreeMap<String, Value> = self.send_public(TICKER, &[("pair", pair)]).await?;
        let price = extract_last_price(&result, pair)?;
        info!(pair, %price, "Fetched price");
        Ok(price)
    }

    async fn place_order(&self, order: &OrderRequest) -> TradingResult<String> {
        let mut params = vec![
            ("ordertype", order.order_type.as_str().to_string()),
            ("type", order.side.as_str().to_string()),
            ("volume", order.volume.normalize().to_string()),
            ("pair", order.pair.clone()),
        ];
        if let Some(price) = order.price {
            params.push(("price", price.normalize().to_string()));
        }

        info!(
            "🚀 Sending Order: {} {} {} @ {:?}",
            order.side, order.volume, order.pair, order.price
        );

        let resp: AddOrderResult = self.send_private(ADD_ORDER, params, CostClass::Long).await?;
        resp.txid
            .into_iter()
            .next()
            .ok_or_else(|| TradingError::Transport("AddOrder returned no txid".into()))
    }

    async fn cancel_all(&self) -> TradingResult<u64> {
        let resp: CancelAllResult = self.send_private(CANCEL_ALL, vec![], CostClass::Long).await?;
        info!(count = resp.count, "Cancelled all open orders");
        Ok(resp.count)
    }

    async fn get_stream_token(&self) -> TradingResult<String> {
        let resp: WsTokenResult = self.send_private(WS_TOKEN, vec![], CostClass::Short).await?;
        Ok(resp.token)
    }
}
