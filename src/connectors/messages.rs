// src/connectors/messages.rs
use crate::error::{TradingError, TradingResult};
use crate::types::{OwnTrade, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"event":"subscribe","subscription":{"name":"ownTrades","token":"..."}}`
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    pub event: &'static str,
    pub subscription: Subscription<'a>,
}

#[derive(Debug, Serialize)]
pub struct Subscription<'a> {
    pub name: &'a str,
    pub token: &'a str,
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(channel: &'a str, token: &'a str) -> Self {
        Self {
            event: "subscribe",
            subscription: Subscription {
                name: channel,
                token,
            },
        }
    }
}

/// Object frames: heartbeats, system status, subscription acks.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event: String,
    pub payload: Value,
}

impl StreamEvent {
    pub fn is_heartbeat(&self) -> bool {
        self.event == "heartbeat"
    }
}

/// Array frames: `[payload, channelName, {"sequence": n}]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamData {
    pub channel: String,
    pub sequence: Option<u64>,
    /// Decoded fills when `channel` is `ownTrades`, empty otherwise.
    pub trades: Vec<OwnTrade>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Event(StreamEvent),
    Data(StreamData),
}

/// One trade inside an `ownTrades` payload, keyed by trade id on the wire.
#[derive(Debug, Deserialize)]
struct OwnTradeWire {
    #[serde(default)]
    ordertxid: String,
    pair: String,
    #[serde(default)]
    time: String,
    #[serde(rename = "type")]
    side: Side,
    #[serde(default)]
    ordertype: String,
    price: Decimal,
    vol: Decimal,
}

pub fn decode_message(text: &str) -> TradingResult<InboundMessage> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TradingError::StreamDecode(e.to_string()))?;

    match value {
        Value::Object(ref map) => {
            let event = map
                .get("event")
                .and_then(Value::as_str)
                .ok_or_else(|| TradingError::StreamDecode("object frame without event".into()))?
                .to_string();
            Ok(InboundMessage::Event(StreamEvent {
                event,
                payload: value,
            }))
        }
        Value::Array(ref items) => decode_data(items, &value).map(InboundMessage::Data),
        other => Err(TradingError::StreamDecode(format!(
            "unexpected frame: {}",
            other
        ))),
    }
}

fn decode_data(items: &[Value], raw: &Value) -> TradingResult<StreamData> {
    let channel = items
        .iter()
        .find_map(Value::as_str)
        .ok_or_else(|| TradingError::StreamDecode("data frame without channel name".into()))?
        .to_string();

    let sequence = items
        .iter()
        .filter_map(Value::as_object)
        .find_map(|o| o.get("sequence").and_then(Value::as_u64));

    let trades = if channel == "ownTrades" {
        let payload = items
            .first()
            .and_then(Value::as_array)
            .ok_or_else(|| TradingError::StreamDecode("ownTrades frame without payload".into()))?;
        decode_own_trades(payload)?
    } else {
        Vec::new()
    };

    Ok(StreamData {
        channel,
        sequence,
        trades,
        raw: raw.clone(),
    })
}

fn decode_own_trades(payload: &[Value]) -> TradingResult<Vec<OwnTrade>> {
    let mut trades = Vec::new();
    for entry in payload {
        let Some(map) = entry.as_object() else {
            return Err(TradingError::StreamDecode(format!("bad trade entry: {}", entry)));
        };
        for (trade_id, body) in map {
            let wire: OwnTradeWire = serde_json::from_value(body.clone())
                .map_err(|e| TradingError::StreamDecode(format!("trade {}: {}", trade_id, e)))?;
            trades.push(OwnTrade {
                trade_id: trade_id.clone(),
                order_id: wire.ordertxid,
                pair: wire.pair,
                side: wire.side,
                order_type: wire.ordertype,
                price: wire.price,
                volume: wire.vol,
                time: wire.time,
            });
        }
    }
    Ok(trades)
}
