// src/connectors/stream.rs
//! Private websocket listener.
//!
//! `Disconnected -> Connecting -> Subscribed -> Closed`, with a direct edge to
//! `Closed` when the connection cannot be opened. There is no reconnect: once
//! the socket goes away the listener reports `Closed` and returns.

use crate::connectors::messages::{decode_message, InboundMessage, SubscribeRequest};
use crate::connectors::traits::StreamHandler;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
    Closed,
}

pub struct StreamListener {
    url: String,
    token: String,
    channel: String,
    recv_timeout: Duration,
    state: ListenerState,
}

impl StreamListener {
    pub fn new(url: &str, token: String, channel: &str, recv_timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            token,
            channel: channel.to_string(),
            recv_timeout,
            state: ListenerState::Disconnected,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Connects, subscribes and forwards messages to `handler` until the
    /// socket closes or `stop` is cancelled. Always ends in `Closed`.
    pub async fn run<H: StreamHandler>(
        &mut self,
        handler: &mut H,
        stop: &CancellationToken,
    ) -> ListenerState {
        if stop.is_cancelled() {
            return self.close("stop requested before connect");
        }

        let url = match Url::parse(&self.url) {
            Ok(url) => url,
            Err(e) => {
                error!(url = %self.url, error = %e, "Invalid WebSocket URL");
                return self.close("invalid url");
            }
        };

        self.state = ListenerState::Connecting;
        info!(url = %url, "Connecting to private WebSocket");

        let ws_stream = match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect WebSocket");
                return self.close("connect failed");
            }
            Err(_) => {
                error!("WebSocket connect timed out");
                return self.close("connect timeout");
            }
        };

        let (mut write, mut read) = ws_stream.split();

        let subscribe = match serde_json::to_string(&SubscribeRequest::new(&self.channel, &self.token)) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Cannot encode subscribe message");
                return self.close("encode failed");
            }
        };
        if let Err(e) = write.send(Message::Text(subscribe)).await {
            error!(error = %e, "Failed to send subscribe message");
            return self.close("subscribe failed");
        }

        self.state = ListenerState::Subscribed;
        info!(channel = %self.channel, "Subscribed to private channel");

        loop {
            if stop.is_cancelled() {
                info!("Stop requested, closing WebSocket");
                let _ = write.send(Message::Close(None)).await;
                break;
            }

            let frame = match timeout(self.recv_timeout, read.next()).await {
                Err(_) => continue,
                Ok(frame) => frame,
            };

            match frame {
                None => {
                    warn!("WebSocket stream ended");
                    break;
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(Message::Text(text))) => self.dispatch(&text, handler),
                Some(Ok(Message::Close(frame))) => {
                    warn!(?frame, "WebSocket connection closed");
                    break;
                }
                Some(Ok(other)) => debug!(kind = ?other, "Ignoring non-text frame"),
            }
        }

        self.close("receive loop finished")
    }

    fn dispatch<H: StreamHandler>(&self, text: &str, handler: &mut H) {
        match decode_message(text) {
            Ok(InboundMessage::Event(event)) => {
                if event.is_heartbeat() {
                    debug!("WebSocket heartbeat");
                } else {
                    info!(event = %event.event, payload = %event.payload, "WebSocket event");
                }
                handler.on_event(&event);
            }
            Ok(InboundMessage::Data(data)) => {
                info!(
                    channel = %data.channel,
                    sequence = ?data.sequence,
                    trades = data.trades.len(),
                    "WebSocket data received"
                );
                handler.on_data(data);
            }
            Err(e) => warn!(error = %e, raw = %text, "Dropping stream message"),
        }
    }

    fn close(&mut self, reason: &str) -> ListenerState {
        info!(reason, "WebSocket listener closed");
        self.state = ListenerState::Closed;
        self.state
    }
}
