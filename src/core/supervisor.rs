// src/core/supervisor.rs
use crate::config::AppConfig;
use crate::connectors::stream::{ListenerState, StreamListener};
use crate::connectors::traits::ExchangeClient;
use crate::core::engine::{DecisionEngine, EngineExit, EngineSettings};
use crate::storage::{PortfolioJournal, TradeJournal};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the lifecycle: stream listener in the background, decision loop in
/// the foreground, and a shutdown that waits for the listener to close.
pub struct TradingSupervisor {
    config: AppConfig,
    client: Arc<dyn ExchangeClient>,
}

impl TradingSupervisor {
    pub fn new(config: AppConfig, client: Arc<dyn ExchangeClient>) -> Self {
        Self { config, client }
    }

    /// `stop` is the process-wide stop signal. It is cancelled here on the
    /// way out, so the listener always sees it.
    pub async fn run(&self, stop: CancellationToken) -> Result<EngineExit> {
        if !self.config.live_trading {
            info!("Live trading is disabled. Exiting bot.");
            return Ok(EngineExit::TradingDisabled);
        }

        let mut engine = DecisionEngine::new(
            EngineSettings::from_config(&self.config),
            Arc::clone(&self.client),
            TradeJournal::new(&self.config.storage.trade_log),
            PortfolioJournal::new(&self.config.storage.portfolio_log),
        )
        .context("Refusing to start with invalid trading configuration")?;

        let token = self
            .client
            .get_stream_token()
            .await
            .context("Could not get WebSocket token")?;

        let endpoints = &self.config.endpoints;
        let mut listener = StreamListener::new(
            &endpoints.ws_url,
            token,
            &endpoints.stream_channel,
            endpoints.recv_timeout(),
        );
        let mut feed = engine.fill_feed();
        let listener_stop = stop.clone();
        let listener_task = tokio::spawn(async move {
            let state = listener.run(&mut feed, &listener_stop).await;
            if !listener_stop.is_cancelled() {
                warn!("Stream closed while trading continues; fills will only show up via REST");
            }
            state
        });

        let exit = engine.run(&stop).await;
        info!(?exit, pnl = %engine.state().realized_pnl, "Stopping trading bot...");
        stop.cancel();

        if self.config.trading.cancel_orders_on_exit {
            match self.client.cancel_all().await {
                Ok(count) => info!(count, "Cancelled open orders on exit"),
                Err(e) => error!(error = %e, "Failed to cancel open orders on exit"),
            }
        }

        match listener_task.await {
            Ok(ListenerState::Closed) => info!("Stream listener closed"),
            Ok(state) => warn!(?state, "Stream listener ended in unexpected state"),
            Err(e) => error!(error = %e, "Stream listener task failed"),
        }

        info!("Bot stopped.");
        Ok(exit)
    }
}
