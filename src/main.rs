// src/main.rs
use crate::config::AppConfig;
use crate::connectors::kraken::KrakenClient;
use crate::core::supervisor::TradingSupervisor;
use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod connectors;
mod core;
mod error;
mod storage;
mod strategies;
mod types;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config_path = env::var("APP_CONFIG").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _log_guard = utils::logging::init(&config.logging)?;

    println!("========================================");
    println!("      KRAKEN SNIPER BOT - v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!("Pairs:  {:?}", config.trading.pairs.values().collect::<Vec<_>>());
    println!(
        "Band:   buy < {} | sell > {}",
        config.trading.buy_threshold, config.trading.sell_threshold
    );
    println!(
        "Mode:   {}",
        if config.live_trading {
            "🚨 LIVE TRADING"
        } else {
            "📝 DISABLED"
        }
    );
    println!("========================================");

    info!(
        stop_loss = config.stop_loss,
        take_profit = config.take_profit,
        risk_per_trade = config.risk_per_trade,
        "Risk parameters loaded (informational only)"
    );

    // 2. Initialize Components
    let client = KrakenClient::from_config(&config).map_err(|e| {
        error!(error = %e, "Invalid API credentials");
        e
    })?;

    // 3. Stop signal shared by the decision loop and the stream listener
    let stop = CancellationToken::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, shutting down");
                ctrl_c_stop.cancel();
            }
            Err(e) => error!(error = %e, "Unable to listen for shutdown signal"),
        }
    });

    // 4. Run
    let supervisor = TradingSupervisor::new(config, Arc::new(client));
    match supervisor.run(stop).await {
        Ok(exit) => {
            info!(?exit, "Supervisor finished");
            Ok(())
        }
        Err(e) => {
            error!("Fatal supervisor error: {:#}", e);
            Err(e)
        }
    }
}
