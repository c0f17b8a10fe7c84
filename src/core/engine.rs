// src/core/engine.rs
use crate::config::AppConfig;
use crate::connectors::messages::{StreamData, StreamEvent};
use crate::connectors::traits::{ExchangeClient, StreamHandler};
use crate::error::TradingResult;
use crate::storage::{PortfolioJournal, TradeJournal};
use crate::strategies::threshold::{Decision, ThresholdRule};
use crate::types::{
    AccountState, OrderRequest, OrderType, OwnTrade, PortfolioSnapshot, TradeRecord,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub buy_threshold: Decimal,
    pub sell_threshold: Decimal,
    pub min_trade_volume: Decimal,
    pub max_trade_notional: Decimal,
    pub target_profit: Decimal,
    pub cycle_interval: Duration,
    /// Asset (upper case, as Kraken reports balances) -> pair.
    pub pairs: BTreeMap<String, String>,
    pub quote_asset: String,
    pub volume_step: Decimal,
    pub order_type: OrderType,
    pub live_trading: bool,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let t = &cfg.trading;
        Self {
            buy_threshold: t.buy_threshold,
            sell_threshold: t.sell_threshold,
            min_trade_volume: t.min_trade_volume,
            max_trade_notional: t.max_trade_notional,
            target_profit: t.target_profit,
            cycle_interval: cfg.cycle_interval(),
            pairs: t
                .pairs
                .iter()
                .map(|(asset, pair)| (asset.to_uppercase(), pair.clone()))
                .collect(),
            quote_asset: t.quote_asset.to_uppercase(),
            volume_step: t.volume_step,
            order_type: t.order_type,
            live_trading: cfg.live_trading,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    TradingDisabled,
    Stopped,
    TargetReached,
}

/// Stream-side half of the engine: forwards fills into the engine's queue.
/// Holds no exchange client, so nothing reachable from here can trade.
pub struct FillFeed {
    tx: mpsc::UnboundedSender<OwnTrade>,
}

impl StreamHandler for FillFeed {
    fn on_event(&mut self, event: &StreamEvent) {
        if event.event == "systemStatus" {
            let status = event.payload.get("status").and_then(|s| s.as_str());
            if status != Some("online") {
                warn!(?status, "Exchange reports degraded system status");
            }
        }
    }

    fn on_data(&mut self, data: StreamData) {
        if data.trades.is_empty() {
            debug!(channel = %data.channel, raw = %data.raw, "Stream data without fills");
            return;
        }
        for trade in data.trades {
            if self.tx.send(trade).is_err() {
                warn!("Decision engine gone, dropping fill");
                return;
            }
        }
    }
}

pub struct DecisionEngine {
    settings: EngineSettings,
    rule: ThresholdRule,
    client: Arc<dyn ExchangeClient>,
    state: AccountState,
    trade_journal: TradeJournal,
    portfolio_journal: PortfolioJournal,
    fills: Option<mpsc::UnboundedReceiver<OwnTrade>>,
}

impl DecisionEngine {
    /// Fails with `InvalidThresholds` unless `buy_threshold < sell_threshold`.
    pub fn new(
        settings: EngineSettings,
        client: Arc<dyn ExchangeClient>,
        trade_journal: TradeJournal,
        portfolio_journal: PortfolioJournal,
    ) -> TradingResult<Self> {
        let rule = ThresholdRule::new(
            settings.buy_threshold,
            settings.sell_threshold,
            settings.max_trade_notional,
            settings.volume_step,
        )?;

        Ok(Self {
            settings,
            rule,
            client,
            state: AccountState::default(),
            trade_journal,
            portfolio_journal,
            fills: None,
        })
    }

    /// Handler for the stream listener. Fills it forwards are drained at the
    /// next cycle boundary.
    pub fn fill_feed(&mut self) -> FillFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.fills = Some(rx);
        FillFeed { tx }
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    fn target_reached(&self) -> bool {
        self.state.realized_pnl >= self.settings.target_profit
    }

    pub async fn run(&mut self, stop: &CancellationToken) -> EngineExit {
        if !self.settings.live_trading {
            info!("Live trading is disabled. Decision loop not started.");
            return EngineExit::TradingDisabled;
        }

        info!(
            buy_threshold = %self.settings.buy_threshold,
            sell_threshold = %self.settings.sell_threshold,
            target_profit = %self.settings.target_profit,
            interval_secs = self.settings.cycle_interval.as_secs(),
            trade_log = %self.trade_journal.path().display(),
            "Decision loop running"
        );

        loop {
            if stop.is_cancelled() {
                return EngineExit::Stopped;
            }
            if self.target_reached() {
                break;
            }

            self.run_cycle().await;

            if self.target_reached() {
                break;
            }
            if stop.is_cancelled() {
                return EngineExit::Stopped;
            }

            tokio::select! {
                _ = stop.cancelled() => return EngineExit::Stopped,
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
            }
        }

        info!(pnl = %self.state.realized_pnl, "🎯 Target profit reached");
        EngineExit::TargetReached
    }

    /// One pass: refresh account, price eligible assets, maybe trade, snapshot.
    /// Every failure is logged and only skips the part it affects.
    pub async fn run_cycle(&mut self) {
        if let Err(e) = self.refresh_account().await {
            warn!(error = %e, "Account refresh failed, skipping cycle");
            return;
        }
        self.drain_fills();

        let candidates: Vec<(String, String, Decimal)> = self
            .settings
            .pairs
            .iter()
            .filter_map(|(asset, pair)| {
                let balance = *self.state.balances.get(asset)?;
                (balance >= self.settings.min_trade_volume).then(|| (asset.clone(), pair.clone(), balance))
            })
            .collect();

        let mut prices = BTreeMap::new();
        for (asset, pair, balance) in candidates {
            let price = match self.client.get_price(&pair).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(%pair, error = %e, "No price, skipping asset this cycle");
                    continue;
                }
            };
            prices.insert(asset, price);

            info!(%pair, %price, %balance, "Evaluating thresholds");
            if let Some(decision) = self.rule.evaluate(price, balance) {
                self.execute(&pair, price, decision).await;
            }
        }

        self.record_portfolio(&prices);
    }

    async fn refresh_account(&mut self) -> TradingResult<()> {
        let balances = self.client.get_balance().await?;
        let open_orders = self.client.get_open_orders().await?;
        self.state.balances = balances;
        self.state.open_orders = open_orders;
        Ok(())
    }

    /// Logs fills queued by the stream since the last cycle. The REST
    /// snapshot taken just before already counts them in `vol_exec`, so the
    /// snapshot is left as is.
    fn drain_fills(&mut self) {
        let Some(rx) = self.fills.as_mut() else {
            return;
        };

        while let Ok(fill) = rx.try_recv() {
            info!(
                trade_id = %fill.trade_id,
                order_id = %fill.order_id,
                pair = %fill.pair,
                side = %fill.side,
                price = %fill.price,
                volume = %fill.volume,
                "Fill received"
            );

            match self.state.open_orders.get(&fill.order_id) {
                Some(order) => info!(
                    order_id = %fill.order_id,
                    remaining = %(order.vol - order.vol_exec),
                    "Order still open after fill"
                ),
                None => info!(order_id = %fill.order_id, "Order no longer open"),
            }
        }
    }

    async fn execute(&mut self, pair: &str, price: Decimal, decision: Decision) {
        let order = match self.settings.order_type {
            OrderType::Limit => OrderRequest::limit(pair, decision.side, decision.volume, price),
            OrderType::Market => OrderRequest::market(pair, decision.side, decision.volume),
        };

        match self.client.place_order(&order).await {
            Ok(order_id) => {
                self.state.realized_pnl += decision.pnl_delta;
                info!(
                    %order_id,
                    side = %decision.side,
                    volume = %decision.volume,
                    %price,
                    pnl = %self.state.realized_pnl,
                    "✅ Order accepted"
                );

                let record = TradeRecord {
                    timestamp: Utc::now(),
                    pair: pair.to_string(),
                    side: decision.side,
                    volume: decision.volume,
                    price,
                    pnl_delta: decision.pnl_delta,
                };
                if let Err(e) = self.trade_journal.append(&record) {
                    error!(error = %e, "Failed to append trade record");
                }
            }
            Err(e) => {
                error!(%pair, side = %decision.side, error = %e, "⚠️ Order failed, state unchanged");
            }
        }
    }

    fn record_portfolio(&self, prices: &BTreeMap<String, Decimal>) {
        let quote = self
            .state
            .balances
            .get(&self.settings.quote_asset)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let holdings: Decimal = prices
            .iter()
            .filter_map(|(asset, price)| self.state.balances.get(asset).map(|b| *b * *price))
            .sum();

        let snapshot = PortfolioSnapshot {
            timestamp: Utc::now(),
            value: quote + holdings,
        };
        if let Err(e) = self.portfolio_journal.append(&snapshot) {
            error!(error = %e, "Failed to append portfolio snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::MockExchange;
    use crate::error::TradingError;
    use crate::types::{OrderDetail, Side};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn settings() -> EngineSettings {
        EngineSettings {
            buy_threshold: dec!(0.0000075),
            sell_threshold: dec!(0.0000085),
            min_trade_volume: dec!(5000),
            max_trade_notional: dec!(3.0),
            target_profit: dec!(100.0),
            cycle_interval: Duration::from_secs(60),
            pairs: [("SHIB".to_string(), "SHIB/USD".to_string())].into_iter().collect(),
            quote_asset: "ZUSD".into(),
            volume_step: dec!(1),
            order_type: OrderType::Limit,
            live_trading: true,
        }
    }

    fn engine(settings: EngineSettings, mock: Arc<MockExchange>) -> (DecisionEngine, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = DecisionEngine::new(
            settings,
            mock,
            TradeJournal::new(dir.path().join("trade_log.csv")),
            PortfolioJournal::new(dir.path().join("portfolio_values.csv")),
        )
        .unwrap();
        (engine, dir)
    }

    fn lines(dir: &TempDir, file: &str) -> usize {
        std::fs::read_to_string(dir.path().join(file))
            .map(|c| c.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_buy_below_threshold() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(6000))
                .with_balance("ZUSD", dec!(10))
                .with_price("SHIB/USD", dec!(0.000007)),
        );
        let (mut engine, dir) = engine(settings(), mock.clone());

        engine.run_cycle().await;

        let placed = mock.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, Side::Buy);
        assert_eq!(placed[0].order_type, OrderType::Limit);
        assert_eq!(placed[0].volume, dec!(6000));
        assert_eq!(placed[0].price, Some(dec!(0.000007)));
        assert_eq!(engine.state().realized_pnl, dec!(-3.0));
        assert_eq!(lines(&dir, "trade_log.csv"), 2);
        assert_eq!(lines(&dir, "portfolio_values.csv"), 2);
    }

    #[tokio::test]
    async fn test_sell_above_threshold() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(1000000))
                .with_price("SHIB/USD", dec!(0.000009)),
        );
        let (mut engine, _dir) = engine(settings(), mock.clone());

        engine.run_cycle().await;

        let placed = mock.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, Side::Sell);
        assert_eq!(placed[0].volume, dec!(333333));
        assert_eq!(engine.state().realized_pnl, dec!(3.0));
    }

    #[tokio::test]
    async fn test_market_order_type_sends_no_price() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(6000))
                .with_price("SHIB/USD", dec!(0.000007)),
        );
        let mut market = settings();
        market.order_type = OrderType::Market;
        let (mut engine, _dir) = engine(market, mock.clone());

        engine.run_cycle().await;

        let placed = mock.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].order_type, OrderType::Market);
        assert_eq!(placed[0].price, None);
        assert_eq!(engine.state().realized_pnl, dec!(-3.0));
    }

    #[tokio::test]
    async fn test_no_order_between_thresholds() {
        for price in [dec!(0.0000075), dec!(0.000008), dec!(0.0000085)] {
            let mock = Arc::new(
                MockExchange::default()
                    .with_balance("SHIB", dec!(6000))
                    .with_price("SHIB/USD", price),
            );
            let (mut engine, dir) = engine(settings(), mock.clone());

            engine.run_cycle().await;

            assert!(mock.placed().is_empty(), "unexpected order at {}", price);
            assert_eq!(engine.state().realized_pnl, Decimal::ZERO);
            assert_eq!(lines(&dir, "trade_log.csv"), 0);
            assert_eq!(lines(&dir, "portfolio_values.csv"), 2);
        }
    }

    #[tokio::test]
    async fn test_balance_below_minimum_is_not_priced() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(4999))
                .with_price("SHIB/USD", dec!(0.000007)),
        );
        let (mut engine, _dir) = engine(settings(), mock.clone());

        engine.run_cycle().await;

        assert_eq!(MockExchange::calls(&mock.price_calls), 0);
        assert!(mock.placed().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_order_leaves_state_untouched() {
        let mock = Arc::new(MockExchange {
            reject_orders: true,
            ..MockExchange::default()
        }
        .with_balance("SHIB", dec!(6000))
        .with_price("SHIB/USD", dec!(0.000007)));
        let (mut engine, dir) = engine(settings(), mock.clone());

        engine.run_cycle().await;

        assert_eq!(engine.state().realized_pnl, Decimal::ZERO);
        assert_eq!(lines(&dir, "trade_log.csv"), 0);
    }

    #[tokio::test]
    async fn test_missing_price_skips_asset() {
        let mock = Arc::new(MockExchange::default().with_balance("SHIB", dec!(6000)));
        let (mut engine, _dir) = engine(settings(), mock.clone());

        engine.run_cycle().await;

        assert_eq!(MockExchange::calls(&mock.price_calls), 1);
        assert!(mock.placed().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_skips_cycle() {
        let mock = Arc::new(MockExchange {
            fail_balance: true,
            ..MockExchange::default()
        }
        .with_price("SHIB/USD", dec!(0.000007)));
        let (mut engine, dir) = engine(settings(), mock.clone());

        engine.run_cycle().await;

        assert_eq!(MockExchange::calls(&mock.price_calls), 0);
        assert!(mock.placed().is_empty());
        assert_eq!(lines(&dir, "portfolio_values.csv"), 0);
    }

    #[tokio::test]
    async fn test_invalid_thresholds_rejected_at_construction() {
        let mut bad = settings();
        bad.buy_threshold = dec!(0.0000085);
        let dir = tempfile::tempdir().unwrap();

        let result = DecisionEngine::new(
            bad,
            Arc::new(MockExchange::default()),
            TradeJournal::new(dir.path().join("t.csv")),
            PortfolioJournal::new(dir.path().join("p.csv")),
        );
        assert!(matches!(result, Err(TradingError::InvalidThresholds { .. })));
    }

    #[tokio::test]
    async fn test_disabled_live_trading_makes_no_calls() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(6000))
                .with_price("SHIB/USD", dec!(0.000007)),
        );
        let mut disabled = settings();
        disabled.live_trading = false;
        let (mut engine, _dir) = engine(disabled, mock.clone());

        let exit = engine.run(&CancellationToken::new()).await;

        assert_eq!(exit, EngineExit::TradingDisabled);
        assert_eq!(MockExchange::calls(&mock.balance_calls), 0);
        assert!(mock.placed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_at_target_profit() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(1000000))
                .with_price("SHIB/USD", dec!(0.000009)),
        );
        let mut target = settings();
        target.target_profit = dec!(6.0);
        let (mut engine, _dir) = engine(target, mock.clone());

        let exit = engine.run(&CancellationToken::new()).await;

        assert_eq!(exit, EngineExit::TargetReached);
        assert_eq!(mock.placed().len(), 2);
        assert_eq!(engine.state().realized_pnl, dec!(6.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_sleep_exits_within_interval() {
        let mock = Arc::new(
            MockExchange::default()
                .with_balance("SHIB", dec!(6000))
                .with_price("SHIB/USD", dec!(0.000008)),
        );
        let (mut engine, _dir) = engine(settings(), mock.clone());
        let stop = CancellationToken::new();
        let task_stop = stop.clone();

        let start = tokio::time::Instant::now();
        let handle = tokio::spawn(async move { engine.run(&task_stop).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.cancel();
        let exit = handle.await.unwrap();

        assert_eq!(exit, EngineExit::Stopped);
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(MockExchange::calls(&mock.balance_calls), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_stop_runs_no_cycle() {
        let mock = Arc::new(MockExchange::default());
        let (mut engine, _dir) = engine(settings(), mock.clone());
        let stop = CancellationToken::new();
        stop.cancel();

        assert_eq!(engine.run(&stop).await, EngineExit::Stopped);
        assert_eq!(MockExchange::calls(&mock.balance_calls), 0);
    }

    fn fill(order_id: &str, volume: Decimal) -> StreamData {
        StreamData {
            channel: "ownTrades".into(),
            sequence: Some(1),
            trades: vec![OwnTrade {
                trade_id: "T-1".into(),
                order_id: order_id.into(),
                pair: "SHIB/USD".into(),
                side: Side::Sell,
                order_type: "limit".into(),
                price: dec!(0.000009),
                volume,
                time: "1".into(),
            }],
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_stream_fill_does_not_double_count_rest_snapshot() {
        let mock = Arc::new(MockExchange::default().with_balance("SHIB", dec!(100)));
        mock.open_orders.lock().insert(
            "O-1".into(),
            OrderDetail {
                status: "open".into(),
                vol: dec!(100),
                vol_exec: dec!(50),
                ..OrderDetail::default()
            },
        );
        let (mut engine, _dir) = engine(settings(), mock.clone());
        let mut feed = engine.fill_feed();

        // the 50 already counted in vol_exec arrives on the stream as well
        feed.on_data(fill("O-1", dec!(50)));
        engine.run_cycle().await;

        let order = engine.state().open_orders.get("O-1").expect("order still open");
        assert_eq!(order.vol_exec, dec!(50));
    }

    #[tokio::test]
    async fn test_open_orders_follow_rest_snapshot() {
        let mock = Arc::new(MockExchange::default().with_balance("SHIB", dec!(100)));
        mock.open_orders.lock().insert(
            "O-1".into(),
            OrderDetail {
                status: "open".into(),
                vol: dec!(100),
                ..OrderDetail::default()
            },
        );
        let (mut engine, _dir) = engine(settings(), mock.clone());
        let mut feed = engine.fill_feed();

        engine.run_cycle().await;
        assert!(engine.state().open_orders.contains_key("O-1"));

        // filled on the exchange: gone from the next snapshot
        mock.open_orders.lock().clear();
        feed.on_data(fill("O-1", dec!(100)));
        engine.run_cycle().await;
        assert!(engine.state().open_orders.is_empty());
    }

    #[test]
    fn test_settings_from_config_uppercases_assets() {
        let mut cfg = AppConfig::load("does/not/exist/config").unwrap();
        cfg.trading.pairs = [("shib".to_string(), "SHIB/USD".to_string())].into_iter().collect();
        cfg.trading.quote_asset = "zusd".into();

        let s = EngineSettings::from_config(&cfg);
        assert_eq!(s.pairs.get("SHIB").map(String::as_str), Some("SHIB/USD"));
        assert_eq!(s.quote_asset, "ZUSD");
    }
}
