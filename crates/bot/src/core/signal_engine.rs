//! Per-instrument evaluation loops.
//!
//! Each configured instrument gets its own task ticking once per candle
//! timeframe. A tick fetches klines and a best-effort condition snapshot,
//! runs the [`DecisionPipeline`] under the cycle deadline and publishes the
//! [`CycleAudit`] on a shared `mpsc` channel. An approved decision opens a
//! position through the [`PositionManager`] unless one is already live.
//!
//! A cycle that overruns the deadline is dropped as HOLD. Orders are only
//! placed after the cycle completed, so an abandoned cycle never leaves a
//! partial order behind. Order placement has its own bound of
//! `request_timeout_ms`, so a stalled venue cannot hold the instrument loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::data_service::MarketDataSource;
use crate::core::pipeline::{CycleOutcome, DecisionPipeline};
use crate::core::position_manager::{normalize_symbol, PositionManager};
use crate::errors::BotError;
use crate::types::{CycleAudit, FusionDecision, OpenOrder, Position, SignalAction};

/// Decimal places kept when converting quote notional into contract size.
const SIZE_DECIMALS: u32 = 6;

pub struct SignalEngine {
    source: Arc<dyn MarketDataSource>,
    pipeline: Arc<DecisionPipeline>,
    positions: Arc<PositionManager>,
    audit_tx: mpsc::Sender<CycleAudit>,
    config: EngineConfig,
    shutdown: CancellationToken,
}

impl SignalEngine {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        pipeline: Arc<DecisionPipeline>,
        positions: Arc<PositionManager>,
        audit_tx: mpsc::Sender<CycleAudit>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            pipeline,
            positions,
            audit_tx,
            config,
            shutdown,
        }
    }

    /// Run every instrument loop until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            instruments = ?self.config.instruments,
            interval = %self.config.interval,
            deadline_ms = self.config.cycle_deadline_ms,
            "signal engine started"
        );

        let mut tasks = JoinSet::new();
        for instrument in &self.config.instruments {
            let engine = Arc::clone(&self);
            let symbol = normalize_symbol(instrument);
            tasks.spawn(async move { engine.run_instrument(symbol).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("instrument loop aborted: {e}");
            }
        }

        info!("signal engine stopped");
        Ok(())
    }

    async fn run_instrument(&self, symbol: String) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(symbol = %symbol, "instrument loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let audit = self.evaluate_once(&symbol).await;
                    if let Err(e) = self.audit_tx.send(audit).await {
                        error!(symbol = %symbol, "failed to send cycle audit: {e}");
                    }
                }
            }
        }
    }

    /// One full cycle for `symbol`, including order placement on approval.
    pub async fn evaluate_once(&self, symbol: &str) -> CycleAudit {
        let symbol = normalize_symbol(symbol);
        let cycle_cancel = self.shutdown.child_token();
        let deadline = Duration::from_millis(self.config.cycle_deadline_ms);

        let outcome = match tokio::time::timeout(deadline, self.cycle(&symbol, &cycle_cancel)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                cycle_cancel.cancel();
                warn!(symbol = %symbol, deadline_ms = self.config.cycle_deadline_ms, "cycle deadline exceeded");
                CycleOutcome::hold(
                    &symbol,
                    0,
                    format!("cycle deadline of {}ms exceeded", self.config.cycle_deadline_ms),
                )
            }
        };

        let mut audit = outcome.audit.clone();
        if let Some(decision) = outcome.approved() {
            let bound = Duration::from_millis(self.config.request_timeout_ms);
            let acted = tokio::time::timeout(bound, self.act(decision))
                .await
                .unwrap_or_else(|_| {
                    Err(BotError::ExchangeError {
                        reason: format!(
                            "order placement exceeded {}ms",
                            self.config.request_timeout_ms
                        ),
                    })
                });
            match acted {
                Ok(Some(position)) => {
                    debug!(symbol = %symbol, size = %position.size, "approved decision executed");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "approved decision not executed");
                    audit.reason = format!("{}; order not placed: {e}", audit.reason);
                }
            }
        }
        audit
    }

    async fn cycle(&self, symbol: &str, cancel: &CancellationToken) -> CycleOutcome {
        let bars = match self
            .source
            .klines(symbol, &self.config.interval, self.config.history_bars)
            .await
        {
            Ok(bars) => bars,
            Err(e) => return CycleOutcome::hold(symbol, 0, e.to_string()),
        };

        let conditions = self.source.conditions(symbol).await.unwrap_or_else(|e| {
            debug!(symbol, error = %e, "condition snapshot unavailable");
            Default::default()
        });

        self.pipeline.run_cycle(symbol, &bars, &conditions, cancel).await
    }

    /// Open a position for an approved decision; `None` when one is already live.
    async fn act(&self, decision: &FusionDecision) -> Result<Option<Position>, BotError> {
        let Some(side) = decision.direction else {
            return Ok(None);
        };

        if self.positions.get_position(&decision.symbol).await?.is_some() {
            info!(symbol = %decision.symbol, "position already live, skipping entry");
            return Ok(None);
        }

        let size = (self.config.order_notional_usd / decision.reference_price).round_dp(SIZE_DECIMALS);
        let order = OpenOrder {
            symbol: decision.symbol.clone(),
            side,
            size,
            leverage: self.config.leverage,
            stop_loss: decision.stop_loss,
            take_profit: decision.take_profit,
        };
        let reason = format!(
            "{} {} score {}",
            SignalAction::from_direction(side),
            decision.confidence.as_str(),
            decision.final_score.round_dp(4)
        );

        let position = self
            .positions
            .open(order, decision.reference_price, &reason)
            .await?;
        Ok(Some(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::config::{PositionConfig, RiskReviewConfig, SignalConfig};
    use crate::core::position_cache::PositionCache;
    use crate::core::position_store::InMemoryPositionStore;
    use crate::core::risk_review::{RiskOracle, RiskReviewStage};
    use crate::core::safety::SafetyState;
    use crate::execution::{ExchangeClient, PaperExchange};
    use crate::testing::{strong_long_bars, supportive_conditions, SlowOracle, StaticOracle};
    use crate::types::{KlineBar, MarketConditionSnapshot, RiskVerdict, Verdict};

    /// Serves the same bars and snapshot for every symbol, or fails klines.
    struct FixedSource {
        bars: Option<Vec<KlineBar>>,
        conditions: MarketConditionSnapshot,
    }

    #[async_trait]
    impl MarketDataSource for FixedSource {
        async fn klines(&self, _: &str, _: &str, _: u32) -> Result<Vec<KlineBar>, BotError> {
            self.bars.clone().ok_or_else(|| BotError::PartialDataUnavailable {
                source_name: "klines".into(),
            })
        }

        async fn conditions(&self, _: &str) -> Result<MarketConditionSnapshot, BotError> {
            Ok(self.conditions.clone())
        }
    }

    struct Harness {
        engine: Arc<SignalEngine>,
        exchange: Arc<PaperExchange>,
        audit_rx: mpsc::Receiver<CycleAudit>,
        shutdown: CancellationToken,
    }

    fn harness(bars: Option<Vec<KlineBar>>, oracle: Arc<dyn RiskOracle>, deadline_ms: u64) -> Harness {
        let exchange = Arc::new(PaperExchange::new(0));
        exchange.set_mark("BTCUSDT", dec!(98.5));
        exchange.set_mark("ETHUSDT", dec!(98.5));
        engine_over(bars, oracle, deadline_ms, exchange.clone(), exchange)
    }

    fn engine_over(
        bars: Option<Vec<KlineBar>>,
        oracle: Arc<dyn RiskOracle>,
        deadline_ms: u64,
        venue: Arc<dyn ExchangeClient>,
        exchange: Arc<PaperExchange>,
    ) -> Harness {
        let source = Arc::new(FixedSource {
            bars,
            conditions: supportive_conditions(),
        });
        let pipeline = Arc::new(DecisionPipeline::new(
            &SignalConfig::default(),
            RiskReviewStage::new(oracle, RiskReviewConfig::default()),
        ));

        let positions = Arc::new(PositionManager::new(
            venue,
            Arc::new(InMemoryPositionStore::new()),
            Arc::new(PositionCache::new(Duration::from_secs(30))),
            Arc::new(SafetyState::from_config(&PositionConfig {
                cooldown_between_actions_seconds: 0,
                ..PositionConfig::default()
            })),
        ));

        let (audit_tx, audit_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let config = EngineConfig {
            cycle_deadline_ms: deadline_ms,
            ..EngineConfig::default()
        };
        let engine = Arc::new(SignalEngine::new(
            source,
            pipeline,
            positions,
            audit_tx,
            config,
            shutdown.clone(),
        ));

        Harness {
            engine,
            exchange,
            audit_rx,
            shutdown,
        }
    }

    fn approving() -> Arc<dyn RiskOracle> {
        Arc::new(StaticOracle::new(RiskVerdict::approve("clean rejection of the low")))
    }

    #[tokio::test]
    async fn test_approval_opens_once() {
        let h = harness(Some(strong_long_bars()), approving(), 20_000);

        let audit = h.engine.evaluate_once("BTC/USDT").await;
        assert_eq!(audit.verdict, Verdict::Approve);
        assert_eq!(audit.signal, SignalAction::Buy);
        assert_eq!(h.exchange.open_calls(), 1);

        let position = h.exchange.get_position("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.size, dec!(10.152284));
        assert_eq!(position.leverage, dec!(3));

        // Still approved next cycle, but the live position blocks a second entry.
        let again = h.engine.evaluate_once("BTCUSDT").await;
        assert_eq!(again.verdict, Verdict::Approve);
        assert_eq!(h.exchange.open_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_overrun_is_hold_without_order() {
        let oracle = Arc::new(SlowOracle {
            delay: Duration::from_secs(5),
        });
        let h = harness(Some(strong_long_bars()), oracle, 1_000);

        let audit = h.engine.evaluate_once("BTCUSDT").await;
        assert_eq!(audit.signal, SignalAction::Hold);
        assert_eq!(audit.verdict, Verdict::Reject);
        assert!(audit.reason.contains("deadline"), "got: {}", audit.reason);
        assert_eq!(h.exchange.open_calls(), 0);
    }

    #[tokio::test]
    async fn test_kline_failure_is_hold() {
        let h = harness(None, approving(), 20_000);
        let audit = h.engine.evaluate_once("BTCUSDT").await;
        assert_eq!(audit.signal, SignalAction::Hold);
        assert!(audit.reason.contains("market data unavailable"));
        assert_eq!(h.exchange.open_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_audit_per_instrument_until_shutdown() {
        let mut h = harness(Some(strong_long_bars()), approving(), 20_000);
        let handle = tokio::spawn(Arc::clone(&h.engine).run());

        let mut symbols = vec![
            h.audit_rx.recv().await.unwrap().symbol,
            h.audit_rx.recv().await.unwrap().symbol,
        ];
        symbols.sort();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);

        h.shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    /// Accepts the order but never answers.
    struct StalledVenue;

    #[async_trait]
    impl ExchangeClient for StalledVenue {
        async fn open(&self, _: &OpenOrder) -> Result<Position, BotError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Err(BotError::ExchangeError {
                reason: "unreachable".into(),
            })
        }

        async fn close(&self, _: &str) -> Result<Decimal, BotError> {
            Ok(Decimal::ZERO)
        }

        async fn get_position(&self, _: &str) -> Result<Option<Position>, BotError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_order_placement_is_bounded() {
        let h = engine_over(
            Some(strong_long_bars()),
            approving(),
            20_000,
            Arc::new(StalledVenue),
            Arc::new(PaperExchange::new(0)),
        );

        let started = tokio::time::Instant::now();
        let audit = h.engine.evaluate_once("BTCUSDT").await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(audit.verdict, Verdict::Approve);
        assert!(audit.reason.contains("order not placed"), "got: {}", audit.reason);
        assert!(audit.reason.contains("exceeded 5000ms"), "got: {}", audit.reason);
    }
}
