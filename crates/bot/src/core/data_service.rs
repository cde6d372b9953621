//! Market data for the decision pipeline.
//!
//! [`MarketDataSource`] is the seam the engine depends on. [`BinanceFuturesSource`]
//! implements it over the Binance USDⓈ-M futures REST API:
//!   - `/fapi/v1/klines`: OHLCV history
//!   - `/fapi/v1/depth`: order-book top levels
//!   - `/fapi/v1/premiumIndex`: last funding rate
//!   - `/fapi/v1/openInterest`: open interest (change computed against the
//!     previous reading for the same symbol)
//!
//! Klines are mandatory. The condition snapshot is best-effort: each source
//! that fails is logged and left empty, never failing the cycle.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::constants::PERCENT;
use crate::errors::BotError;
use crate::types::{KlineBar, MarketConditionSnapshot, OrderBookSnapshot};

/// Depth levels requested from the venue (smallest bucket Binance accepts).
const DEPTH_LIMIT: &str = "5";

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `limit` candles for `symbol`, oldest first.
    async fn klines(&self, symbol: &str, interval: &str, limit: u32)
        -> Result<Vec<KlineBar>, BotError>;

    /// Best-effort microstructure snapshot. Missing sources are `None`.
    async fn conditions(&self, symbol: &str) -> Result<MarketConditionSnapshot, BotError>;
}

// ---------------------------------------------------------------------------
// Binance futures REST source
// ---------------------------------------------------------------------------

pub struct BinanceFuturesSource {
    client: Client,
    base_url: String,
    last_open_interest: Mutex<HashMap<String, Decimal>>,
}

impl BinanceFuturesSource {
    pub fn new(config: &EngineConfig) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .build()
            .map_err(|e| BotError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.market_data_url.trim_end_matches('/').to_string(),
            last_open_interest: Mutex::new(HashMap::new()),
        })
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, BotError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| BotError::PartialDataUnavailable {
                source_name: format!("{path}: {e}"),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "rate limited");
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::PartialDataUnavailable {
                source_name: format!("{path}: HTTP {status}: {body}"),
            });
        }

        Ok(resp.json::<Value>().await?)
    }

    async fn order_book(&self, symbol: &str) -> Result<OrderBookSnapshot, BotError> {
        let data = self
            .get("/fapi/v1/depth", &[("symbol", symbol), ("limit", DEPTH_LIMIT)])
            .await?;
        Ok(OrderBookSnapshot {
            bids: parse_price_qty_array(data.get("bids")),
            asks: parse_price_qty_array(data.get("asks")),
            timestamp: data
                .get("E")
                .and_then(Value::as_i64)
                .unwrap_or_else(now_millis),
        })
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Option<Decimal>, BotError> {
        let data = self.get("/fapi/v1/premiumIndex", &[("symbol", symbol)]).await?;
        Ok(data.get("lastFundingRate").and_then(parse_decimal))
    }

    async fn open_interest(&self, symbol: &str) -> Result<Option<Decimal>, BotError> {
        let data = self.get("/fapi/v1/openInterest", &[("symbol", symbol)]).await?;
        Ok(data.get("openInterest").and_then(parse_decimal))
    }

    /// Percent change against the previous reading; the first reading has none.
    fn record_open_interest(&self, symbol: &str, current: Decimal) -> Option<Decimal> {
        let mut last = self.last_open_interest.lock().ok()?;
        let previous = last.insert(symbol.to_string(), current);
        percent_change(previous?, current)
    }
}

#[async_trait]
impl MarketDataSource for BinanceFuturesSource {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<KlineBar>, BotError> {
        let start = Instant::now();
        let limit_str = limit.to_string();
        let data = self
            .get(
                "/fapi/v1/klines",
                &[("symbol", symbol), ("interval", interval), ("limit", &limit_str)],
            )
            .await?;

        let bars = parse_klines(&data)?;
        debug!(
            symbol,
            interval,
            bars = bars.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "klines fetched"
        );
        Ok(bars)
    }

    async fn conditions(&self, symbol: &str) -> Result<MarketConditionSnapshot, BotError> {
        let (book, funding, oi) = tokio::join!(
            self.order_book(symbol),
            self.funding_rate(symbol),
            self.open_interest(symbol),
        );

        let order_book = book
            .map_err(|e| debug!(symbol, error = %e, "order book unavailable"))
            .ok();
        let funding_rate = funding
            .map_err(|e| debug!(symbol, error = %e, "funding rate unavailable"))
            .ok()
            .flatten();
        let open_interest = oi
            .map_err(|e| debug!(symbol, error = %e, "open interest unavailable"))
            .ok()
            .flatten();
        let open_interest_change_pct =
            open_interest.and_then(|current| self.record_open_interest(symbol, current));

        Ok(MarketConditionSnapshot {
            order_book,
            funding_rate,
            open_interest,
            open_interest_change_pct,
        })
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Binance encodes decimals as strings; accept plain numbers too.
fn parse_decimal(v: &Value) -> Option<Decimal> {
    v.as_str()
        .and_then(|s| s.parse::<Decimal>().ok())
        .or_else(|| v.as_f64().and_then(Decimal::from_f64))
}

/// `[[price, qty], ...]` from a depth response.
fn parse_price_qty_array(v: Option<&Value>) -> Vec<(Decimal, Decimal)> {
    let Some(arr) = v.and_then(Value::as_array) else {
        return Vec::new();
    };

    arr.iter()
        .filter_map(|entry| {
            let pair = entry.as_array()?;
            Some((parse_decimal(pair.first()?)?, parse_decimal(pair.get(1)?)?))
        })
        .collect()
}

/// `[[open_time, O, H, L, C, V, ...], ...]`. A malformed row fails the fetch
/// rather than leaving a gap in the series.
fn parse_klines(data: &Value) -> Result<Vec<KlineBar>, BotError> {
    let rows = data.as_array().ok_or_else(|| BotError::PartialDataUnavailable {
        source_name: "klines response not an array".into(),
    })?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let bar = row.as_array().filter(|items| items.len() >= 6).and_then(|items| {
                Some(KlineBar {
                    timestamp: items[0].as_i64()?,
                    open: parse_decimal(&items[1])?,
                    high: parse_decimal(&items[2])?,
                    low: parse_decimal(&items[3])?,
                    close: parse_decimal(&items[4])?,
                    volume: parse_decimal(&items[5])?,
                })
            });
            bar.ok_or_else(|| BotError::InvalidInput {
                reason: format!("malformed kline row {i}"),
            })
        })
        .collect()
}

fn percent_change(previous: Decimal, current: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    Some((current - previous) / previous * PERCENT)
}
