//! TTL-bounded mirror of live exposure, keyed by canonical symbol.
//!
//! An entry is valid only while `now - last_update <= ttl`. Stale entries are
//! treated as absent and evicted on the next access, which forces callers back
//! to the exchange.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::types::Position;

#[derive(Debug, Clone)]
struct CacheEntry {
    position: Position,
    last_update: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_update) <= ttl
    }
}

/// Owned by its caller and shared by reference; there is no global instance.
pub struct PositionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl PositionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cache only holds a mirror, so a poisoned lock keeps its contents.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh entry for `symbol`; a stale one is evicted and reported absent.
    pub fn get(&self, symbol: &str) -> Option<Position> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(symbol) {
            Some(entry) if entry.is_fresh(now, self.ttl) => Some(entry.position.clone()),
            Some(_) => {
                entries.remove(symbol);
                debug!(symbol, "evicted stale cached position");
                None
            }
            None => None,
        }
    }

    /// Insert or refresh the entry for `position.symbol`.
    pub fn set(&self, position: Position) {
        let now = Instant::now();
        let mut entries = self.lock();
        Self::prune(&mut entries, now, self.ttl);
        entries.insert(
            position.symbol.clone(),
            CacheEntry {
                position,
                last_update: now,
            },
        );
    }

    /// Remove the entry for `symbol`, returning it if it was still fresh.
    pub fn clear(&self, symbol: &str) -> Option<Position> {
        let now = Instant::now();
        let mut entries = self.lock();
        Self::prune(&mut entries, now, self.ttl);
        entries.remove(symbol).map(|e| e.position)
    }

    /// All fresh entries, sorted by symbol. Stale ones are pruned.
    pub fn get_all(&self) -> Vec<Position> {
        let now = Instant::now();
        let mut entries = self.lock();
        Self::prune(&mut entries, now, self.ttl);
        let mut positions: Vec<Position> = entries.values().map(|e| e.position.clone()).collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(entries: &mut HashMap<String, CacheEntry>, now: Instant, ttl: Duration) {
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now, ttl));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "pruned stale cached positions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionDirection;
    use rust_decimal_macros::dec;

    fn position(symbol: &str) -> Position {
        Position {
            symbol: symbol.into(),
            side: PositionDirection::Long,
            size: dec!(0.5),
            entry_price: dec!(100),
            current_price: dec!(100),
            leverage: dec!(3),
            stop_loss: Some(dec!(99.4)),
            take_profit: Some(dec!(101.2)),
            opened_at: 0,
        }
    }

    fn cache() -> PositionCache {
        PositionCache::new(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_returns_absent_and_evicts() {
        let cache = cache();
        cache.set(position("BTCUSDT"));
        assert!(cache.get("BTCUSDT").is_some());

        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(cache.get("BTCUSDT").is_none());
        assert!(cache.get_all().is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_valid_at_exact_ttl() {
        let cache = cache();
        cache.set(position("ETHUSDT"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get("ETHUSDT").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_all_prunes_only_stale_entries() {
        let cache = cache();
        cache.set(position("BTCUSDT"));
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.set(position("ETHUSDT"));
        tokio::time::advance(Duration::from_secs(15)).await;

        let all = cache.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].symbol, "ETHUSDT");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_timestamp() {
        let cache = cache();
        cache.set(position("BTCUSDT"));
        tokio::time::advance(Duration::from_secs(25)).await;
        cache.set(position("BTCUSDT"));
        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(cache.get("BTCUSDT").is_some());
    }

    #[test]
    fn test_clear_removes_entry() {
        let cache = cache();
        cache.set(position("BTCUSDT"));
        assert_eq!(cache.clear("BTCUSDT").map(|p| p.symbol), Some("BTCUSDT".into()));
        assert!(cache.get("BTCUSDT").is_none());
        assert!(cache.clear("BTCUSDT").is_none());
    }

    #[test]
    fn test_one_entry_per_symbol() {
        let cache = cache();
        cache.set(position("BTCUSDT"));
        let mut short = position("BTCUSDT");
        short.side = PositionDirection::Short;
        cache.set(short);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("BTCUSDT").map(|p| p.side), Some(PositionDirection::Short));
    }
}
