// =============================================================================
// MarketDataCache — hybrid live/previous-close price cache backed by Redis
// =============================================================================
//
// This shields the upstream quote provider from request volume: the streamer
// writes live prices as they arrive off the websocket, and the daily
// refresher writes previous-close prices once a day. Every operation on the
// Redis-backed implementation is fail-soft: a Redis error is logged and
// treated as a cache miss rather than propagated, since a cold cache just
// means the caller falls through to the upstream client.
//
// `MarketDataCache` is a trait (not a concrete struct) so the evaluators,
// streamer, and daily refresher can be driven in tests against
// `InMemoryMarketDataCache` without a live Redis instance, the same seam
// pattern `repository/` uses for Postgres vs. in-memory storage.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{error, warn};

use crate::domain::Symbol;

const LIVE_PREFIX: &str = "stock:live:";
const PREV_PREFIX: &str = "stock:prev:";

/// TTL for live prices: long enough to ride out a brief websocket drop,
/// short enough that a dead stream doesn't serve hours-stale quotes.
const LIVE_TTL: Duration = Duration::from_secs(300);

/// TTL for previous-close prices: refreshed once a day, so a day's worth of
/// headroom is enough.
const PREV_TTL: Duration = Duration::from_secs(86_400);

#[async_trait]
pub trait MarketDataCache: Send + Sync {
    /// Cache the most recent live price observed off the websocket stream.
    async fn update_live_price(&self, symbol: &Symbol, price: f64);

    /// Fetch the cached live price, if any.
    async fn get_live_price(&self, symbol: &Symbol) -> Option<f64>;

    /// Cache the previous trading day's close price.
    async fn cache_previous_close(&self, symbol: &Symbol, price: f64);

    /// Fetch the cached previous close price, if any.
    async fn get_previous_close(&self, symbol: &Symbol) -> Option<f64>;

    /// Fetch multiple live prices in one round trip. Symbols with no cached
    /// value are simply absent from the result map.
    async fn get_all_live_prices(&self, symbols: &[Symbol]) -> HashMap<Symbol, f64>;
}

#[derive(Clone)]
pub struct RedisMarketDataCache {
    conn: ConnectionManager,
}

impl RedisMarketDataCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn live_key(symbol: &Symbol) -> String {
        format!("{LIVE_PREFIX}{symbol}")
    }

    fn prev_key(symbol: &Symbol) -> String {
        format!("{PREV_PREFIX}{symbol}")
    }
}

#[async_trait]
impl MarketDataCache for RedisMarketDataCache {
    async fn update_live_price(&self, symbol: &Symbol, price: f64) {
        let mut conn = self.conn.clone();
        let key = Self::live_key(symbol);
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, price.to_string(), LIVE_TTL.as_secs())
            .await
        {
            error!(symbol = %symbol, error = %e, "redis error caching live price");
        }
    }

    async fn get_live_price(&self, symbol: &Symbol) -> Option<f64> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(Self::live_key(symbol)).await {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "redis error reading live price");
                None
            }
        }
    }

    async fn cache_previous_close(&self, symbol: &Symbol, price: f64) {
        let mut conn = self.conn.clone();
        let key = Self::prev_key(symbol);
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, price.to_string(), PREV_TTL.as_secs())
            .await
        {
            error!(symbol = %symbol, error = %e, "redis error caching previous close");
        }
    }

    async fn get_previous_close(&self, symbol: &Symbol) -> Option<f64> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(Self::prev_key(symbol)).await {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "redis error reading previous close");
                None
            }
        }
    }

    async fn get_all_live_prices(&self, symbols: &[Symbol]) -> HashMap<Symbol, f64> {
        let mut result = HashMap::new();
        if symbols.is_empty() {
            return result;
        }

        let mut conn = self.conn.clone();
        let keys: Vec<String> = symbols.iter().map(Self::live_key).collect();

        let values: Vec<Option<String>> = match conn.mget(&keys).await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "redis error in get_all_live_prices");
                return result;
            }
        };

        for (symbol, value) in symbols.iter().zip(values) {
            if let Some(raw) = value {
                if let Ok(price) = raw.parse::<f64>() {
                    result.insert(symbol.clone(), price);
                }
            }
        }
        result
    }
}

/// In-process test double: no TTL eviction, no fail-soft error paths (there
/// is nothing that can fail), just a `Mutex`-guarded map per price kind.
/// Lets the evaluators, streamer, and daily refresher be driven end to end
/// in tests without a live Redis instance.
#[derive(Default)]
pub struct InMemoryMarketDataCache {
    live: parking_lot::Mutex<HashMap<Symbol, f64>>,
    prev_close: parking_lot::Mutex<HashMap<Symbol, f64>>,
}

impl InMemoryMarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(live: &[(&str, f64)], prev_close: &[(&str, f64)]) -> Self {
        let cache = Self::new();
        for (symbol, price) in live {
            cache.live.lock().insert(Symbol::new(symbol).unwrap(), *price);
        }
        for (symbol, price) in prev_close {
            cache.prev_close.lock().insert(Symbol::new(symbol).unwrap(), *price);
        }
        cache
    }
}

#[async_trait]
impl MarketDataCache for InMemoryMarketDataCache {
    async fn update_live_price(&self, symbol: &Symbol, price: f64) {
        self.live.lock().insert(symbol.clone(), price);
    }

    async fn get_live_price(&self, symbol: &Symbol) -> Option<f64> {
        self.live.lock().get(symbol).copied()
    }

    async fn cache_previous_close(&self, symbol: &Symbol, price: f64) {
        self.prev_close.lock().insert(symbol.clone(), price);
    }

    async fn get_previous_close(&self, symbol: &Symbol) -> Option<f64> {
        self.prev_close.lock().get(symbol).copied()
    }

    async fn get_all_live_prices(&self, symbols: &[Symbol]) -> HashMap<Symbol, f64> {
        let live = self.live.lock();
        symbols
            .iter()
            .filter_map(|s| live.get(s).map(|p| (s.clone(), *p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefixes_match_original_schema() {
        let sym = Symbol::new("AAPL").unwrap();
        assert_eq!(RedisMarketDataCache::live_key(&sym), "stock:live:AAPL");
        assert_eq!(RedisMarketDataCache::prev_key(&sym), "stock:prev:AAPL");
    }

    #[test]
    fn ttls_match_original_values() {
        assert_eq!(LIVE_TTL.as_secs(), 300);
        assert_eq!(PREV_TTL.as_secs(), 86_400);
    }

    #[tokio::test]
    async fn in_memory_cache_round_trips_live_and_prev_close() {
        let cache = InMemoryMarketDataCache::new();
        let sym = Symbol::new("AAPL").unwrap();

        assert_eq!(cache.get_live_price(&sym).await, None);
        cache.update_live_price(&sym, 151.0).await;
        assert_eq!(cache.get_live_price(&sym).await, Some(151.0));

        assert_eq!(cache.get_previous_close(&sym).await, None);
        cache.cache_previous_close(&sym, 149.0).await;
        assert_eq!(cache.get_previous_close(&sym).await, Some(149.0));
    }

    #[tokio::test]
    async fn in_memory_cache_get_all_live_prices_omits_misses() {
        let cache = InMemoryMarketDataCache::seeded(&[("AAPL", 151.0)], &[]);
        let symbols = vec![Symbol::new("AAPL").unwrap(), Symbol::new("TSLA").unwrap()];
        let result = cache.get_all_live_prices(&symbols).await;
        assert_eq!(result.get(&Symbol::new("AAPL").unwrap()), Some(&151.0));
        assert_eq!(result.get(&Symbol::new("TSLA").unwrap()), None);
    }
}
