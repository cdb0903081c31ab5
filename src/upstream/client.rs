// =============================================================================
// UpstreamClient — rate-limited HTTP client for the quote/profile provider
// =============================================================================
//
// Every call passes through the shared sliding-window RateLimiter before
// hitting the wire. `quote` is never cached (callers want fresh data);
// `company_profile` and `basic_financials` are memoized in-process for
// CACHE_TTL since they change rarely and the free tier's 60/min budget is
// tight.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::rate_limiter::RateLimiter;
use crate::error::UpstreamError;

const BASE_URL: &str = "https://finnhub.io/api/v1";

/// Free-tier budget: 60 calls/min, held slightly under at 58 for headroom.
const RATE_LIMIT_CALLS: usize = 58;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// In-process memoization TTL for profile/financials lookups.
const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    pub c: f64,
    pub h: f64,
    pub l: f64,
    pub o: f64,
    pub pc: f64,
    pub t: i64,
}

type MemoCache = RwLock<HashMap<String, (Instant, Value)>>;

pub struct UpstreamClient {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
    profile_cache: MemoCache,
    financials_cache: MemoCache,
}

impl UpstreamClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key: api_key.into(),
            client,
            rate_limiter: RateLimiter::new(RATE_LIMIT_CALLS, RATE_LIMIT_WINDOW),
            profile_cache: RwLock::new(HashMap::new()),
            financials_cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_cached(cache: &MemoCache, key: &str) -> Option<Value> {
        let guard = cache.read();
        let (fetched_at, value) = guard.get(key)?;
        if fetched_at.elapsed() < CACHE_TTL {
            Some(value.clone())
        } else {
            None
        }
    }

    fn put_cached(cache: &MemoCache, key: String, value: Value) {
        cache.write().insert(key, (Instant::now(), value));
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, UpstreamError> {
        self.rate_limiter.acquire().await;

        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("token", &self.api_key));

        let url = format!("{BASE_URL}{path}");
        let resp = self.client.get(&url).query(&query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| UpstreamError::BadResponse {
                reason: e.to_string(),
            })
    }

    /// `GET /quote` — real-time quote. Never cached. Returns `None` when the
    /// upstream reports `c == 0` (its convention for "no data for symbol").
    #[instrument(skip(self), name = "upstream::get_quote")]
    pub async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>, UpstreamError> {
        let symbol = symbol.to_uppercase();
        let data = self.get("/quote", &[("symbol", &symbol)]).await?;

        let quote: Quote = serde_json::from_value(data).map_err(|e| UpstreamError::BadResponse {
            reason: e.to_string(),
        })?;

        if quote.c == 0.0 {
            debug!(symbol, "quote has zero current price, treating as no data");
            return Ok(None);
        }
        Ok(Some(quote))
    }

    /// `GET /stock/profile2` — company profile, memoized for 5 minutes.
    #[instrument(skip(self), name = "upstream::get_company_profile")]
    pub async fn get_company_profile(&self, symbol: &str) -> Result<Option<Value>, UpstreamError> {
        let key = symbol.to_uppercase();
        if let Some(cached) = Self::get_cached(&self.profile_cache, &key) {
            return Ok(Some(cached));
        }

        let data = self.get("/stock/profile2", &[("symbol", &key)]).await?;
        if data.is_null() || data.as_object().map(|o| o.is_empty()).unwrap_or(false) {
            return Ok(None);
        }

        Self::put_cached(&self.profile_cache, key, data.clone());
        Ok(Some(data))
    }

    /// `GET /stock/metric?metric=all` — basic financials, memoized for 5
    /// minutes, keyed on the inner `metric` object rather than the envelope.
    #[instrument(skip(self), name = "upstream::get_basic_financials")]
    pub async fn get_basic_financials(&self, symbol: &str) -> Result<Option<Value>, UpstreamError> {
        let key = symbol.to_uppercase();
        if let Some(cached) = Self::get_cached(&self.financials_cache, &key) {
            return Ok(Some(cached));
        }

        let data = self
            .get("/stock/metric", &[("symbol", &key), ("metric", "all")])
            .await?;
        let metrics = data.get("metric").cloned();

        if let Some(m) = &metrics {
            if !m.is_null() {
                Self::put_cached(&self.financials_cache, key, m.clone());
            }
        }
        Ok(metrics.filter(|m| !m.is_null()))
    }

    /// `GET /stock/recommendation` — analyst recommendation trend entries.
    #[instrument(skip(self), name = "upstream::get_recommendation_trends")]
    pub async fn get_recommendation_trends(&self, symbol: &str) -> Result<Option<Vec<Value>>, UpstreamError> {
        let data = self
            .get("/stock/recommendation", &[("symbol", &symbol.to_uppercase())])
            .await?;
        match data.as_array() {
            Some(arr) if !arr.is_empty() => Ok(Some(arr.clone())),
            _ => Ok(None),
        }
    }

    /// `GET /search` — symbol search.
    #[instrument(skip(self), name = "upstream::search_symbols")]
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<Value>, UpstreamError> {
        let data = self.get("/search", &[("q", query)]).await?;
        Ok(data
            .get("result")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// `GET /stock/candle` — daily historical candles over the trailing
    /// `days` days. Returns `None` when upstream reports `s == "no_data"`.
    #[instrument(skip(self), name = "upstream::get_historical_data")]
    pub async fn get_historical_data(&self, symbol: &str, days: i64) -> Result<Option<Value>, UpstreamError> {
        let now = chrono::Utc::now();
        let from = now - chrono::Duration::days(days);

        let from_ts = from.timestamp().to_string();
        let to_ts = now.timestamp().to_string();

        let data = self
            .get(
                "/stock/candle",
                &[
                    ("symbol", &symbol.to_uppercase()),
                    ("resolution", "D"),
                    ("from", &from_ts),
                    ("to", &to_ts),
                ],
            )
            .await?;

        if data.get("s").and_then(|s| s.as_str()) == Some("no_data") {
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Fan out `get_quote` concurrently across `symbols`, dropping any that
    /// errored or returned no data.
    #[instrument(skip(self, symbols), name = "upstream::get_multiple_quotes")]
    pub async fn get_multiple_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        let futures = symbols.iter().map(|s| async move {
            let result = self.get_quote(s).await;
            (s.clone(), result)
        });
        let results = futures_util::future::join_all(futures).await;

        let mut out = HashMap::new();
        for (symbol, result) in results {
            match result {
                Ok(Some(quote)) => {
                    out.insert(symbol, quote);
                }
                Ok(None) => {}
                Err(e) => warn!(symbol, error = %e, "get_multiple_quotes: call failed"),
            }
        }
        out
    }

    /// Combined stock detail view: quote + profile + financials +
    /// recommendations, fetched concurrently. Returns `None` if the quote
    /// itself is unavailable — the other three are best-effort.
    #[instrument(skip(self), name = "upstream::get_stock_detail")]
    pub async fn get_stock_detail(&self, symbol: &str) -> anyhow::Result<Option<StockDetail>> {
        let (quote, profile, financials, recommendations) = tokio::join!(
            self.get_quote(symbol),
            self.get_company_profile(symbol),
            self.get_basic_financials(symbol),
            self.get_recommendation_trends(symbol),
        );

        let quote = match quote.context("fetching quote for stock detail")? {
            Some(q) => q,
            None => return Ok(None),
        };

        Ok(Some(StockDetail {
            quote,
            profile: profile.unwrap_or(None),
            financials: financials.unwrap_or(None),
            recommendations: recommendations.unwrap_or(None),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct StockDetail {
    pub quote: Quote,
    pub profile: Option<Value>,
    pub financials: Option<Value>,
    pub recommendations: Option<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_budget_matches_free_tier_headroom() {
        assert_eq!(RATE_LIMIT_CALLS, 58);
        assert_eq!(RATE_LIMIT_WINDOW, Duration::from_secs(60));
    }

    #[test]
    fn cache_ttl_matches_original_value() {
        assert_eq!(CACHE_TTL, Duration::from_secs(300));
    }

    #[test]
    fn memo_cache_round_trips_within_ttl() {
        let cache: MemoCache = RwLock::new(HashMap::new());
        UpstreamClient::put_cached(&cache, "AAPL".to_string(), serde_json::json!({"beta": 1.2}));
        let got = UpstreamClient::get_cached(&cache, "AAPL");
        assert_eq!(got, Some(serde_json::json!({"beta": 1.2})));
    }

    #[test]
    fn memo_cache_misses_unknown_key() {
        let cache: MemoCache = RwLock::new(HashMap::new());
        assert_eq!(UpstreamClient::get_cached(&cache, "MSFT"), None);
    }
}
