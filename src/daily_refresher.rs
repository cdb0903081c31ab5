// =============================================================================
// DailyRefresher — once-a-day previous-close cache warm-up
// =============================================================================
//
// Runs once immediately at startup so the cache is warm, then once a day at
// a configured wall-clock time (default 06:00). Walks every symbol
// referenced by an active alert or any sector's stock list and fetches its
// previous close, pacing calls 1.1s apart to stay under the upstream's
// 60-calls-per-minute budget even though the RateLimiter itself would also
// enforce that ceiling.
//
// Note: naively computing "tomorrow" by incrementing a date's day field is
// invalid past the 28th of any month. `next_fire_at` instead adds a full
// day as a duration and re-derives the next occurrence of the target
// hour:minute from the resulting date.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, TimeZone};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::Symbol;
use crate::market_data_cache::MarketDataCache;
use crate::repository::{AlertRepository, SectorRepository};
use crate::upstream::UpstreamClient;

/// Spacing between successive upstream calls during the refresh pass.
const CALL_SPACING: Duration = std::time::Duration::from_millis(1100);

pub struct DailyRefresher {
    upstream: Arc<UpstreamClient>,
    cache: Arc<dyn MarketDataCache>,
    alerts: Arc<dyn AlertRepository>,
    sectors: Arc<dyn SectorRepository>,
    target_time: NaiveTime,
}

impl DailyRefresher {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        cache: Arc<dyn MarketDataCache>,
        alerts: Arc<dyn AlertRepository>,
        sectors: Arc<dyn SectorRepository>,
        target_hour: u32,
        target_minute: u32,
    ) -> Self {
        let target_time = NaiveTime::from_hms_opt(target_hour, target_minute, 0)
            .expect("caller validates target_hour/target_minute are in-range");
        Self {
            upstream,
            cache,
            alerts,
            sectors,
            target_time,
        }
    }

    async fn all_active_symbols(&self) -> HashSet<Symbol> {
        let mut symbols = HashSet::new();

        match self.alerts.find_active().await {
            Ok(alerts) => symbols.extend(alerts.into_iter().map(|a| a.symbol)),
            Err(e) => warn!(error = %e, "daily refresher: failed to load active alerts"),
        }

        match self.sectors.all_stocks().await {
            Ok(stocks) => symbols.extend(stocks.into_iter().map(|s| s.symbol)),
            Err(e) => warn!(error = %e, "daily refresher: failed to load sector stocks"),
        }

        symbols
    }

    async fn fetch_and_cache_previous_close(&self) {
        let symbols = self.all_active_symbols().await;
        info!(count = symbols.len(), "daily refresher: starting pass");

        for symbol in &symbols {
            match self.upstream.get_quote(symbol.as_str()).await {
                Ok(Some(quote)) if quote.pc > 0.0 => {
                    self.cache.cache_previous_close(symbol, quote.pc).await;
                }
                Ok(_) => {}
                Err(e) => warn!(symbol = %symbol, error = %e, "daily refresher: quote fetch failed"),
            }
            tokio::time::sleep(CALL_SPACING).await;
        }

        info!("daily refresher: pass complete");
    }

    /// Run once immediately, then loop forever waking at `target_time` each
    /// day, until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.fetch_and_cache_previous_close().await;

        loop {
            let now = Local::now();
            let next = next_fire_at(self.target_time, now);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));

            info!(wait_secs = wait.as_secs(), "daily refresher: sleeping until next run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {
                    info!("daily refresher: shutdown requested");
                    return;
                }
            }

            if shutdown.is_cancelled() {
                return;
            }
            self.fetch_and_cache_previous_close().await;
        }
    }
}

/// The next wall-clock instant a refresher targeting `target_time` should
/// fire, computed from `now`. If `now` is already past today's target time,
/// rolls forward exactly one calendar day via duration addition (never
/// `day + 1`, which is invalid past the 28th of any month).
fn next_fire_at(target_time: NaiveTime, now: chrono::DateTime<Local>) -> chrono::DateTime<Local> {
    let today_target = now.date_naive().and_time(target_time);
    let today_target = Local.from_local_datetime(&today_target).single().unwrap_or(now);

    if now < today_target {
        today_target
    } else {
        let tomorrow = now + chrono::Duration::days(1);
        let tomorrow_target = tomorrow.date_naive().and_time(target_time);
        Local
            .from_local_datetime(&tomorrow_target)
            .single()
            .unwrap_or(tomorrow)
    }
}
