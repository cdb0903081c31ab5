// =============================================================================
// SectorStrategyEvaluator — periodic relative-strength divergence check
// =============================================================================
//
// Each tick: for every active SectorStrategy, pull its sector's stock
// basket, resolve one (current, previous_close) pair per distinct symbol
// across all strategies (cache first, HTTP fallback paced 1.1s apart), then
// for each strategy with a complete basket compute the up/down trender
// majority and look for exactly one severe laggard diverging from it.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::{NewNotification, NotificationChannel, SectorStrategy, Symbol};
use crate::market_data_cache::MarketDataCache;
use crate::repository::{NotificationRepository, SectorRepository, SectorStrategyRepository};
use crate::upstream::UpstreamClient;

const FALLBACK_SPACING: Duration = Duration::from_millis(1100);

/// A single basket member's move, computed from (current, previous_close).
#[derive(Debug, Clone)]
struct BasketMove {
    symbol: Symbol,
    stock_name: Option<String>,
    change_pct: f64,
    price: f64,
}

pub struct SectorStrategyEvaluator {
    strategies: Arc<dyn SectorStrategyRepository>,
    sectors: Arc<dyn SectorRepository>,
    notifications: Arc<dyn NotificationRepository>,
    cache: Arc<dyn MarketDataCache>,
    upstream: Arc<UpstreamClient>,
}

impl SectorStrategyEvaluator {
    pub fn new(
        strategies: Arc<dyn SectorStrategyRepository>,
        sectors: Arc<dyn SectorRepository>,
        notifications: Arc<dyn NotificationRepository>,
        cache: Arc<dyn MarketDataCache>,
        upstream: Arc<UpstreamClient>,
    ) -> Self {
        Self {
            strategies,
            sectors,
            notifications,
            cache,
            upstream,
        }
    }

    async fn resolve_quotes(&self, symbols: &[Symbol]) -> HashMap<Symbol, (f64, Option<f64>)> {
        let live = self.cache.get_all_live_prices(symbols).await;
        let mut quotes = HashMap::new();

        for symbol in symbols {
            let cached_current = live.get(symbol).copied();
            let cached_prev = self.cache.get_previous_close(symbol).await;

            match (cached_current, cached_prev) {
                (Some(current), Some(prev)) => {
                    quotes.insert(symbol.clone(), (current, Some(prev)));
                }
                _ => {
                    match self.upstream.get_quote(symbol.as_str()).await {
                        Ok(Some(quote)) => {
                            quotes.insert(symbol.clone(), (quote.c, Some(quote.pc).filter(|pc| *pc > 0.0)));
                        }
                        Ok(None) => {}
                        Err(e) => warn!(symbol = %symbol, error = %e, "sector strategy evaluator: quote fallback failed"),
                    }
                    tokio::time::sleep(FALLBACK_SPACING).await;
                }
            }
        }
        quotes
    }

    /// Run one evaluation pass over every active sector strategy. Returns
    /// the number of divergence notifications triggered.
    pub async fn tick(&self) -> usize {
        let active = match self.strategies.find_active().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "sector strategy evaluator: failed to load active strategies");
                return 0;
            }
        };
        if active.is_empty() {
            return 0;
        }

        let mut baskets = Vec::new();
        let mut all_symbols = HashSet::new();
        for strategy in &active {
            let stocks = match self.sectors.stocks_for_sector(strategy.sector_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(sector_id = strategy.sector_id, error = %e, "sector strategy evaluator: failed to load sector stocks");
                    continue;
                }
            };
            for s in &stocks {
                all_symbols.insert(s.symbol.clone());
            }
            baskets.push((strategy.clone(), stocks));
        }
        if all_symbols.is_empty() {
            return 0;
        }

        let symbols: Vec<Symbol> = all_symbols.into_iter().collect();
        let quotes = self.resolve_quotes(&symbols).await;

        let mut triggered_count = 0;
        let now = Utc::now();

        for (strategy, stocks) in &baskets {
            let total_stocks = stocks.len();
            if total_stocks < 2 {
                continue;
            }

            let mut basket_moves = Vec::with_capacity(total_stocks);
            for stock in stocks {
                if let Some((current, Some(prev))) = quotes.get(&stock.symbol) {
                    let change_pct = ((current - prev) / prev) * 100.0;
                    basket_moves.push(BasketMove {
                        symbol: stock.symbol.clone(),
                        stock_name: stock.stock_name.clone(),
                        change_pct,
                        price: *current,
                    });
                }
            }

            if basket_moves.len() != total_stocks {
                continue;
            }

            if let Some(divergence) = find_divergence(strategy, &basket_moves) {
                if let Err(e) = self.trigger_divergence(strategy, &divergence, now).await {
                    error!(strategy_id = strategy.id, error = %e, "sector strategy evaluator: failed to trigger divergence");
                    continue;
                }
                triggered_count += 1;
            }
        }

        info!(triggered = triggered_count, strategies = active.len(), "sector strategy evaluator: tick complete");
        triggered_count
    }

    async fn trigger_divergence(
        &self,
        strategy: &SectorStrategy,
        divergence: &Divergence,
        triggered_at: chrono::DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.strategies.mark_triggered(strategy.id, triggered_at).await?;

        let trend = if divergence.sector_trending_up { "UP" } else { "DOWN" };
        let title = format!("{} is diverging from the sector", divergence.laggard.symbol);
        let message = format!(
            "Sector is trending {trend}. {} is lagging heavily at {:.2}%.",
            divergence.laggard.symbol, divergence.laggard.change_pct
        );

        self.notifications
            .insert(NewNotification {
                user_id: strategy.user_id,
                alert_id: None,
                channel: NotificationChannel::InApp,
                title,
                message,
                symbol: Some(divergence.laggard.symbol.clone()),
                trigger_price: Some(divergence.laggard.price),
                alert_kind_snapshot: Some("sector_divergence".to_string()),
                threshold_value: Some(divergence.laggard.change_pct),
                is_read: false,
                email_sent_at: None,
            })
            .await?;

        info!(
            strategy_id = strategy.id,
            symbol = %divergence.laggard.symbol,
            change_pct = divergence.laggard.change_pct,
            "sector divergence triggered"
        );
        Ok(())
    }
}

struct Divergence {
    laggard: BasketMove,
    sector_trending_up: bool,
}

/// Find the basket's divergence laggard, if any: the sector must be
/// trending in one direction by `percent_majority`, and exactly one stock
/// must be moving the opposite way past `laggard_threshold`.
fn find_divergence(strategy: &SectorStrategy, basket: &[BasketMove]) -> Option<Divergence> {
    let total = basket.len() as f64;

    let up_trenders = basket.iter().filter(|m| m.change_pct >= strategy.trend_threshold).count();
    let up_percent = (up_trenders as f64 / total) * 100.0;

    let down_trenders = basket.iter().filter(|m| m.change_pct <= -strategy.trend_threshold).count();
    let down_percent = (down_trenders as f64 / total) * 100.0;

    if up_percent >= strategy.percent_majority {
        let laggards: Vec<&BasketMove> = basket
            .iter()
            .filter(|m| m.change_pct <= strategy.laggard_threshold)
            .collect();
        if laggards.len() == 1 {
            return Some(Divergence {
                laggard: laggards[0].clone(),
                sector_trending_up: true,
            });
        }
    } else if down_percent >= strategy.percent_majority {
        let divergence_positive = strategy.laggard_threshold.abs();
        let laggards: Vec<&BasketMove> = basket
            .iter()
            .filter(|m| m.change_pct >= divergence_positive)
            .collect();
        if laggards.len() == 1 {
            return Some(Divergence {
                laggard: laggards[0].clone(),
                sector_trending_up: false,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> SectorStrategy {
        SectorStrategy {
            id: 1,
            user_id: 1,
            sector_id: 1,
            is_active: true,
            percent_majority: 70.0,
            trend_threshold: 1.5,
            laggard_threshold: -1.0,
            last_triggered_at: None,
        }
    }

    fn mv(symbol: &str, change_pct: f64) -> BasketMove {
        BasketMove {
            symbol: Symbol::new(symbol).unwrap(),
            stock_name: None,
            change_pct,
            price: 100.0,
        }
    }

    #[test]
    fn detects_upward_divergence_with_single_laggard() {
        let strat = strategy();
        let basket = vec![mv("A", 2.0), mv("B", 2.5), mv("C", 3.0), mv("D", -1.5)];
        let result = find_divergence(&strat, &basket).expect("should detect divergence");
        assert_eq!(result.laggard.symbol.as_str(), "D");
        assert!(result.sector_trending_up);
    }

    #[test]
    fn detects_downward_divergence_with_single_laggard() {
        let strat = strategy();
        let basket = vec![mv("A", -2.0), mv("B", -2.5), mv("C", -3.0), mv("D", 1.5)];
        let result = find_divergence(&strat, &basket).expect("should detect divergence");
        assert_eq!(result.laggard.symbol.as_str(), "D");
        assert!(!result.sector_trending_up);
    }

    #[test]
    fn no_divergence_when_majority_threshold_unmet() {
        let strat = strategy();
        let basket = vec![mv("A", 2.0), mv("B", -1.5), mv("C", 0.0), mv("D", -1.5)];
        assert!(find_divergence(&strat, &basket).is_none());
    }

    #[test]
    fn no_divergence_when_multiple_laggards() {
        let strat = strategy();
        let basket = vec![mv("A", 2.0), mv("B", 2.5), mv("C", -1.5), mv("D", -1.5)];
        assert!(find_divergence(&strat, &basket).is_none());
    }

    #[test]
    fn no_divergence_when_zero_laggards() {
        let strat = strategy();
        let basket = vec![mv("A", 2.0), mv("B", 2.5), mv("C", 3.0), mv("D", 0.0)];
        assert!(find_divergence(&strat, &basket).is_none());
    }

    // S4 — a full tick against a basket with one severe laggard emits exactly
    // one divergence notification for that stock.
    #[tokio::test]
    async fn tick_emits_divergence_notification_for_single_laggard() {
        use crate::domain::Sector;
        use crate::market_data_cache::InMemoryMarketDataCache;
        use crate::repository::memory::{
            InMemoryNotificationRepository, InMemorySectorRepository, InMemorySectorStrategyRepository,
        };
        use crate::upstream::UpstreamClient;

        let sector = Sector {
            id: 1,
            user_id: 7,
            name: "Megacaps".to_string(),
            color: Sector::default_color(),
            icon: Sector::default_icon(),
        };
        let stocks = vec![
            crate::domain::SectorStock {
                id: 1,
                sector_id: 1,
                symbol: Symbol::new("AAPL").unwrap(),
                stock_name: None,
            },
            crate::domain::SectorStock {
                id: 2,
                sector_id: 1,
                symbol: Symbol::new("MSFT").unwrap(),
                stock_name: None,
            },
            crate::domain::SectorStock {
                id: 3,
                sector_id: 1,
                symbol: Symbol::new("GOOGL").unwrap(),
                stock_name: None,
            },
            crate::domain::SectorStock {
                id: 4,
                sector_id: 1,
                symbol: Symbol::new("NVDA").unwrap(),
                stock_name: None,
            },
        ];

        let sectors = Arc::new(InMemorySectorRepository::new(vec![sector], stocks));
        let strategies = Arc::new(InMemorySectorStrategyRepository::new(vec![strategy()]));
        let notifications = Arc::new(InMemoryNotificationRepository::new());

        // AAPL/MSFT/GOOGL all up well past trend_threshold=1.5 (75% majority,
        // over percent_majority=70); NVDA is the lone laggard past -1.0.
        let cache = Arc::new(InMemoryMarketDataCache::seeded(
            &[
                ("AAPL", 102.0),
                ("MSFT", 102.5),
                ("GOOGL", 103.0),
                ("NVDA", 98.5),
            ],
            &[
                ("AAPL", 100.0),
                ("MSFT", 100.0),
                ("GOOGL", 100.0),
                ("NVDA", 100.0),
            ],
        ));

        let evaluator = SectorStrategyEvaluator::new(
            strategies,
            sectors,
            notifications.clone(),
            cache,
            Arc::new(UpstreamClient::new("test-key")),
        );

        let triggered = evaluator.tick().await;
        assert_eq!(triggered, 1);

        let recorded = notifications.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].title, "NVDA is diverging from the sector");
        assert_eq!(recorded[0].symbol, Some(Symbol::new("NVDA").unwrap()));
    }
}
