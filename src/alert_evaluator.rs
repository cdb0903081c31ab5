// =============================================================================
// AlertEvaluator — periodic tick evaluating every active Alert
// =============================================================================
//
// Each tick: load active alerts, resolve one (current, previous_close) pair
// per distinct symbol (cache first, HTTP fallback paced 1.1s apart),
// evaluate each alert's predicate, persist triggers, and send one batched
// email per user whose alerts requested it.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::{Alert, AlertStatus, NewNotification, NotificationChannel, Symbol};
use crate::market_data_cache::MarketDataCache;
use crate::notification_delivery::{format_money, send_batched_email, BatchedAlert, EmailSender, UserDirectory};
use crate::repository::{AlertRepository, NotificationRepository};
use crate::upstream::UpstreamClient;

/// Spacing between HTTP fallback calls, matching the upstream budget.
const FALLBACK_SPACING: Duration = Duration::from_millis(1100);

#[derive(Debug, Clone, Copy)]
struct PricePair {
    current: f64,
    previous_close: Option<f64>,
}

pub struct AlertEvaluator {
    alerts: Arc<dyn AlertRepository>,
    notifications: Arc<dyn NotificationRepository>,
    cache: Arc<dyn MarketDataCache>,
    upstream: Arc<UpstreamClient>,
    directory: Arc<dyn UserDirectory>,
    email_sender: Arc<dyn EmailSender>,
}

impl AlertEvaluator {
    pub fn new(
        alerts: Arc<dyn AlertRepository>,
        notifications: Arc<dyn NotificationRepository>,
        cache: Arc<dyn MarketDataCache>,
        upstream: Arc<UpstreamClient>,
        directory: Arc<dyn UserDirectory>,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            alerts,
            notifications,
            cache,
            upstream,
            directory,
            email_sender,
        }
    }

    /// Resolve one price pair per symbol: cache-first, HTTP fallback on any
    /// miss, paced so the fallback path never exceeds the upstream budget.
    async fn resolve_quotes(&self, symbols: &[Symbol]) -> HashMap<Symbol, PricePair> {
        let live = self.cache.get_all_live_prices(symbols).await;
        let mut quotes = HashMap::new();

        for symbol in symbols {
            let cached_current = live.get(symbol).copied();
            let cached_prev = self.cache.get_previous_close(symbol).await;

            match (cached_current, cached_prev) {
                (Some(current), Some(prev)) => {
                    quotes.insert(
                        symbol.clone(),
                        PricePair {
                            current,
                            previous_close: Some(prev),
                        },
                    );
                }
                _ => {
                    match self.upstream.get_quote(symbol.as_str()).await {
                        Ok(Some(quote)) => {
                            quotes.insert(
                                symbol.clone(),
                                PricePair {
                                    current: quote.c,
                                    previous_close: Some(quote.pc).filter(|pc| *pc > 0.0),
                                },
                            );
                        }
                        Ok(None) => {}
                        Err(e) => warn!(symbol = %symbol, error = %e, "alert evaluator: quote fallback failed"),
                    }
                    tokio::time::sleep(FALLBACK_SPACING).await;
                }
            }
        }

        quotes
    }

    /// Run one evaluation pass over every active alert. Returns the number
    /// of alerts triggered.
    pub async fn tick(&self) -> usize {
        let active = match self.alerts.find_active().await {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "alert evaluator: failed to load active alerts");
                return 0;
            }
        };
        if active.is_empty() {
            return 0;
        }

        let symbols: Vec<Symbol> = {
            let mut set = std::collections::HashSet::new();
            for a in &active {
                set.insert(a.symbol.clone());
            }
            set.into_iter().collect()
        };
        let quotes = self.resolve_quotes(&symbols).await;

        let mut triggered_count = 0;
        let mut triggered_by_user: HashMap<i64, Vec<BatchedAlert>> = HashMap::new();
        let now = Utc::now();

        for alert in &active {
            let Some(pair) = quotes.get(&alert.symbol) else {
                continue;
            };

            if alert.predicate_holds(pair.current, pair.previous_close) {
                if let Err(e) = self.trigger_alert(alert, pair.current, now).await {
                    error!(alert_id = alert.id, error = %e, "alert evaluator: failed to trigger alert");
                    continue;
                }
                triggered_count += 1;

                triggered_by_user
                    .entry(alert.user_id)
                    .or_default()
                    .push(BatchedAlert {
                        alert_id: alert.id,
                        symbol: alert.symbol.to_string(),
                        alert_kind: alert.kind.as_str().to_string(),
                        action_phrase: alert.kind.action_phrase().to_string(),
                        threshold_value: alert.threshold,
                        trigger_price: pair.current,
                        message: alert.message.clone(),
                        notify_email: alert.channels.email,
                    });
            }

            if let Err(e) = self.alerts.mark_checked(alert.id, now).await {
                warn!(alert_id = alert.id, error = %e, "alert evaluator: failed to mark checked");
            }
        }

        for (user_id, batch) in &triggered_by_user {
            let sent = send_batched_email(
                self.directory.as_ref(),
                self.email_sender.as_ref(),
                *user_id,
                batch,
            )
            .await;
            self.record_email_notifications(*user_id, batch, sent).await;
        }

        info!(triggered = triggered_count, checked = active.len(), "alert evaluator: tick complete");
        triggered_count
    }

    async fn trigger_alert(
        &self,
        alert: &Alert,
        current_price: f64,
        triggered_at: chrono::DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let new_status = if alert.repeating {
            alert.status
        } else {
            AlertStatus::Triggered
        };

        self.alerts
            .mark_triggered(alert.id, triggered_at, current_price, new_status)
            .await?;

        let title = format!(
            "{} {} ${}",
            alert.symbol,
            alert.kind.action_phrase(),
            format_money(alert.threshold)
        );

        self.notifications
            .insert(NewNotification {
                user_id: alert.user_id,
                alert_id: Some(alert.id),
                channel: NotificationChannel::InApp,
                title,
                message: alert.message.clone().unwrap_or_default(),
                symbol: Some(alert.symbol.clone()),
                trigger_price: Some(current_price),
                alert_kind_snapshot: Some(alert.kind.as_str().to_string()),
                threshold_value: Some(alert.threshold),
                is_read: false,
                email_sent_at: None,
            })
            .await?;

        info!(alert_id = alert.id, symbol = %alert.symbol, price = current_price, "alert triggered");
        Ok(())
    }

    async fn record_email_notifications(&self, user_id: i64, batch: &[BatchedAlert], sent: bool) {
        let email_sent_at = sent.then(Utc::now);
        for a in batch.iter().filter(|a| a.notify_email) {
            let title = format!("{} {} ${}", a.symbol, a.action_phrase, format_money(a.threshold_value));
            let result = self
                .notifications
                .insert(NewNotification {
                    user_id,
                    alert_id: Some(a.alert_id),
                    channel: NotificationChannel::Email,
                    title,
                    message: a.message.clone().unwrap_or_default(),
                    symbol: crate::domain::Symbol::new(&a.symbol).ok(),
                    trigger_price: Some(a.trigger_price),
                    alert_kind_snapshot: Some(a.alert_kind.clone()),
                    threshold_value: Some(a.threshold_value),
                    is_read: true,
                    email_sent_at,
                })
                .await;
            if let Err(e) = result {
                warn!(alert_id = a.alert_id, error = %e, "alert evaluator: failed to record email notification");
            }
        }
    }
}
