// =============================================================================
// In-memory repository implementations, backing the evaluators' own tests
// =============================================================================
//
// Each evaluator (`AlertEvaluator`, `SectorStrategyEvaluator`, `Streamer`)
// is driven against these plus `InMemoryMarketDataCache` in its own
// `#[cfg(test)]` module rather than a live Postgres/Redis pair.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{Alert, AlertStatus, NewNotification, Notification, Sector, SectorStock, SectorStrategy};

use super::{AlertRepository, NotificationRepository, RepoResult, SectorRepository, SectorStrategyRepository};

#[derive(Default)]
pub struct InMemoryAlertRepository {
    alerts: Mutex<Vec<Alert>>,
}

impl InMemoryAlertRepository {
    pub fn new(alerts: Vec<Alert>) -> Self {
        Self {
            alerts: Mutex::new(alerts),
        }
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn find_active(&self) -> RepoResult<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .iter()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Alert>> {
        Ok(self.alerts.lock().iter().find(|a| a.id == id).cloned())
    }

    async fn mark_checked(&self, id: i64, checked_at: DateTime<Utc>) -> RepoResult<()> {
        if let Some(a) = self.alerts.lock().iter_mut().find(|a| a.id == id) {
            a.last_checked_at = Some(checked_at);
        }
        Ok(())
    }

    async fn mark_triggered(
        &self,
        id: i64,
        triggered_at: DateTime<Utc>,
        trigger_price: f64,
        new_status: AlertStatus,
    ) -> RepoResult<()> {
        if let Some(a) = self.alerts.lock().iter_mut().find(|a| a.id == id) {
            a.triggered_at = Some(triggered_at);
            a.trigger_price = Some(trigger_price);
            a.status = new_status;
            a.last_checked_at = Some(triggered_at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySectorRepository {
    sectors: Vec<Sector>,
    stocks: Vec<SectorStock>,
}

impl InMemorySectorRepository {
    pub fn new(sectors: Vec<Sector>, stocks: Vec<SectorStock>) -> Self {
        Self { sectors, stocks }
    }
}

#[async_trait]
impl SectorRepository for InMemorySectorRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Sector>> {
        Ok(self.sectors.iter().find(|s| s.id == id).cloned())
    }

    async fn stocks_for_sector(&self, sector_id: i64) -> RepoResult<Vec<SectorStock>> {
        Ok(self
            .stocks
            .iter()
            .filter(|s| s.sector_id == sector_id)
            .cloned()
            .collect())
    }

    async fn all_stocks(&self) -> RepoResult<Vec<SectorStock>> {
        Ok(self.stocks.clone())
    }
}

#[derive(Default)]
pub struct InMemorySectorStrategyRepository {
    strategies: Mutex<Vec<SectorStrategy>>,
}

impl InMemorySectorStrategyRepository {
    pub fn new(strategies: Vec<SectorStrategy>) -> Self {
        Self {
            strategies: Mutex::new(strategies),
        }
    }

    pub fn snapshot(&self) -> Vec<SectorStrategy> {
        self.strategies.lock().clone()
    }
}

#[async_trait]
impl SectorStrategyRepository for InMemorySectorStrategyRepository {
    async fn find_active(&self) -> RepoResult<Vec<SectorStrategy>> {
        Ok(self
            .strategies
            .lock()
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn mark_triggered(&self, id: i64, triggered_at: DateTime<Utc>) -> RepoResult<()> {
        if let Some(s) = self.strategies.lock().iter_mut().find(|s| s.id == id) {
            s.last_triggered_at = Some(triggered_at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: Mutex<Vec<Notification>>,
    next_id: Mutex<i64>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, n: NewNotification) -> RepoResult<Notification> {
        let mut next_id = self.next_id.lock();
        let id = *next_id;
        *next_id += 1;

        let notification = Notification {
            id,
            user_id: n.user_id,
            alert_id: n.alert_id,
            channel: n.channel,
            title: n.title,
            message: n.message,
            symbol: n.symbol,
            trigger_price: n.trigger_price,
            alert_kind_snapshot: n.alert_kind_snapshot,
            threshold_value: n.threshold_value,
            is_read: n.is_read,
            email_sent_at: n.email_sent_at,
            created_at: Utc::now(),
        };
        self.notifications.lock().push(notification.clone());
        Ok(notification)
    }
}
