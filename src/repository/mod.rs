pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{Alert, NewNotification, Notification, Sector, SectorStock, SectorStrategy};
use crate::error::RepositoryError;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Persistence seam for [`Alert`] rows.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn find_active(&self) -> RepoResult<Vec<Alert>>;
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Alert>>;
    async fn mark_checked(&self, id: i64, checked_at: chrono::DateTime<chrono::Utc>) -> RepoResult<()>;
    async fn mark_triggered(
        &self,
        id: i64,
        triggered_at: chrono::DateTime<chrono::Utc>,
        trigger_price: f64,
        new_status: crate::domain::AlertStatus,
    ) -> RepoResult<()>;
}

/// Persistence seam for [`Sector`] / [`SectorStock`] rows.
#[async_trait]
pub trait SectorRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Sector>>;
    async fn stocks_for_sector(&self, sector_id: i64) -> RepoResult<Vec<SectorStock>>;
    /// Every stock across every sector, regardless of owner. Used by the
    /// streamer to build its subscribe set.
    async fn all_stocks(&self) -> RepoResult<Vec<SectorStock>>;
}

/// Persistence seam for [`SectorStrategy`] rows.
#[async_trait]
pub trait SectorStrategyRepository: Send + Sync {
    async fn find_active(&self) -> RepoResult<Vec<SectorStrategy>>;
    async fn mark_triggered(
        &self,
        id: i64,
        triggered_at: chrono::DateTime<chrono::Utc>,
    ) -> RepoResult<()>;
}

/// Persistence seam for [`Notification`] rows.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: NewNotification) -> RepoResult<Notification>;
}
