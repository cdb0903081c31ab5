// =============================================================================
// Notification — an in-app or email record of a fired alert or divergence
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Email,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub alert_id: Option<i64>,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub symbol: Option<Symbol>,
    pub trigger_price: Option<f64>,
    /// Snapshot of the alert kind's string form at the time this notification
    /// was built, so a later rename or deletion of the alert doesn't change
    /// the historical record.
    pub alert_kind_snapshot: Option<String>,
    pub threshold_value: Option<f64>,
    pub is_read: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub alert_id: Option<i64>,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub symbol: Option<Symbol>,
    pub trigger_price: Option<f64>,
    pub alert_kind_snapshot: Option<String>,
    pub threshold_value: Option<f64>,
    pub is_read: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
}
