// =============================================================================
// Postgres-backed repository implementations
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::{
    Alert, AlertKind, AlertStatus, ChannelFlags, NewNotification, Notification,
    NotificationChannel, Sector, SectorStock, SectorStrategy, Symbol,
};
use crate::error::RepositoryError;

use super::{AlertRepository, NotificationRepository, RepoResult, SectorRepository, SectorStrategyRepository};

pub struct PostgresAlertRepository {
    pool: PgPool,
}

impl PostgresAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_alert_kind(raw: &str) -> Result<AlertKind, RepositoryError> {
    match raw {
        "price_above" => Ok(AlertKind::PriceAbove),
        "price_below" => Ok(AlertKind::PriceBelow),
        "percent_change" => Ok(AlertKind::PercentChange),
        "volume_spike" => Ok(AlertKind::VolumeSpike),
        other => Err(RepositoryError::InvariantViolation {
            reason: format!("unknown alert kind '{other}'"),
        }),
    }
}

fn parse_alert_status(raw: &str) -> Result<AlertStatus, RepositoryError> {
    match raw {
        "active" => Ok(AlertStatus::Active),
        "triggered" => Ok(AlertStatus::Triggered),
        "disabled" => Ok(AlertStatus::Disabled),
        other => Err(RepositoryError::InvariantViolation {
            reason: format!("unknown alert status '{other}'"),
        }),
    }
}

fn row_to_alert(row: &sqlx::postgres::PgRow) -> Result<Alert, RepositoryError> {
    let symbol_raw: String = row.try_get("symbol")?;
    let symbol = Symbol::new(&symbol_raw).map_err(|e| RepositoryError::InvariantViolation {
        reason: format!("stored symbol '{symbol_raw}' is invalid: {e}"),
    })?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;

    Ok(Alert {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        symbol,
        stock_name: row.try_get("stock_name")?,
        kind: parse_alert_kind(&kind)?,
        threshold: row.try_get("threshold_value")?,
        status: parse_alert_status(&status)?,
        repeating: row.try_get("is_repeating")?,
        channels: ChannelFlags {
            email: row.try_get("notify_email")?,
            sms: row.try_get("notify_sms")?,
            push: row.try_get("notify_push")?,
        },
        message: row.try_get("message")?,
        last_checked_at: row.try_get("last_checked_at")?,
        triggered_at: row.try_get("triggered_at")?,
        trigger_price: row.try_get("trigger_price")?,
    })
}

#[async_trait]
impl AlertRepository for PostgresAlertRepository {
    async fn find_active(&self) -> RepoResult<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, symbol, stock_name, kind, threshold_value, status,
                   is_repeating, notify_email, notify_sms, notify_push, message,
                   last_checked_at, triggered_at, trigger_price
            FROM alerts
            WHERE status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_alert).collect()
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Alert>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, symbol, stock_name, kind, threshold_value, status,
                   is_repeating, notify_email, notify_sms, notify_push, message,
                   last_checked_at, triggered_at, trigger_price
            FROM alerts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_alert).transpose()
    }

    async fn mark_checked(&self, id: i64, checked_at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE alerts SET last_checked_at = $1 WHERE id = $2")
            .bind(checked_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_triggered(
        &self,
        id: i64,
        triggered_at: DateTime<Utc>,
        trigger_price: f64,
        new_status: AlertStatus,
    ) -> RepoResult<()> {
        let status = match new_status {
            AlertStatus::Active => "active",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Disabled => "disabled",
        };
        sqlx::query(
            r#"
            UPDATE alerts
            SET triggered_at = $1, trigger_price = $2, status = $3, last_checked_at = $1
            WHERE id = $4
            "#,
        )
        .bind(triggered_at)
        .bind(trigger_price)
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresSectorRepository {
    pool: PgPool,
}

impl PostgresSectorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SectorRepository for PostgresSectorRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Sector>> {
        let row = sqlx::query("SELECT id, user_id, name, color, icon FROM sectors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(Sector {
                id: r.try_get("id")?,
                user_id: r.try_get("user_id")?,
                name: r.try_get("name")?,
                color: r.try_get("color")?,
                icon: r.try_get("icon")?,
            })
        })
        .transpose()
    }

    async fn stocks_for_sector(&self, sector_id: i64) -> RepoResult<Vec<SectorStock>> {
        let rows = sqlx::query(
            "SELECT id, sector_id, symbol, stock_name FROM sector_stocks WHERE sector_id = $1",
        )
        .bind(sector_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_sector_stock).collect()
    }

    async fn all_stocks(&self) -> RepoResult<Vec<SectorStock>> {
        let rows = sqlx::query("SELECT id, sector_id, symbol, stock_name FROM sector_stocks")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_sector_stock).collect()
    }
}

fn row_to_sector_stock(row: &sqlx::postgres::PgRow) -> Result<SectorStock, RepositoryError> {
    let symbol_raw: String = row.try_get("symbol")?;
    let symbol = Symbol::new(&symbol_raw).map_err(|e| RepositoryError::InvariantViolation {
        reason: format!("stored symbol '{symbol_raw}' is invalid: {e}"),
    })?;
    Ok(SectorStock {
        id: row.try_get("id")?,
        sector_id: row.try_get("sector_id")?,
        symbol,
        stock_name: row.try_get("stock_name")?,
    })
}

pub struct PostgresSectorStrategyRepository {
    pool: PgPool,
}

impl PostgresSectorStrategyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SectorStrategyRepository for PostgresSectorStrategyRepository {
    async fn find_active(&self) -> RepoResult<Vec<SectorStrategy>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, sector_id, is_active, percent_majority,
                   trend_threshold, laggard_threshold, last_triggered_at
            FROM sector_strategies
            WHERE is_active = true
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SectorStrategy {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    sector_id: row.try_get("sector_id")?,
                    is_active: row.try_get("is_active")?,
                    percent_majority: row.try_get("percent_majority")?,
                    trend_threshold: row.try_get("trend_threshold")?,
                    laggard_threshold: row.try_get("laggard_threshold")?,
                    last_triggered_at: row.try_get("last_triggered_at")?,
                })
            })
            .collect()
    }

    async fn mark_triggered(&self, id: i64, triggered_at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE sector_strategies SET last_triggered_at = $1 WHERE id = $2")
            .bind(triggered_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn insert(&self, n: NewNotification) -> RepoResult<Notification> {
        let channel = match n.channel {
            NotificationChannel::InApp => "in_app",
            NotificationChannel::Email => "email",
        };
        let symbol_raw = n.symbol.as_ref().map(|s| s.to_string());

        let row = sqlx::query(
            r#"
            INSERT INTO notifications
                (user_id, alert_id, channel, title, message, symbol, trigger_price,
                 alert_type, threshold_value, is_read, email_sent_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
            RETURNING id, user_id, alert_id, channel, title, message, symbol,
                      trigger_price, alert_type, threshold_value, is_read,
                      email_sent_at, created_at
            "#,
        )
        .bind(n.user_id)
        .bind(n.alert_id)
        .bind(channel)
        .bind(&n.title)
        .bind(&n.message)
        .bind(&symbol_raw)
        .bind(n.trigger_price)
        .bind(&n.alert_kind_snapshot)
        .bind(n.threshold_value)
        .bind(n.is_read)
        .bind(n.email_sent_at)
        .fetch_one(&self.pool)
        .await?;

        let symbol = match row.try_get::<Option<String>, _>("symbol")? {
            Some(raw) => Some(Symbol::new(&raw).map_err(|e| RepositoryError::InvariantViolation {
                reason: format!("stored symbol '{raw}' is invalid: {e}"),
            })?),
            None => None,
        };
        let channel_raw: String = row.try_get("channel")?;
        let channel = match channel_raw.as_str() {
            "in_app" => NotificationChannel::InApp,
            "email" => NotificationChannel::Email,
            other => {
                return Err(RepositoryError::InvariantViolation {
                    reason: format!("unknown notification channel '{other}'"),
                })
            }
        };

        Ok(Notification {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            alert_id: row.try_get("alert_id")?,
            channel,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            symbol,
            trigger_price: row.try_get("trigger_price")?,
            alert_kind_snapshot: row.try_get("alert_type")?,
            threshold_value: row.try_get("threshold_value")?,
            is_read: row.try_get("is_read")?,
            email_sent_at: row.try_get("email_sent_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
