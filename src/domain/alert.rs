// =============================================================================
// Alert — user-defined price/volume condition on a single symbol
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

/// The kind of condition an alert watches for. The string spellings are
/// persisted verbatim in the `alerts.kind` column and in `Notification`
/// snapshots — do not rename the variants without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceAbove,
    PriceBelow,
    PercentChange,
    VolumeSpike,
}

impl AlertKind {
    /// The phrase used in a triggered notification's title, e.g.
    /// `"AAPL rose above $150.00"`.
    pub fn action_phrase(self) -> &'static str {
        match self {
            AlertKind::PriceAbove => "rose above",
            AlertKind::PriceBelow => "fell below",
            AlertKind::PercentChange => "changed by",
            AlertKind::VolumeSpike => "volume spiked",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::PriceAbove => "price_above",
            AlertKind::PriceBelow => "price_below",
            AlertKind::PercentChange => "percent_change",
            AlertKind::VolumeSpike => "volume_spike",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Triggered,
    Disabled,
}

/// Which channels the owning user wants notified when this alert fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChannelFlags {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub symbol: Symbol,
    pub stock_name: Option<String>,
    pub kind: AlertKind,
    pub threshold: f64,
    pub status: AlertStatus,
    pub repeating: bool,
    pub channels: ChannelFlags,
    pub message: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub trigger_price: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AlertInvariantError {
    #[error("alert threshold must be > 0, got {0}")]
    NonPositiveThreshold(f64),
}

impl Alert {
    /// Validate the invariant `threshold > 0`. Called before insertion; the
    /// evaluator also treats an alert that somehow violates this (legacy
    /// row, manual DB edit) as non-evaluable rather than panicking.
    pub fn validate(&self) -> Result<(), AlertInvariantError> {
        if self.threshold <= 0.0 {
            return Err(AlertInvariantError::NonPositiveThreshold(self.threshold));
        }
        Ok(())
    }

    /// Evaluate this alert's predicate against a `(current, previous_close)`
    /// pair. Returns `false` for `VolumeSpike` (no volume source is wired
    /// up) and for `PercentChange` when `prev_close <= 0`.
    pub fn predicate_holds(&self, current: f64, prev_close: Option<f64>) -> bool {
        match self.kind {
            AlertKind::PriceAbove => current >= self.threshold,
            AlertKind::PriceBelow => current <= self.threshold,
            AlertKind::PercentChange => match prev_close {
                Some(pc) if pc > 0.0 => {
                    let pct = 100.0 * (current - pc) / pc;
                    pct.abs() >= self.threshold
                }
                _ => false,
            },
            AlertKind::VolumeSpike => false,
        }
    }

    /// Whether this alert may still retrigger. A non-repeating alert that
    /// has already triggered is permanently excluded.
    pub fn can_retrigger(&self) -> bool {
        self.repeating || self.status != AlertStatus::Triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_alert(kind: AlertKind, threshold: f64) -> Alert {
        Alert {
            id: 1,
            user_id: 1,
            symbol: Symbol::new("AAPL").unwrap(),
            stock_name: None,
            kind,
            threshold,
            status: AlertStatus::Active,
            repeating: false,
            channels: ChannelFlags::default(),
            message: None,
            last_checked_at: None,
            triggered_at: None,
            trigger_price: None,
        }
    }

    #[test]
    fn validate_rejects_non_positive_threshold() {
        let alert = base_alert(AlertKind::PriceAbove, 0.0);
        assert!(alert.validate().is_err());
        let alert = base_alert(AlertKind::PriceAbove, -5.0);
        assert!(alert.validate().is_err());
    }

    #[test]
    fn validate_accepts_positive_threshold() {
        assert!(base_alert(AlertKind::PriceAbove, 150.0).validate().is_ok());
    }

    // S1 — price_above trigger
    #[test]
    fn price_above_triggers_at_or_over_threshold() {
        let alert = base_alert(AlertKind::PriceAbove, 150.0);
        assert!(alert.predicate_holds(151.0, Some(149.0)));
        assert!(alert.predicate_holds(150.0, None));
        assert!(!alert.predicate_holds(149.99, None));
    }

    #[test]
    fn price_below_triggers_at_or_under_threshold() {
        let alert = base_alert(AlertKind::PriceBelow, 100.0);
        assert!(alert.predicate_holds(99.0, None));
        assert!(alert.predicate_holds(100.0, None));
        assert!(!alert.predicate_holds(100.01, None));
    }

    // S2 — percent_change boundary
    #[test]
    fn percent_change_boundary() {
        let alert = base_alert(AlertKind::PercentChange, 2.0);
        assert!(alert.predicate_holds(98.0, Some(100.0)));
        assert!(!alert.predicate_holds(98.01, Some(100.0)));
    }

    #[test]
    fn percent_change_requires_positive_prev_close() {
        let alert = base_alert(AlertKind::PercentChange, 2.0);
        assert!(!alert.predicate_holds(98.0, Some(0.0)));
        assert!(!alert.predicate_holds(98.0, None));
    }

    #[test]
    fn volume_spike_is_always_false() {
        let alert = base_alert(AlertKind::VolumeSpike, 1.0);
        assert!(!alert.predicate_holds(1_000_000.0, Some(1.0)));
    }

    // Property 1 — non-retrigger of non-repeating alerts
    #[test]
    fn non_repeating_triggered_alert_cannot_retrigger() {
        let mut alert = base_alert(AlertKind::PriceAbove, 150.0);
        alert.status = AlertStatus::Triggered;
        assert!(!alert.can_retrigger());
    }

    #[test]
    fn repeating_alert_can_always_retrigger() {
        let mut alert = base_alert(AlertKind::PriceAbove, 150.0);
        alert.repeating = true;
        alert.status = AlertStatus::Triggered;
        assert!(alert.can_retrigger());
    }

    #[test]
    fn action_phrase_table_matches_spec() {
        assert_eq!(AlertKind::PriceAbove.action_phrase(), "rose above");
        assert_eq!(AlertKind::PriceBelow.action_phrase(), "fell below");
        assert_eq!(AlertKind::PercentChange.action_phrase(), "changed by");
        assert_eq!(AlertKind::VolumeSpike.action_phrase(), "volume spiked");
    }
}
