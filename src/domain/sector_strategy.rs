// =============================================================================
// SectorStrategy — relative-strength divergence watch over a sector's basket
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStrategy {
    pub id: i64,
    pub user_id: i64,
    pub sector_id: i64,
    pub is_active: bool,
    pub percent_majority: f64,
    pub trend_threshold: f64,
    pub laggard_threshold: f64,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl SectorStrategy {
    pub fn default_percent_majority() -> f64 {
        70.0
    }

    pub fn default_trend_threshold() -> f64 {
        1.5
    }

    pub fn default_laggard_threshold() -> f64 {
        -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_values() {
        assert_eq!(SectorStrategy::default_percent_majority(), 70.0);
        assert_eq!(SectorStrategy::default_trend_threshold(), 1.5);
        assert_eq!(SectorStrategy::default_laggard_threshold(), -1.0);
    }
}
