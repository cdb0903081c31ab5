// =============================================================================
// Sector — a user-defined grouping of stocks (a "watchlist bucket")
// =============================================================================

use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl Sector {
    pub fn default_color() -> String {
        "#6366f1".to_string()
    }

    pub fn default_icon() -> String {
        "folder".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStock {
    pub id: i64,
    pub sector_id: i64,
    pub symbol: Symbol,
    pub stock_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_color_and_icon_match_original_values() {
        assert_eq!(Sector::default_color(), "#6366f1");
        assert_eq!(Sector::default_icon(), "folder");
    }
}
