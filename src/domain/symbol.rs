// =============================================================================
// Symbol — validated ticker newtype
// =============================================================================
//
// A short uppercase token (1-5 alphanumeric characters in the base form).
// Invalid input is rejected at construction so the rest of the core never
// has to re-validate a symbol it already holds.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum length of a base-form ticker (matches the `alerts.symbol`
/// column width in `migrations/0001_init.sql`).
const MAX_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol must be 1-{MAX_LEN} characters, got {0} ('{1}')")]
    BadLength(usize, String),
    #[error("symbol must be alphanumeric, got '{0}'")]
    NotAlphanumeric(String),
}

impl Symbol {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SymbolError> {
        let upper = raw.as_ref().to_uppercase();
        if upper.is_empty() || upper.len() > MAX_LEN {
            return Err(SymbolError::BadLength(upper.len(), upper));
        }
        if !upper.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SymbolError::NotAlphanumeric(upper));
        }
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Market-index symbols the Streamer always includes regardless of alert/sector content.
pub fn market_index_symbols() -> [Symbol; 3] {
    [
        Symbol("SPY".to_string()),
        Symbol("QQQ".to_string()),
        Symbol("IWM".to_string()),
    ]
}
