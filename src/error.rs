// =============================================================================
// Error taxonomy
// =============================================================================
//
// Each subsystem gets a `thiserror` enum when callers need to branch on the
// failure kind (retry vs. skip vs. fatal). Everywhere else, `anyhow::Result`
// with `.context(...)` carries the failure up to the supervisor's log line.
// =============================================================================

use thiserror::Error;

/// Errors surfaced by [`crate::upstream::client::UpstreamClient`].
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream response could not be parsed: {reason}")]
    BadResponse { reason: String },

    #[error("upstream rejected the request: status {status}")]
    Rejected { status: u16 },
}

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row violated an invariant: {reason}")]
    InvariantViolation { reason: String },
}

/// Errors surfaced while loading [`crate::config::Config`] at startup. These
/// are fatal: the process exits before any subsystem starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("environment variable {name} has an invalid value '{value}': {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}
