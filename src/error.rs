//! Error Taxonomy
//! Mission: Give every failure mode a name so callers can decide retry vs skip vs abort.

use thiserror::Error;

/// Errors produced by a venue adapter call.
///
/// Transient errors are retried by the fetcher (up to 3 attempts with
/// backoff); permanent errors disable the pair for the remainder of the tick.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("transient venue error on {venue}: {message}")]
    Transient { venue: String, message: String },

    #[error("permanent venue error on {venue}: {message}")]
    Permanent { venue: String, message: String },
}

impl VenueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Transient { .. })
    }
}

/// Top-level pipeline error taxonomy (spec.md §7).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient venue error: {0}")]
    Transient(#[from] VenueErrorTransient),

    #[error("permanent venue error for pair {pair_id}: {message}")]
    Permanent { pair_id: String, message: String },

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Newtype so `VenueError::Transient` converts into `PipelineError::Transient`
/// without colliding with the `Permanent` variant's different shape.
#[derive(Debug, Error)]
#[error("{venue}: {message}")]
pub struct VenueErrorTransient {
    pub venue: String,
    pub message: String,
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Store(format!("messaging transport error: {e}"))
    }
}

/// Distinguishes a malformed order book / inverted bid-ask from a plain data
/// integrity error string, so callers can count it without string matching.
#[derive(Debug, Error)]
pub enum DataIntegrityError {
    #[error("order book for {venue}/{symbol} has non-monotonic {side} levels")]
    NonMonotonicBook {
        venue: String,
        symbol: String,
        side: &'static str,
    },
    #[error("order book for {venue}/{symbol} has a non-positive size level")]
    NonPositiveSize { venue: String, symbol: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
