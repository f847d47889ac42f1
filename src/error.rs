//! Library error taxonomy.
//!
//! Duplicate content is deliberately *not* an error — it surfaces as
//! [`IngestOutcome::Skipped`](crate::ledger::IngestOutcome). Likewise a
//! missing index yields an empty search result, and an unresolvable index
//! position is dropped from results. Only genuinely unrecoverable conditions
//! appear here.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    /// Caller contract violation on chunking parameters; never clamped.
    #[error("invalid chunking parameters: {0}")]
    InvalidChunkParams(String),

    /// Fatal to the current index rebuild. The previous epoch stays live.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("entity recognition error: {0}")]
    Recognition(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// The serialized index artifact failed its header or length checks.
    /// Loaders treat this as "no index"; the codec itself reports it.
    #[error("index artifact corrupt: {0}")]
    IndexCorrupt(String),
}
