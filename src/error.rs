//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Fatal-vs-recoverable is decided by the caller: the ingestion
//! orchestrator records [`Error::Fetch`] and [`Error::BackendUnavailable`]
//! per source and keeps going, while [`Error::Config`] and
//! [`Error::DimensionMismatch`] abort the whole run.

use std::path::PathBuf;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid parameters, e.g. overlap >= chunk size. Surfaced before any
    /// partial work is attempted.
    #[error("config error: {0}")]
    Config(String),

    /// An HTTP backend (embeddings or chat) stayed unreachable after the
    /// retry budget was exhausted.
    #[error("backend unavailable ({endpoint}): {reason}")]
    BackendUnavailable { endpoint: String, reason: String },

    /// A vector's length disagrees with the index's established
    /// dimensionality. Never silently truncated or padded.
    #[error("dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A crawler fetch or parse failed for one URL. Recoverable: the task
    /// is marked failed and the crawl continues.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Retrieval against an index with zero passages. Distinct from a
    /// valid low-score result set.
    #[error("index at {} contains no passages", .0.display())]
    IndexEmpty(PathBuf),

    /// The on-disk index artifacts are inconsistent beyond recovery.
    #[error("index corrupt at {}: {reason}", .path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    /// The run was interrupted between batches; completed batches remain
    /// durable.
    #[error("operation cancelled")]
    Cancelled,

    /// Text extraction from a document failed.
    #[error("extraction failed for {}: {reason}", .path.display())]
    Extract { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
