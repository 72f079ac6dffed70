//! Error hierarchy for the routing core.
//!
//! Mirrors the error kinds laid out in the specification: `ClientError` and
//! `ContentError`/`RoutingError` are the only variants that a caller should
//! ever see propagate out of the query path. `PeerUnavailable` and
//! `SnapshotCorrupt` are recoverable conditions that the cache lifecycle
//! handles internally; row-level ingest problems never become an `Err` at
//! all — they are logged via `tracing::warn!` and the offending row is
//! skipped (see `crate::ingest`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingCoreError {
    /// Malformed input, unknown parameter, or unparseable date: reject the
    /// request rather than degrade it.
    #[error("client error: {0}")]
    ClientError(String),

    /// No routes match the query. Terminal for the request, reported as an
    /// empty-result status by the caller.
    #[error("no routes found")]
    NoRoutesFound,

    /// An internal invariant failed while searching (e.g. an intersection
    /// that should not have been empty was). Surfaced as empty-result.
    #[error("routing error: {0}")]
    RoutingError(String),

    /// A peer fetch failed; the previous snapshot is preserved.
    #[error("peer {peer} unavailable: {reason}")]
    PeerUnavailable { peer: String, reason: String },

    /// The on-disk snapshot failed to deserialise; callers should fall
    /// through to a full re-ingest.
    #[error("snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RoutingCoreError>;
