//! Error taxonomy for the core coordination layer.
//!
//! Mirrors the abstract error categories the HTTP surface maps to status
//! codes: `BadInput` -> 400, `NotFound` -> 404, the `*Unavailable` variants
//! -> 500 (except where the hot path is specified to swallow them).

use thiserror::Error;

/// Errors that can surface from the core components.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The caller supplied a malformed request (e.g. an empty origin URL).
    #[error("bad input: {0}")]
    BadInput(String),

    /// The requested id is not known to the cache or the durable store.
    #[error("not found")]
    NotFound,

    /// The durable relational store could not service the request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The distributed KV layer could not service the request.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The durable job queue could not accept a retry job.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The fan-out message bus could not accept a publish.
    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    /// All live shards are exhausted and no free range could be found.
    #[error("id space exhausted")]
    IdExhausted,
}

/// Result alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;
