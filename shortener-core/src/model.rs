//! Data model shared by the core components and the HTTP surface.
//!
//! See spec.md §3 — these are plain value types; none of them owns a lock
//! or a connection. Persistence and mutation rules live in the component
//! modules, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A previously allocated short URL record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortUrl {
    pub id: String,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    pub fraud: bool,
    pub count: i64,
}

/// A create request that has been allocated an id but not yet durably
/// written. Buffered in the write batcher's pending slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub id: String,
    pub url: String,
}

/// `{id, url}` fanned out to the fraud scanner after a successful create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FraudEvent {
    pub id: String,
    pub url: String,
}

/// One `{id, value}` pair produced by a view-counter snapshot pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshotItem {
    pub id: String,
    pub value: i64,
}

/// Verdict returned by the pluggable reputation check the fraud scanner
/// consults. The real reputation API is out of core scope (spec.md §1);
/// this is the narrow interface the scanner is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationVerdict {
    Clean,
    Malicious,
}
