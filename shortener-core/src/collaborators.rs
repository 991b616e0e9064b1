//! Trait boundary between the core coordination layer and the external
//! systems spec.md §1 calls out as deliberately out of scope: the durable
//! relational store, the distributed KV cache, the durable job queue, and
//! the fan-out message bus.
//!
//! The core only ever talks to these through the traits below — it never
//! assumes Postgres, Redis, or RabbitMQ specifically. `shortener-api`
//! supplies the concrete adapters. This mirrors the `ServiceProtocol`
//! trait boundary `router-core::system::protocol::services` draws between
//! its dispatch loop and pluggable service implementations.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{PendingCreate, ShortUrl, ViewSnapshotItem};

/// The durable relational store: `urls(id, original_url, created_at, fraud,
/// count)` per spec.md §6.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert a single row, returning the row as persisted (with its
    /// server-assigned `created_at`).
    async fn create(&self, id: &str, origin: &str) -> CoreResult<ShortUrl>;

    /// Bulk multi-values insert used by both the inline batch flush and the
    /// `batch_create` job-queue fallback.
    async fn create_batch(&self, pending: &[PendingCreate]) -> CoreResult<()>;

    /// `SELECT original_url FROM urls WHERE id = ?`.
    async fn get_origin(&self, id: &str) -> CoreResult<String>;

    /// `SELECT fraud FROM urls WHERE id = ?`.
    async fn get_fraud(&self, id: &str) -> CoreResult<bool>;

    /// `SELECT count FROM urls WHERE id = ?`.
    async fn get_count(&self, id: &str) -> CoreResult<i64>;

    /// Overwrite `count` for every `(id, value)` pair in one multi-values
    /// `UPDATE ... FROM (VALUES ...)`. See spec.md §4.6.
    async fn apply_view_snapshot(&self, items: &[ViewSnapshotItem]) -> CoreResult<()>;

    /// `UPDATE urls SET fraud = true WHERE id = $1`; must affect exactly
    /// one row in the non-test adapter.
    async fn mark_fraud(&self, id: &str) -> CoreResult<()>;
}

/// The allocation ledger: durable "last-used-id" watermarks, `ids(id)` per
/// spec.md §6.
#[async_trait]
pub trait AllocationLedgerStore: Send + Sync {
    /// Idempotent insert of a retired shard's last-used id.
    async fn record_last_used(&self, v: u64) -> CoreResult<()>;

    /// Largest recorded watermark in `[lo, hi)`, or `0` if none.
    async fn max_used_in_range(&self, lo: u64, hi: u64) -> CoreResult<u64>;
}

/// The distributed KV cache: `GET`/`SET`/`SET` with TTL/`INCR`/per-shard
/// `SCAN`, per spec.md §1.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> CoreResult<()>;
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: std::time::Duration,
    ) -> CoreResult<()>;
    /// Atomic increment; initializes the key to the increment amount if
    /// absent. Returns the post-increment value.
    async fn incr(&self, key: &str) -> CoreResult<i64>;
    /// Scan all keys matching `prefix*`, paged `page_size` at a time, one
    /// page per call via an opaque cursor (`0` starts a scan, `0` returned
    /// again means the scan is complete).
    async fn scan(&self, prefix: &str, cursor: u64, page_size: usize) -> CoreResult<KvScanPage>;
}

/// One page of a [`KvStore::scan`] call.
#[derive(Debug, Clone, Default)]
pub struct KvScanPage {
    pub keys: Vec<String>,
    pub next_cursor: u64,
}

/// The durable job queue (River in the original deployment): retry jobs
/// for ledger writes and batch-create fallback, per spec.md §6.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_add_last_used_id(&self, last_used_id: u64) -> CoreResult<()>;
    async fn enqueue_batch_create(&self, pending: Vec<PendingCreate>) -> CoreResult<()>;
}

/// The fan-out message bus (RabbitMQ in the original deployment): used to
/// notify the fraud scanner of newly created URLs, per spec.md §4.7.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: crate::model::FraudEvent) -> CoreResult<()>;
}
