//! Sharded monotonic id generator (spec.md §4.3).
//!
//! The 64-bit id space is partitioned into fixed-width shards. Each shard
//! hands out ids under its own [`parking_lot::Mutex`]; `allocate()` scans
//! the shard array with a non-blocking try-lock, falling back to a
//! cooperative yield if every shard is momentarily held. When a shard is
//! exhausted, it's replaced under the generator-global lock by scanning the
//! allocation ledger for the next free range.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::AllocationLedgerStore;
use crate::error::CoreResult;

/// Width of a single shard: `2^25`, per spec.md §3.
pub const SHARD_SIZE: u64 = 1 << 25;

/// Default number of live shards the generator holds.
pub const DEFAULT_SHARD_COUNT: usize = 12;

/// One contiguous, disjoint range of the id space owned by the generator.
struct Shard {
    start: u64,
    end: u64,
    cursor: u64,
}

impl Shard {
    fn new(start: u64, end: u64, cursor: u64) -> Self {
        Self { start, end, cursor }
    }

    /// `cursor + 1`, the next value this shard would hand out, if any
    /// remain.
    fn try_next(&mut self) -> Option<u64> {
        let v = self.cursor + 1;
        if v <= self.end {
            self.cursor = v;
            Some(v)
        } else {
            None
        }
    }
}

/// The sharded id generator. Cheap to clone (wraps an `Arc`).
#[derive(Clone)]
pub struct ShardedIdGenerator {
    inner: Arc<Inner>,
}

struct Inner {
    shards: Vec<Mutex<Shard>>,
    /// Global cursor: the first range not yet assigned to any shard. A
    /// `tokio::sync::Mutex`, not `parking_lot`, because the ledger scan
    /// that runs while it's held suspends across `.await` points.
    next: tokio::sync::Mutex<u64>,
    ledger: Arc<dyn AllocationLedgerStore>,
}

impl ShardedIdGenerator {
    /// Build the generator at startup, scanning the ledger to skip fully
    /// consumed ranges, per spec.md §4.3 "Startup".
    pub async fn start(
        ledger: Arc<dyn AllocationLedgerStore>,
        shard_count: usize,
    ) -> CoreResult<Self> {
        let mut next: u64 = 1;
        let mut shards = Vec::with_capacity(shard_count);

        for _ in 0..shard_count {
            loop {
                let end = next
                    .checked_add(SHARD_SIZE - 1)
                    .ok_or(crate::error::CoreError::IdExhausted)?;
                let max_used = ledger.max_used_in_range(next, end + 1).await?;
                if max_used == end {
                    next = next.checked_add(SHARD_SIZE).ok_or(crate::error::CoreError::IdExhausted)?;
                    continue;
                }
                let cursor = max_used.max(next.saturating_sub(1));
                shards.push(Mutex::new(Shard::new(next, end, cursor)));
                next = next.checked_add(SHARD_SIZE).ok_or(crate::error::CoreError::IdExhausted)?;
                break;
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                shards,
                next: tokio::sync::Mutex::new(next),
                ledger,
            }),
        })
    }

    /// Allocate the next id. Spins across shards with a non-blocking
    /// try-lock; on contention, cooperatively yields between passes.
    pub async fn allocate(&self) -> CoreResult<u64> {
        loop {
            for shard in &self.inner.shards {
                let Some(mut guard) = shard.try_lock() else {
                    continue;
                };
                if let Some(v) = guard.try_next() {
                    return Ok(v);
                }
                // Exhausted: drop the shard lock before the ledger scan (a
                // `parking_lot` guard must never be held across an `.await`)
                // and replace the range under the generator-global lock.
                let old_end = guard.end;
                drop(guard);
                let (new_start, new_end, new_cursor) = self.next_free_range().await?;
                if let Some(mut guard) = shard.try_lock() {
                    *guard = Shard::new(new_start, new_end, new_cursor);
                }
                // Ledger write for the retired range's watermark is the
                // caller's (lifecycle coordinator's) job-queue
                // responsibility; record it eagerly here too so restart
                // recovery doesn't depend on a clean shutdown.
                if let Err(e) = self.inner.ledger.record_last_used(old_end).await {
                    log::warn!("failed to record retired shard watermark {old_end}: {e}");
                }
                // Retry from the top; the replaced shard (or another) will
                // accept this pass.
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    async fn next_free_range(&self) -> CoreResult<(u64, u64, u64)> {
        let mut next = self.inner.next.lock().await;
        loop {
            let end = next
                .checked_add(SHARD_SIZE - 1)
                .ok_or(crate::error::CoreError::IdExhausted)?;
            let max_used = self.inner.ledger.max_used_in_range(*next, end + 1).await?;
            if max_used == end {
                *next = next.checked_add(SHARD_SIZE).ok_or(crate::error::CoreError::IdExhausted)?;
                continue;
            }
            let start = *next;
            let cursor = max_used.max(start.saturating_sub(1));
            *next = next.checked_add(SHARD_SIZE).ok_or(crate::error::CoreError::IdExhausted)?;
            return Ok((start, end, cursor));
        }
    }

    /// Snapshot of each shard's current cursor, for the lifecycle
    /// coordinator's shutdown flush (spec.md §4.3 "Shutdown"). Shards whose
    /// cursor never advanced past `start - 1` are omitted.
    pub fn snapshot(&self) -> Vec<u64> {
        self.inner
            .shards
            .iter()
            .filter_map(|s| {
                let s = s.lock();
                if s.cursor + 1 > s.start {
                    Some(s.cursor)
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AllocationLedgerStore;
    use async_trait::async_trait;
    use parking_lot::Mutex as StdMutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// An in-memory ledger fake for tests.
    #[derive(Default)]
    struct FakeLedger {
        watermarks: StdMutex<BTreeSet<u64>>,
    }

    #[async_trait]
    impl AllocationLedgerStore for FakeLedger {
        async fn record_last_used(&self, v: u64) -> CoreResult<()> {
            self.watermarks.lock().insert(v);
            Ok(())
        }

        async fn max_used_in_range(&self, lo: u64, hi: u64) -> CoreResult<u64> {
            Ok(self
                .watermarks
                .lock()
                .range(lo..hi)
                .next_back()
                .copied()
                .unwrap_or(0))
        }
    }

    #[tokio::test]
    async fn fresh_generator_hands_out_one_first() {
        let gen = ShardedIdGenerator::start(Arc::new(FakeLedger::default()), 4)
            .await
            .unwrap();
        assert_eq!(gen.allocate().await.unwrap(), 1);
        assert_eq!(gen.allocate().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ids_are_unique_under_concurrent_allocation() {
        let gen = ShardedIdGenerator::start(Arc::new(FakeLedger::default()), 4)
            .await
            .unwrap();
        let n = 2_000usize;
        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            let gen = gen.clone();
            handles.push(tokio::spawn(async move { gen.allocate().await.unwrap() }));
        }
        let mut values = BTreeSet::new();
        for h in handles {
            values.insert(h.await.unwrap());
        }
        assert_eq!(values.len(), n);
    }

    #[tokio::test]
    async fn restart_never_reissues_a_previously_used_id() {
        let ledger = Arc::new(FakeLedger::default());
        let gen = ShardedIdGenerator::start(ledger.clone(), 1).await.unwrap();
        let mut handed_out = Vec::new();
        for _ in 0..3 {
            handed_out.push(gen.allocate().await.unwrap());
        }
        for v in gen.snapshot() {
            ledger.record_last_used(v).await.unwrap();
        }

        let restarted = ShardedIdGenerator::start(ledger, 1).await.unwrap();
        let next = restarted.allocate().await.unwrap();
        assert!(next > *handed_out.iter().max().unwrap());
    }

    #[tokio::test]
    async fn near_the_end_of_the_id_space_reports_exhaustion_instead_of_overflowing() {
        let gen = ShardedIdGenerator {
            inner: Arc::new(Inner {
                shards: Vec::new(),
                next: tokio::sync::Mutex::new(u64::MAX - SHARD_SIZE / 2),
                ledger: Arc::new(FakeLedger::default()),
            }),
        };
        assert!(matches!(
            gen.next_free_range().await,
            Err(crate::error::CoreError::IdExhausted)
        ));
    }
}
