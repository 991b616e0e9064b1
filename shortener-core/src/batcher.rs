//! Write batcher: accumulates create requests and flushes them in bulk to
//! durable storage on a size or time trigger (spec.md §4.5).
//!
//! Creates are optimistically acknowledged: the id is written into the
//! front cache synchronously (see [`WriteBatcher::create`]), and the row
//! becomes durable within the flush interval in the happy path, or via the
//! job queue if the inline flush fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::FrontCache;
use crate::collaborators::{DurableStore, JobQueue};
use crate::error::CoreResult;
use crate::model::PendingCreate;

/// Flush once pending reaches this many entries.
pub const FLUSH_SIZE_TRIGGER: usize = 1000;
/// Or once this much time has elapsed since the last flush, whichever
/// comes first.
pub const FLUSH_TIME_TRIGGER: Duration = Duration::from_secs(5);

struct State {
    pending: Vec<PendingCreate>,
    last_flush: Instant,
}

/// The write batcher. One instance per process; its pending slice is
/// exclusively owned behind a single [`parking_lot::Mutex`].
pub struct WriteBatcher {
    state: Mutex<State>,
    store: Arc<dyn DurableStore>,
    queue: Arc<dyn JobQueue>,
    cache: Arc<FrontCache>,
}

impl WriteBatcher {
    pub fn new(store: Arc<dyn DurableStore>, queue: Arc<dyn JobQueue>, cache: Arc<FrontCache>) -> Self {
        Self {
            state: Mutex::new(State {
                pending: Vec::new(),
                last_flush: Instant::now(),
            }),
            store,
            queue,
            cache,
        }
    }

    /// Buffer `{id, url}` for the next flush and warm the cache so
    /// immediate reads for `id` succeed before durability completes. This
    /// is the optimistic-ack: the caller gets the id back now.
    ///
    /// A cache-warm failure is logged and swallowed, matching the
    /// degraded-but-correct handling `FrontCache` itself uses for cache
    /// misses (spec.md §7): the create must still be buffered for the
    /// batcher even if the optimistic-read shortcut didn't get warmed.
    pub async fn create(&self, id: String, url: String) -> CoreResult<()> {
        if let Err(e) = self.cache.warm(&id, &url).await {
            log::warn!("failed to warm cache for {id} on create, falling through: {e}");
        }
        self.state.lock().pending.push(PendingCreate { id, url });
        // Re-evaluate the flush trigger immediately rather than waiting for
        // the lifecycle coordinator's next tick, so the size trigger can
        // actually bound pending growth under high write throughput
        // (spec.md §4.5) instead of only ever firing on the 5s cadence.
        self.tick().await
    }

    /// Evaluate the flush condition and, if met, attempt the bulk insert.
    /// Driven by a periodic tick owned by the lifecycle coordinator (or
    /// directly by a test), per spec.md §9's "invoke the tick directly"
    /// guidance.
    pub async fn tick(&self) -> CoreResult<()> {
        let batch = {
            let mut state = self.state.lock();
            if !Self::should_flush(&state) {
                return Ok(());
            }
            let batch = std::mem::take(&mut state.pending);
            state.last_flush = Instant::now();
            batch
        };
        if batch.is_empty() {
            return Ok(());
        }
        self.flush(batch).await
    }

    fn should_flush(state: &State) -> bool {
        state.pending.len() >= FLUSH_SIZE_TRIGGER
            || (!state.pending.is_empty() && state.last_flush.elapsed() >= FLUSH_TIME_TRIGGER)
    }

    async fn flush(&self, batch: Vec<PendingCreate>) -> CoreResult<()> {
        match self.store.create_batch(&batch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!(
                    "inline flush of {} pending creates failed, handing off to job queue: {e}",
                    batch.len()
                );
                self.queue.enqueue_batch_create(batch).await
            }
        }
    }

    /// Force a flush regardless of the size/time trigger — used by the
    /// lifecycle coordinator on graceful shutdown.
    pub async fn flush_all(&self) -> CoreResult<()> {
        let batch = std::mem::take(&mut self.state.lock().pending);
        if batch.is_empty() {
            return Ok(());
        }
        self.flush(batch).await
    }

    /// Number of creates currently buffered; exposed for tests and
    /// diagnostics, not part of the hot path.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DurableStore, JobQueue, KvScanPage, KvStore};
    use crate::counter::ViewCounter;
    use crate::model::ViewSnapshotItem;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakyStore {
        fail_once: AtomicBool,
        batches_written: Mutex<Vec<Vec<PendingCreate>>>,
    }

    #[async_trait]
    impl DurableStore for FlakyStore {
        async fn create(&self, _id: &str, _origin: &str) -> CoreResult<crate::model::ShortUrl> {
            unreachable!()
        }
        async fn create_batch(&self, pending: &[PendingCreate]) -> CoreResult<()> {
            if self
                .fail_once
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(crate::error::CoreError::StoreUnavailable("boom".into()));
            }
            self.batches_written.lock().push(pending.to_vec());
            Ok(())
        }
        async fn get_origin(&self, _id: &str) -> CoreResult<String> {
            unreachable!()
        }
        async fn get_fraud(&self, _id: &str) -> CoreResult<bool> {
            unreachable!()
        }
        async fn get_count(&self, _id: &str) -> CoreResult<i64> {
            unreachable!()
        }
        async fn apply_view_snapshot(&self, _items: &[ViewSnapshotItem]) -> CoreResult<()> {
            unreachable!()
        }
        async fn mark_fraud(&self, _id: &str) -> CoreResult<()> {
            unreachable!()
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        enqueued: Mutex<Vec<PendingCreate>>,
        batch_create_calls: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue_add_last_used_id(&self, _last_used_id: u64) -> CoreResult<()> {
            Ok(())
        }
        async fn enqueue_batch_create(&self, pending: Vec<PendingCreate>) -> CoreResult<()> {
            self.batch_create_calls.fetch_add(1, Ordering::SeqCst);
            self.enqueued.lock().extend(pending);
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullKv;
    #[async_trait]
    impl KvStore for NullKv {
        async fn get(&self, _key: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> CoreResult<()> {
            Ok(())
        }
        async fn incr(&self, _key: &str) -> CoreResult<i64> {
            Ok(1)
        }
        async fn scan(&self, _prefix: &str, _cursor: u64, _page_size: usize) -> CoreResult<KvScanPage> {
            Ok(KvScanPage::default())
        }
    }

    fn make_cache(store: Arc<dyn DurableStore>) -> Arc<FrontCache> {
        let kv: Arc<dyn KvStore> = Arc::new(NullKv);
        let counter = Arc::new(ViewCounter::new(kv.clone(), store.clone()));
        Arc::new(FrontCache::new(kv, store, counter))
    }

    #[tokio::test]
    async fn size_trigger_flushes_without_waiting_for_time() {
        let store: Arc<dyn DurableStore> = Arc::new(FlakyStore::default());
        let queue: Arc<dyn JobQueue> = Arc::new(RecordingQueue::default());
        let cache = make_cache(store.clone());
        let batcher = WriteBatcher::new(store, queue, cache);

        // `create()` re-evaluates the flush trigger after every push, so
        // the size trigger fires on the call that reaches
        // `FLUSH_SIZE_TRIGGER` without waiting for a ticker. The flaky
        // store fails that first inline flush, handing the batch to the
        // queue instead.
        for i in 0..FLUSH_SIZE_TRIGGER {
            batcher
                .create(format!("id{i}"), "https://example.com".into())
                .await
                .unwrap();
        }
        assert_eq!(batcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn failed_inline_flush_hands_batch_to_job_queue() {
        let store: Arc<dyn DurableStore> = Arc::new(FlakyStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let cache = make_cache(store.clone());
        let batcher = WriteBatcher::new(store, queue.clone(), cache);

        for i in 0..FLUSH_SIZE_TRIGGER {
            batcher
                .create(format!("id{i}"), "https://example.com".into())
                .await
                .unwrap();
        }

        assert_eq!(queue.batch_create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.enqueued.lock().len(), FLUSH_SIZE_TRIGGER);
    }

    #[tokio::test]
    async fn sub_threshold_batch_does_not_flush_before_time_trigger() {
        let store: Arc<dyn DurableStore> = Arc::new(FlakyStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let cache = make_cache(store.clone());
        let batcher = WriteBatcher::new(store, queue, cache);

        batcher.create("id0".into(), "https://example.com".into()).await.unwrap();
        batcher.tick().await.unwrap();
        assert_eq!(batcher.pending_len(), 1, "below both triggers, must not flush yet");
    }
}
