//! Sharded view counter with asynchronous flush to durable storage
//! (spec.md §4.6).
//!
//! The authoritative value lives in the KV store under `"view:" + id`;
//! `INCR` is the only mutation. A periodic snapshot pass scans `"view:*"`,
//! and overwrites the durable `count` column with the running total — the
//! open question in spec.md §9(a) is resolved here in favor of overwrite
//! semantics (see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{DurableStore, KvStore};
use crate::error::CoreResult;
use crate::model::ViewSnapshotItem;

const VIEW_KEY_PREFIX: &str = "view:";
/// Cold key TTL: a URL that stops receiving views forgets its counter
/// quickly; continued `INCR`s (and the cache's post-hit refresh) keep a
/// hot key's TTL alive by re-touching it.
const COLD_TTL: Duration = Duration::from_secs(60);
const SCAN_PAGE_SIZE: usize = 1000;

/// Per-id view counter, backed entirely by the KV layer's atomic `INCR`.
pub struct ViewCounter {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn DurableStore>,
}

impl ViewCounter {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn DurableStore>) -> Self {
        Self { kv, store }
    }

    fn key(id: &str) -> String {
        format!("{VIEW_KEY_PREFIX}{id}")
    }

    /// Initialize a freshly created url's counter to zero with the cold
    /// TTL, per spec.md §4.6.
    pub async fn init_key(&self, id: &str) -> CoreResult<()> {
        self.kv.set_with_ttl(&Self::key(id), "0", COLD_TTL).await
    }

    /// Increment `"view:"+id`, logging (never propagating) failure — the
    /// read path that triggers this must not fail because of it.
    pub fn increment_fire_and_forget(self: &Arc<Self>, id: &str) {
        let this = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.kv.incr(&Self::key(&id)).await {
                log::warn!("view increment failed for {id}: {e}");
            }
        });
    }

    /// Read the live counter value, falling back to the durable `count`
    /// column if the key has expired or the KV layer is unavailable.
    pub async fn read(&self, id: &str) -> CoreResult<i64> {
        match self.kv.get(&Self::key(id)).await {
            Ok(Some(s)) => Ok(s.parse().unwrap_or(0)),
            Ok(None) => self.store.get_count(id).await,
            Err(e) => {
                log::warn!("view read from cache failed for {id}, falling back to store: {e}");
                self.store.get_count(id).await
            }
        }
    }

    /// One pass of the periodic snapshot flusher (spec.md §4.6). Scans
    /// every `"view:*"` key in pages of [`SCAN_PAGE_SIZE`], and applies the
    /// totals as one multi-values overwrite. Callers (the lifecycle
    /// coordinator's ticker, or a test) drive this directly rather than a
    /// hidden internal timer, per spec.md §9.
    pub async fn flush_snapshot(&self) -> CoreResult<usize> {
        let mut items = Vec::new();
        let mut cursor = 0u64;
        loop {
            let page = self
                .kv
                .scan(VIEW_KEY_PREFIX, cursor, SCAN_PAGE_SIZE)
                .await?;
            for key in &page.keys {
                if let Ok(Some(raw)) = self.kv.get(key).await {
                    if let Ok(value) = raw.parse::<i64>() {
                        items.push(ViewSnapshotItem {
                            id: key.trim_start_matches(VIEW_KEY_PREFIX).to_string(),
                            value,
                        });
                    }
                }
            }
            cursor = page.next_cursor;
            if cursor == 0 {
                break;
            }
        }

        if items.is_empty() {
            return Ok(0);
        }
        let n = items.len();
        self.store.apply_view_snapshot(&items).await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::KvScanPage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemKv {
        data: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl KvStore for MemKv {
        async fn get(&self, key: &str) -> CoreResult<Option<String>> {
            Ok(self.data.lock().get(key).map(|v| v.to_string()))
        }
        async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
            self.data
                .lock()
                .insert(key.to_string(), value.parse().unwrap_or(0));
            Ok(())
        }
        async fn set_with_ttl(&self, key: &str, value: &str, _ttl: Duration) -> CoreResult<()> {
            self.set(key, value).await
        }
        async fn incr(&self, key: &str) -> CoreResult<i64> {
            let mut d = self.data.lock();
            let v = d.entry(key.to_string()).or_insert(0);
            *v += 1;
            Ok(*v)
        }
        async fn scan(&self, prefix: &str, _cursor: u64, _page_size: usize) -> CoreResult<KvScanPage> {
            let keys = self
                .data
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            Ok(KvScanPage {
                keys,
                next_cursor: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        applied: Mutex<Vec<ViewSnapshotItem>>,
    }

    #[async_trait]
    impl DurableStore for RecordingStore {
        async fn create(&self, _id: &str, _origin: &str) -> CoreResult<crate::model::ShortUrl> {
            unreachable!()
        }
        async fn create_batch(&self, _pending: &[crate::model::PendingCreate]) -> CoreResult<()> {
            unreachable!()
        }
        async fn get_origin(&self, _id: &str) -> CoreResult<String> {
            unreachable!()
        }
        async fn get_fraud(&self, _id: &str) -> CoreResult<bool> {
            unreachable!()
        }
        async fn get_count(&self, _id: &str) -> CoreResult<i64> {
            Ok(0)
        }
        async fn apply_view_snapshot(&self, items: &[ViewSnapshotItem]) -> CoreResult<()> {
            self.applied.lock().extend_from_slice(items);
            Ok(())
        }
        async fn mark_fraud(&self, _id: &str) -> CoreResult<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn concurrent_increments_from_many_workers_sum_exactly() {
        let kv = Arc::new(MemKv::default());
        let store = Arc::new(RecordingStore::default());
        let counter = Arc::new(ViewCounter::new(kv.clone(), store));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    counter.kv.incr("view:k").await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.read("k").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn snapshot_flush_is_idempotent_with_no_intervening_incr() {
        let kv = Arc::new(MemKv::default());
        let store = Arc::new(RecordingStore::default());
        let counter = ViewCounter::new(kv.clone(), store.clone());

        kv.incr("view:a").await.unwrap();
        kv.incr("view:a").await.unwrap();

        counter.flush_snapshot().await.unwrap();
        counter.flush_snapshot().await.unwrap();

        let applied = store.applied.lock();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|i| i.id == "a" && i.value == 2));
    }
}
