//! Front cache with single-flight deduplication for cold reads (spec.md
//! §4.4).
//!
//! `resolve` checks the KV cache first; on a miss, concurrent callers for
//! the same id coalesce into one durable-store read via the single-flight
//! group below, modeled on the "mutex-guarded map of `{waiters, result}`
//! cells" spec.md §9 describes for runtimes without a built-in primitive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::collaborators::{DurableStore, KvStore};
use crate::counter::ViewCounter;
use crate::error::{CoreError, CoreResult};

const CACHE_GET_DEADLINE: Duration = Duration::from_secs(2);
const STORE_GET_DEADLINE: Duration = Duration::from_secs(3);
const CACHE_SET_DEADLINE: Duration = Duration::from_secs(5);

/// Joined-waiter cell for one in-flight durable-store read.
struct InFlight {
    // A broadcast channel closes (all subscribers are woken with `Err`)
    // once the winner drops its sender, which happens after it stores the
    // result — simplest way to fan a single outcome out to N joiners.
    done: broadcast::Sender<CoreResult<String>>,
}

/// Front cache: KV-backed with single-flight coalescing of cold reads.
pub struct FrontCache {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn DurableStore>,
    counter: Arc<ViewCounter>,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl FrontCache {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn DurableStore>, counter: Arc<ViewCounter>) -> Self {
        Self {
            kv,
            store,
            counter,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `id` to its origin URL, per spec.md §4.4.
    pub async fn resolve(&self, id: &str) -> CoreResult<String> {
        if let Some(origin) = self.try_cache_get(id).await {
            self.counter.increment_fire_and_forget(id);
            return Ok(origin);
        }

        let origin = self.resolve_cold(id).await?;
        self.counter.increment_fire_and_forget(id);
        Ok(origin)
    }

    async fn try_cache_get(&self, id: &str) -> Option<String> {
        match timeout(CACHE_GET_DEADLINE, self.kv.get(id)).await {
            Ok(Ok(Some(v))) => Some(v),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                log::warn!("cache get failed for {id}, falling through to store: {e}");
                None
            }
            Err(_) => {
                log::warn!("cache get timed out for {id}, falling through to store");
                None
            }
        }
    }

    /// Join (or start) the single-flight group for `id` and return its
    /// outcome. Exactly one caller per concurrently-missing `id` queries
    /// the durable store.
    async fn resolve_cold(&self, id: &str) -> CoreResult<String> {
        let (is_winner, mut rx) = {
            let mut map = self.in_flight.lock();
            if let Some(existing) = map.get(id) {
                (false, existing.done.subscribe())
            } else {
                let (tx, rx) = broadcast::channel(1);
                map.insert(id.to_string(), Arc::new(InFlight { done: tx }));
                (true, rx)
            }
        };

        if !is_winner {
            return match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(CoreError::StoreUnavailable(
                    "single-flight winner vanished without a result".into(),
                )),
            };
        }
        drop(rx);

        let result = match timeout(STORE_GET_DEADLINE, self.store.get_origin(id)).await {
            Ok(r) => r,
            Err(_) => Err(CoreError::StoreUnavailable(format!(
                "durable read timed out for {id}"
            ))),
        };

        if let Ok(origin) = &result {
            if let Err(e) = timeout(
                CACHE_SET_DEADLINE,
                self.kv.set(id, origin),
            )
            .await
            .unwrap_or_else(|_| Err(CoreError::CacheUnavailable("cache set timed out".into())))
            {
                log::warn!("failed to warm cache for {id} after cold read: {e}");
            }
        }

        let cell = self.in_flight.lock().remove(id);
        if let Some(cell) = cell {
            // Fan out to every joiner; broadcast::Sender::send fails only
            // when there are zero receivers, which is fine here.
            let _ = cell.done.send(result.clone());
        }

        result
    }

    /// Used by the write batcher on create: the id is already known-good,
    /// so it's written straight into the cache without a durable read.
    pub async fn warm(&self, id: &str, origin: &str) -> CoreResult<()> {
        timeout(CACHE_SET_DEADLINE, self.kv.set(id, origin))
            .await
            .unwrap_or_else(|_| Err(CoreError::CacheUnavailable("cache set timed out".into())))
    }
}
