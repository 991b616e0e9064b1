//! The assembled core: the facade `shortener-api`'s HTTP handlers call
//! into. Wires together the 8 components from spec.md §2 in their
//! dependency order.

use std::sync::Arc;

use crate::batcher::WriteBatcher;
use crate::cache::FrontCache;
use crate::codec;
use crate::collaborators::{AllocationLedgerStore, DurableStore, EventBus, JobQueue, KvStore};
use crate::counter::ViewCounter;
use crate::error::{CoreError, CoreResult};
use crate::fraud::FraudEventPublisher;
use crate::idgen::{ShardedIdGenerator, DEFAULT_SHARD_COUNT};
use crate::lifecycle::LifecycleCoordinator;
use crate::model::ShortUrl;

/// Everything the HTTP surface needs, assembled from the collaborator
/// traits. Cheap to clone (every field is an `Arc`).
#[derive(Clone)]
pub struct Engine {
    idgen: ShardedIdGenerator,
    cache: Arc<FrontCache>,
    batcher: Arc<WriteBatcher>,
    counter: Arc<ViewCounter>,
    fraud: Arc<FraudEventPublisher>,
    store: Arc<dyn DurableStore>,
    lifecycle: Arc<LifecycleCoordinator>,
}

impl Engine {
    /// Build the engine and start its background tickers. `shard_count`
    /// defaults to [`DEFAULT_SHARD_COUNT`] when `None`.
    pub async fn start(
        store: Arc<dyn DurableStore>,
        ledger: Arc<dyn AllocationLedgerStore>,
        kv: Arc<dyn KvStore>,
        queue: Arc<dyn JobQueue>,
        bus: Arc<dyn EventBus>,
        shard_count: Option<usize>,
    ) -> CoreResult<Self> {
        let idgen = ShardedIdGenerator::start(ledger.clone(), shard_count.unwrap_or(DEFAULT_SHARD_COUNT)).await?;
        let counter = Arc::new(ViewCounter::new(kv.clone(), store.clone()));
        let cache = Arc::new(FrontCache::new(kv, store.clone(), counter.clone()));
        let batcher = Arc::new(WriteBatcher::new(store.clone(), queue, cache.clone()));
        let fraud = Arc::new(FraudEventPublisher::new(bus));
        let lifecycle = Arc::new(LifecycleCoordinator::new(
            idgen.clone(),
            ledger,
            batcher.clone(),
            counter.clone(),
        ));
        lifecycle.spawn_background_tasks();

        Ok(Self {
            idgen,
            cache,
            batcher,
            counter,
            fraud,
            store,
            lifecycle,
        })
    }

    /// `POST /short`: allocate an id, buffer the write, warm the cache,
    /// initialize the view counter, and fire the fraud event — in that
    /// order, matching spec.md §4.5/§4.6/§4.7.
    pub async fn create(&self, origin: String) -> CoreResult<ShortUrl> {
        if origin.trim().is_empty() {
            return Err(CoreError::BadInput("origin must not be empty".into()));
        }

        let raw_id = self.idgen.allocate().await?;
        let id = codec::encode(raw_id);

        self.batcher.create(id.clone(), origin.clone()).await?;

        if let Err(e) = self.counter.init_key(&id).await {
            log::warn!("failed to initialize view counter for {id}: {e}");
        }

        self.fraud.publish_fire_and_forget(id.clone(), origin.clone());

        Ok(ShortUrl {
            id,
            origin,
            created_at: chrono::Utc::now(),
            fraud: false,
            count: 0,
        })
    }

    /// `GET /short/{id}`: cache-first resolve with single-flight
    /// coalescing on a cold read.
    pub async fn resolve(&self, id: &str) -> CoreResult<String> {
        self.cache.resolve(id).await
    }

    /// `GET /fraud/{id}`.
    pub async fn fraud_status(&self, id: &str) -> CoreResult<bool> {
        self.store.get_fraud(id).await
    }

    /// `GET /view/{id}`: prefer the live KV counter over the durable
    /// snapshot, per spec.md §5.
    pub async fn view_count(&self, id: &str) -> CoreResult<i64> {
        self.counter.read(id).await
    }

    pub fn lifecycle(&self) -> Arc<LifecycleCoordinator> {
        self.lifecycle.clone()
    }
}
