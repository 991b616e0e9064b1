//! Lifecycle coordinator (spec.md §2.8): on graceful shutdown, flushes all
//! shard watermarks, the pending create batch, and the counter snapshot.
//!
//! It also owns the periodic tickers for the write batcher and the view
//! counter's snapshot flusher while the process is up — both are
//! long-lived tasks driven by a ticker plus a cancellation signal, per
//! spec.md §9, the same shape as `router-api`'s `memory_log::spawner`
//! background thread.
//!
//! The batcher ticker here is only the time-trigger backstop: `WriteBatcher::create`
//! already re-evaluates its own flush condition inline after every push, so
//! the size trigger fires immediately under write load without waiting for
//! this 5s cadence. This ticker still matters for a batch that stalls below
//! the size trigger with no further creates arriving to re-check it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::batcher::{WriteBatcher, FLUSH_TIME_TRIGGER};
use crate::collaborators::AllocationLedgerStore;
use crate::counter::ViewCounter;
use crate::error::CoreResult;
use crate::idgen::ShardedIdGenerator;

/// Interval between view-counter snapshot passes, per spec.md §4.6 (`P`).
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

pub struct LifecycleCoordinator {
    idgen: ShardedIdGenerator,
    ledger: Arc<dyn AllocationLedgerStore>,
    batcher: Arc<WriteBatcher>,
    counter: Arc<ViewCounter>,
    shutdown_tx: watch::Sender<bool>,
}

impl LifecycleCoordinator {
    pub fn new(
        idgen: ShardedIdGenerator,
        ledger: Arc<dyn AllocationLedgerStore>,
        batcher: Arc<WriteBatcher>,
        counter: Arc<ViewCounter>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            idgen,
            ledger,
            batcher,
            counter,
            shutdown_tx,
        }
    }

    /// Spawn the batcher-flush and view-snapshot tickers. Both stop as
    /// soon as [`LifecycleCoordinator::shutdown`] is called.
    pub fn spawn_background_tasks(&self) {
        self.spawn_batcher_ticker();
        self.spawn_snapshot_ticker();
    }

    fn spawn_batcher_ticker(&self) {
        let batcher = self.batcher.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_TIME_TRIGGER);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = batcher.tick().await {
                            log::error!("write batcher tick failed: {e}");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    fn spawn_snapshot_ticker(&self) {
        let counter = self.counter.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match counter.flush_snapshot().await {
                            Ok(n) if n > 0 => log::info!("view snapshot flushed {n} keys"),
                            Ok(_) => {}
                            Err(e) => log::error!("view snapshot flush failed: {e}"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    /// Run the graceful-shutdown sequence: flush shard watermarks, the
    /// pending create batch, and the counter snapshot, then stop the
    /// background tickers.
    pub async fn shutdown(&self) -> CoreResult<()> {
        log::info!("lifecycle coordinator: beginning graceful shutdown");

        for watermark in self.idgen.snapshot() {
            if let Err(e) = self.ledger.record_last_used(watermark).await {
                log::error!("failed to persist shard watermark {watermark} on shutdown: {e}");
            }
        }

        if let Err(e) = self.batcher.flush_all().await {
            log::error!("failed to flush pending creates on shutdown: {e}");
        }

        if let Err(e) = self.counter.flush_snapshot().await {
            log::error!("failed to flush view snapshot on shutdown: {e}");
        }

        let _ = self.shutdown_tx.send(true);
        log::info!("lifecycle coordinator: shutdown complete");
        Ok(())
    }
}
