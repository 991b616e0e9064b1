//! In-process embedded KV adapter implementing [`KvStore`].
//!
//! Stands in for the distributed KV cache spec.md §1 scopes out of the
//! core, and doubles as the "alternative allocation backend" the
//! `KV_STORAGE_PATH` env var (spec.md §6) anticipates — without external
//! setup the service still runs correctly, just without cross-process
//! cache sharing. Sharded behind a fixed number of `parking_lot::Mutex`es
//! rather than one global lock, the same "shard the lock, not the data
//! structure" idiom the id generator uses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use shortener_core::collaborators::{KvScanPage, KvStore};
use shortener_core::error::CoreResult;

const SHARD_COUNT: usize = 16;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now < t).unwrap_or(true)
    }
}

pub struct MemoryKv {
    shards: Vec<Mutex<HashMap<String, Entry>>>,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, Entry>> {
        let mut hash: u64 = 1469598103934665603; // FNV-1a offset basis
        for b in key.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        &self.shards[(hash as usize) % self.shards.len()]
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let shard = self.shard_for(key);
        let mut guard = shard.lock();
        let now = Instant::now();
        if let Some(entry) = guard.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
            guard.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.shard_for(key).lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.shard_for(key).lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> CoreResult<i64> {
        let shard = self.shard_for(key);
        let mut guard = shard.lock();
        let now = Instant::now();
        let current = guard
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        guard.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn scan(&self, prefix: &str, cursor: u64, page_size: usize) -> CoreResult<KvScanPage> {
        // The in-process adapter has no real per-shard cursor semantics to
        // preserve across calls (the whole keyspace fits in memory), so it
        // walks shards in order, paging within a shard by sorted key order.
        // The opaque cursor packs both positions: high 32 bits are the
        // shard index to resume from, low 32 bits are how many of that
        // shard's matching keys have already been returned — without the
        // in-shard offset, a shard with more live keys than one page would
        // be abandoned after its first page instead of resumed.
        let now = Instant::now();
        let mut keys = Vec::new();
        let start_shard = (cursor >> 32) as usize;
        let mut start_offset = (cursor & 0xFFFF_FFFF) as usize;

        for (i, shard) in self.shards.iter().enumerate().skip(start_shard) {
            let guard = shard.lock();
            let mut shard_keys: Vec<&String> = guard
                .iter()
                .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
                .map(|(k, _)| k)
                .collect();
            shard_keys.sort();

            for (offset, k) in shard_keys.iter().enumerate().skip(start_offset) {
                keys.push((*k).clone());
                if keys.len() >= page_size {
                    let next_cursor = if offset + 1 < shard_keys.len() {
                        ((i as u64) << 32) | (offset as u64 + 1)
                    } else if i + 1 < self.shards.len() {
                        (i as u64 + 1) << 32
                    } else {
                        0
                    };
                    return Ok(KvScanPage { keys, next_cursor });
                }
            }
            start_offset = 0;
        }
        Ok(KvScanPage {
            keys,
            next_cursor: 0,
        })
    }
}
