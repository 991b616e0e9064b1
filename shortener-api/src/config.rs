//! Environment-driven configuration (spec.md §6).
//!
//! Mirrors `router-api::module::fs_watch`'s `env::var(...).unwrap_or_else`
//! idiom rather than the `mini-config` crate, since these are deployment
//! knobs read once at startup, not in-process mutable settings.

use std::env;

/// `URL_DSN` — durable store connection string. Defaults to a local
/// SQLite file so the service is runnable without external setup.
pub fn url_dsn() -> String {
    env::var("URL_DSN").unwrap_or_else(|_| "/tmp/shortener/url.sqlite3".to_string())
}

/// `RIVER_DSN` — job-queue store connection string; defaults to sharing
/// `URL_DSN`'s database, per spec.md §6 ("may equal URL_DSN").
pub fn river_dsn() -> String {
    env::var("RIVER_DSN").unwrap_or_else(|_| url_dsn())
}

/// `REDIS_URLS` — comma-separated KV shard addresses. Absent in the local
/// default deployment, which falls back to the embedded `MemoryKv`.
pub fn redis_urls() -> Vec<String> {
    env::var("REDIS_URLS")
        .ok()
        .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default()
}

/// `RABBITMQ_URL` — message-bus URL; absent falls back to the in-process
/// `LogBus`.
pub fn rabbitmq_url() -> Option<String> {
    env::var("RABBITMQ_URL").ok()
}

/// `KV_STORAGE_PATH` — local embedded-KV file for the alternative
/// allocation backend. Only consulted if the in-memory KV needs a
/// persistence hint; the in-process adapter otherwise ignores it.
pub fn kv_storage_path() -> Option<String> {
    env::var("KV_STORAGE_PATH").ok()
}

/// `RATE_LIMIT` — `"ON"` to enable per-IP token-bucket rate limiting.
pub fn rate_limit_enabled() -> bool {
    env::var("RATE_LIMIT")
        .map(|v| v.eq_ignore_ascii_case("on"))
        .unwrap_or(false)
}

/// Number of live shards the id generator holds; spec.md §4.3 default is
/// 12-16.
pub fn shard_count() -> usize {
    env::var("SHARD_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(shortener_core::idgen::DEFAULT_SHARD_COUNT)
}
