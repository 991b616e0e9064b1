//! `rusqlite`-backed implementation of [`DurableStore`], [`AllocationLedgerStore`],
//! and [`JobQueue`] against the schema in spec.md §6.
//!
//! Modeled on `router-api::module::database::Database`: a single
//! connection wrapped in `Arc<Mutex<Connection>>`, with blocking calls
//! moved onto a blocking thread via `tokio::task::spawn_blocking` so the
//! actix worker threads are never parked on SQLite I/O.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use shortener_core::collaborators::{AllocationLedgerStore, DurableStore, JobQueue};
use shortener_core::error::{CoreError, CoreResult};
use shortener_core::model::{PendingCreate, ShortUrl, ViewSnapshotItem};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating parent directories and the schema if needed) the
    /// database at `dsn`, which for this adapter is a filesystem path.
    pub fn open(dsn: &str) -> CoreResult<Self> {
        if let Some(dir) = Path::new(dsn).parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| CoreError::StoreUnavailable(format!("create dir {dir:?}: {e}")))?;
        }
        let conn = Connection::open(dsn)
            .map_err(|e| CoreError::StoreUnavailable(format!("open {dsn}: {e}")))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> CoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS urls (
                id TEXT PRIMARY KEY,
                original_url TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
                fraud INTEGER NOT NULL DEFAULT 0,
                count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_urls_id ON urls(id);

            CREATE TABLE IF NOT EXISTS ids (
                id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );",
        )
        .map_err(|e| CoreError::StoreUnavailable(format!("schema init: {e}")))?;
        Ok(())
    }

    async fn run_blocking<T, F>(&self, f: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| CoreError::StoreUnavailable(format!("blocking task panicked: {e}")))?
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
            e => CoreError::StoreUnavailable(e.to_string()),
        })
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn create(&self, id: &str, origin: &str) -> CoreResult<ShortUrl> {
        let id = id.to_string();
        let origin = origin.to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO urls (id, original_url) VALUES (?1, ?2)",
                params![id, origin],
            )?;
            conn.query_row(
                "SELECT created_at FROM urls WHERE id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .map(|created_at| ShortUrl {
                id: id.clone(),
                origin: origin.clone(),
                created_at: created_at
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
                fraud: false,
                count: 0,
            })
        })
        .await
    }

    async fn create_batch(&self, pending: &[PendingCreate]) -> CoreResult<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let pending = pending.to_vec();
        self.run_blocking(move |conn| {
            let mut values = Vec::with_capacity(pending.len());
            let mut query = String::from("INSERT INTO urls (id, original_url) VALUES ");
            for (i, _) in pending.iter().enumerate() {
                if i > 0 {
                    query.push(',');
                }
                query.push_str(&format!("(?{}, ?{})", i * 2 + 1, i * 2 + 2));
            }
            for p in &pending {
                values.push(p.id.clone());
                values.push(p.url.clone());
            }
            let params: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            conn.execute(&query, params.as_slice())?;
            Ok(())
        })
        .await
    }

    async fn get_origin(&self, id: &str) -> CoreResult<String> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT original_url FROM urls WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn get_fraud(&self, id: &str) -> CoreResult<bool> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT fraud FROM urls WHERE id = ?1",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v != 0)
        })
        .await
    }

    async fn get_count(&self, id: &str) -> CoreResult<i64> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT count FROM urls WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn apply_view_snapshot(&self, items: &[ViewSnapshotItem]) -> CoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let items = items.to_vec();
        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt =
                    tx.prepare_cached("UPDATE urls SET count = ?1 WHERE id = ?2")?;
                for item in &items {
                    stmt.execute(params![item.value, item.id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn mark_fraud(&self, id: &str) -> CoreResult<()> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            let affected = conn.execute(
                "UPDATE urls SET fraud = 1 WHERE id = ?1",
                params![id],
            )?;
            if affected != 1 {
                log::warn!("mark_fraud affected {affected} rows for id {id}, expected exactly 1");
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl AllocationLedgerStore for SqliteStore {
    async fn record_last_used(&self, v: u64) -> CoreResult<()> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO ids (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
                params![v as i64],
            )?;
            // Defensive read verifying the row exists, per spec.md §6's
            // `add_last_used_id` job description.
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ids WHERE id = ?1",
                params![v as i64],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            Ok(())
        })
        .await
    }

    async fn max_used_in_range(&self, lo: u64, hi: u64) -> CoreResult<u64> {
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(id), 0) FROM ids WHERE id >= ?1 AND id < ?2",
                params![lo as i64, hi as i64],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v as u64)
        })
        .await
    }
}

#[async_trait]
impl JobQueue for SqliteStore {
    async fn enqueue_add_last_used_id(&self, last_used_id: u64) -> CoreResult<()> {
        let payload = serde_json::json!({ "LastUsedID": last_used_id }).to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO jobs (kind, payload) VALUES ('add_last_used_id', ?1)",
                params![payload],
            )?;
            Ok(())
        })
        .await
    }

    async fn enqueue_batch_create(&self, pending: Vec<PendingCreate>) -> CoreResult<()> {
        let ids: Vec<&str> = pending.iter().map(|p| p.id.as_str()).collect();
        let origins: Vec<&str> = pending.iter().map(|p| p.url.as_str()).collect();
        let payload = serde_json::json!({ "IDs": ids, "OriginURLs": origins }).to_string();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO jobs (kind, payload) VALUES ('batch_create', ?1)",
                params![payload],
            )?;
            Ok(())
        })
        .await
    }
}

impl SqliteStore {
    /// Run every `pending` job once, used by the lifecycle's retry ticker.
    /// `batch_create` jobs are replayed against `urls`; `add_last_used_id`
    /// jobs against `ids`. Successful jobs are deleted.
    pub async fn run_due_jobs(&self) -> CoreResult<usize> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, payload FROM jobs WHERE status = 'pending' ORDER BY id",
            )?;
            let jobs: Vec<(i64, String, String)> = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .filter_map(|r| r.ok())
                .collect();
            drop(stmt);

            let mut completed = 0usize;
            for (job_id, kind, payload) in jobs {
                let ok = match kind.as_str() {
                    "add_last_used_id" => run_add_last_used_id(conn, &payload).is_ok(),
                    "batch_create" => run_batch_create(conn, &payload).is_ok(),
                    _ => false,
                };
                if ok {
                    conn.execute("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
                    completed += 1;
                } else {
                    conn.execute(
                        "UPDATE jobs SET attempts = attempts + 1 WHERE id = ?1",
                        params![job_id],
                    )?;
                }
            }
            Ok(completed)
        })
        .await
        .or_else(|e| match e {
            CoreError::NotFound => Ok(0),
            e => Err(e),
        })
    }
}

fn run_add_last_used_id(conn: &Connection, payload: &str) -> CoreResult<()> {
    let parsed: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| CoreError::StoreUnavailable(format!("bad job payload: {e}")))?;
    let id = parsed["LastUsedID"]
        .as_u64()
        .ok_or_else(|| CoreError::StoreUnavailable("missing LastUsedID".into()))?;
    conn.execute(
        "INSERT INTO ids (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
        params![id as i64],
    )
    .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
    Ok(())
}

fn run_batch_create(conn: &Connection, payload: &str) -> CoreResult<()> {
    let parsed: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| CoreError::StoreUnavailable(format!("bad job payload: {e}")))?;
    let ids = parsed["IDs"]
        .as_array()
        .ok_or_else(|| CoreError::StoreUnavailable("missing IDs".into()))?;
    let urls = parsed["OriginURLs"]
        .as_array()
        .ok_or_else(|| CoreError::StoreUnavailable("missing OriginURLs".into()))?;
    for (id, url) in ids.iter().zip(urls.iter()) {
        let (Some(id), Some(url)) = (id.as_str(), url.as_str()) else {
            continue;
        };
        conn.execute(
            "INSERT OR IGNORE INTO urls (id, original_url) VALUES (?1, ?2)",
            params![id, url],
        )
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!(
            "shortener-test-{}-{}.sqlite3",
            std::process::id(),
            rand::random::<u64>()
        ));
        SqliteStore::open(path.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn create_then_get_origin_round_trips() {
        let store = temp_store();
        store.create("abc", "https://example.com/x").await.unwrap();
        assert_eq!(
            store.get_origin("abc").await.unwrap(),
            "https://example.com/x"
        );
    }

    #[tokio::test]
    async fn get_origin_of_unknown_id_is_not_found() {
        let store = temp_store();
        let err = store.get_origin("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[tokio::test]
    async fn ledger_watermark_is_idempotent_and_scannable() {
        let store = temp_store();
        store.record_last_used(100).await.unwrap();
        store.record_last_used(100).await.unwrap();
        assert_eq!(store.max_used_in_range(0, 200).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn view_snapshot_apply_is_idempotent() {
        let store = temp_store();
        store.create("a", "https://example.com").await.unwrap();
        let items = vec![ViewSnapshotItem { id: "a".into(), value: 7 }];
        store.apply_view_snapshot(&items).await.unwrap();
        store.apply_view_snapshot(&items).await.unwrap();
        assert_eq!(store.get_count("a").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn mark_fraud_affects_exactly_one_row() {
        let store = temp_store();
        store.create("a", "https://example.com").await.unwrap();
        assert!(!store.get_fraud("a").await.unwrap());
        store.mark_fraud("a").await.unwrap();
        assert!(store.get_fraud("a").await.unwrap());
    }
}
