//! SQLite storage backend for ChainOracle.
//!
//! Persists chain cursors, oracle requests, cross-chain records and signature
//! sessions to a single SQLite file. Records are stored as JSON bodies next to
//! the key and status columns they are queried by.
//!
//! # Usage
//! ```rust,no_run
//! use chainoracle_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./oracle.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainoracle_core::{
    ChainCursor, CrossChainRequestRecord, CursorStore, OracleError, OracleRequest, RequestKey,
    RequestStatus, RequestStore, SessionKey, SessionState, SessionStore, SignatureSession,
};

fn storage_err(e: impl std::fmt::Display) -> OracleError {
    OracleError::Storage(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, OracleError> {
    serde_json::to_string(value).map_err(storage_err)
}

fn from_json<T: DeserializeOwned>(body: &str) -> Result<T, OracleError> {
    serde_json::from_str(body).map_err(storage_err)
}

/// SQLite integers are signed 64-bit; larger values are refused, not wrapped.
fn to_sql_int(value: u64, column: &str) -> Result<i64, OracleError> {
    i64::try_from(value)
        .map_err(|_| OracleError::Storage(format!("{column} {value} exceeds the SQLite integer range")))
}

fn from_sql_int(value: i64, column: &str) -> Result<u64, OracleError> {
    u64::try_from(value).map_err(|_| OracleError::Storage(format!("negative {column} {value} in database")))
}

fn cursor_from_row(row: &SqliteRow) -> Result<ChainCursor, OracleError> {
    Ok(ChainCursor {
        chain_id: row.get("chain_id"),
        consumed_block_height: from_sql_int(row.get("consumed_block_height"), "consumed_block_height")?,
        updated_at: row.get("updated_at"),
    })
}

/// SQLite-backed implementation of every ChainOracle store trait.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./oracle.db"`) or a full
    /// SQLite URL (`"sqlite:./oracle.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, OracleError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let storage = Self { pool };
        storage.init_schema(true).await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `sqlite::memory:` gets its own database, so the
    /// pool is pinned to a single connection. All data is lost when the pool
    /// is dropped.
    pub async fn in_memory() -> Result<Self, OracleError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema(false).await?;
        Ok(storage)
    }

    /// Create tables and, for file databases, enable WAL mode.
    async fn init_schema(&self, wal: bool) -> Result<(), OracleError> {
        if wal {
            sqlx::query("PRAGMA journal_mode=WAL;")
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cursors (
                chain_id              TEXT    PRIMARY KEY,
                consumed_block_height INTEGER NOT NULL,
                updated_at            INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS requests (
                chain_id    TEXT    NOT NULL,
                request_id  TEXT    NOT NULL,
                epoch       INTEGER NOT NULL,
                status      TEXT    NOT NULL,
                archived    INTEGER NOT NULL DEFAULT 0,
                body        TEXT    NOT NULL,
                PRIMARY KEY (chain_id, request_id, epoch)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_status ON requests (status, archived);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cross_chain_requests (
                message_id  TEXT PRIMARY KEY,
                status      TEXT NOT NULL,
                body        TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS signature_sessions (
                chain_id    TEXT    NOT NULL,
                request_id  TEXT    NOT NULL,
                epoch       INTEGER NOT NULL,
                state       TEXT    NOT NULL,
                updated_at  INTEGER NOT NULL,
                body        TEXT    NOT NULL,
                PRIMARY KEY (chain_id, request_id, epoch)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_state ON signature_sessions (state, updated_at);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Number of stored requests, archived included.
    pub async fn request_count(&self) -> Result<u64, OracleError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM requests")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        from_sql_int(row.get("cnt"), "count")
    }

    /// Every chain cursor, ordered by chain id.
    pub async fn cursors(&self) -> Result<Vec<ChainCursor>, OracleError> {
        let rows = sqlx::query(
            "SELECT chain_id, consumed_block_height, updated_at FROM cursors ORDER BY chain_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(cursor_from_row).collect()
    }
}

// ─── CursorStore ──────────────────────────────────────────────────────────────

#[async_trait]
impl CursorStore for SqliteStorage {
    async fn load_cursor(&self, chain_id: &str) -> Result<Option<ChainCursor>, OracleError> {
        let row = sqlx::query(
            "SELECT chain_id, consumed_block_height, updated_at FROM cursors WHERE chain_id = ?",
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.as_ref().map(cursor_from_row).transpose()
    }

    async fn save_cursor(&self, cursor: &ChainCursor) -> Result<(), OracleError> {
        sqlx::query(
            "INSERT INTO cursors (chain_id, consumed_block_height, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(chain_id) DO UPDATE SET
               consumed_block_height = excluded.consumed_block_height,
               updated_at = excluded.updated_at",
        )
        .bind(&cursor.chain_id)
        .bind(to_sql_int(cursor.consumed_block_height, "consumed_block_height")?)
        .bind(cursor.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(chain = %cursor.chain_id, height = cursor.consumed_block_height, "cursor saved");
        Ok(())
    }
}

// ─── RequestStore ─────────────────────────────────────────────────────────────

#[async_trait]
impl RequestStore for SqliteStorage {
    async fn load_request(&self, key: &RequestKey) -> Result<Option<OracleRequest>, OracleError> {
        let row = sqlx::query(
            "SELECT body FROM requests WHERE chain_id = ? AND request_id = ? AND epoch = ?",
        )
        .bind(&key.chain_id)
        .bind(&key.request_id)
        .bind(to_sql_int(key.epoch, "epoch")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| from_json(&r.get::<String, _>("body"))).transpose()
    }

    async fn load_latest_request(
        &self,
        chain_id: &str,
        request_id: &str,
    ) -> Result<Option<OracleRequest>, OracleError> {
        let row = sqlx::query(
            "SELECT body FROM requests WHERE chain_id = ? AND request_id = ?
             ORDER BY epoch DESC LIMIT 1",
        )
        .bind(chain_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| from_json(&r.get::<String, _>("body"))).transpose()
    }

    async fn save_request(&self, request: &OracleRequest) -> Result<(), OracleError> {
        let body = to_json(request)?;
        sqlx::query(
            "INSERT OR REPLACE INTO requests (chain_id, request_id, epoch, status, archived, body)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.key.chain_id)
        .bind(&request.key.request_id)
        .bind(to_sql_int(request.key.epoch, "epoch")?)
        .bind(request.status.as_str())
        .bind(i64::from(request.is_archived()))
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(request = %request.key, status = %request.status, "request saved");
        Ok(())
    }

    async fn requests_in_status(&self, status: RequestStatus) -> Result<Vec<OracleRequest>, OracleError> {
        let rows = sqlx::query(
            "SELECT body FROM requests WHERE status = ? AND archived = 0
             ORDER BY chain_id, request_id, epoch",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|r| from_json(&r.get::<String, _>("body")))
            .collect()
    }

    async fn load_cross_chain(&self, message_id: &str) -> Result<Option<CrossChainRequestRecord>, OracleError> {
        let row = sqlx::query("SELECT body FROM cross_chain_requests WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| from_json(&r.get::<String, _>("body"))).transpose()
    }

    async fn save_cross_chain(&self, record: &CrossChainRequestRecord) -> Result<(), OracleError> {
        let body = to_json(record)?;
        sqlx::query(
            "INSERT OR REPLACE INTO cross_chain_requests (message_id, status, body) VALUES (?, ?, ?)",
        )
        .bind(&record.message_id)
        .bind(record.status.as_str())
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

// ─── SessionStore ─────────────────────────────────────────────────────────────

#[async_trait]
impl SessionStore for SqliteStorage {
    async fn load_session(&self, key: &SessionKey) -> Result<Option<SignatureSession>, OracleError> {
        let row = sqlx::query(
            "SELECT body FROM signature_sessions WHERE chain_id = ? AND request_id = ? AND epoch = ?",
        )
        .bind(&key.chain_id)
        .bind(&key.request_id)
        .bind(to_sql_int(key.epoch, "epoch")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| from_json(&r.get::<String, _>("body"))).transpose()
    }

    async fn save_session(&self, session: &SignatureSession) -> Result<(), OracleError> {
        let body = to_json(session)?;
        sqlx::query(
            "INSERT OR REPLACE INTO signature_sessions (chain_id, request_id, epoch, state, updated_at, body)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.key.chain_id)
        .bind(&session.key.request_id)
        .bind(to_sql_int(session.key.epoch, "epoch")?)
        .bind(session.state.to_string())
        .bind(session.updated_at)
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), OracleError> {
        sqlx::query(
            "DELETE FROM signature_sessions WHERE chain_id = ? AND request_id = ? AND epoch = ?",
        )
        .bind(&key.chain_id)
        .bind(&key.request_id)
        .bind(to_sql_int(key.epoch, "epoch")?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn stale_sessions(&self, updated_before: i64) -> Result<Vec<SignatureSession>, OracleError> {
        let rows = sqlx::query(
            "SELECT body FROM signature_sessions WHERE state = ? AND updated_at < ?",
        )
        .bind(SessionState::Collecting.to_string())
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|r| from_json(&r.get::<String, _>("body")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainoracle_core::{JobPayload, PartialSignature};

    fn request(id: &str, epoch: u64, status: RequestStatus) -> OracleRequest {
        let mut r = OracleRequest::pending(
            RequestKey::new("ethereum", id, epoch),
            3,
            JobPayload::Automation {
                upkeep_id: "42".into(),
                perform_data: "0xdead".into(),
            },
            "0xsource",
            101,
            1_000,
        );
        r.status = status;
        r
    }

    #[tokio::test]
    async fn cursor_upsert() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.load_cursor("ethereum").await.unwrap().is_none());

        store.save_cursor(&ChainCursor::new("ethereum", 100, 1)).await.unwrap();
        store.save_cursor(&ChainCursor::new("ethereum", 105, 2)).await.unwrap();
        store.save_cursor(&ChainCursor::new("polygon", 7, 3)).await.unwrap();

        let c = store.load_cursor("ethereum").await.unwrap().unwrap();
        assert_eq!(c.consumed_block_height, 105);
        assert_eq!(c.updated_at, 2);
        assert_eq!(store.cursors().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn request_roundtrip_and_status_index() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut built = request("r1", 0, RequestStatus::Committing);
        built.report = Some(b"report".to_vec());
        built.report_hash = Some([7u8; 32]);
        store.save_request(&built).await.unwrap();
        store.save_request(&request("r2", 0, RequestStatus::Pending)).await.unwrap();
        let mut archived = request("r3", 0, RequestStatus::Committing);
        archived.status = RequestStatus::Expired;
        archived.archived_at = Some(9);
        store.save_request(&archived).await.unwrap();

        let loaded = store.load_request(&built.key).await.unwrap().unwrap();
        assert_eq!(loaded, built);

        let committing = store.requests_in_status(RequestStatus::Committing).await.unwrap();
        assert_eq!(committing.len(), 1);
        assert!(store.requests_in_status(RequestStatus::Expired).await.unwrap().is_empty());
        assert_eq!(store.request_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn latest_epoch_wins() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save_request(&request("r1", 0, RequestStatus::Expired)).await.unwrap();
        store.save_request(&request("r1", 1, RequestStatus::Observing)).await.unwrap();

        let latest = store.load_latest_request("ethereum", "r1").await.unwrap().unwrap();
        assert_eq!(latest.key.epoch, 1);
        assert_eq!(latest.status, RequestStatus::Observing);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let key = SessionKey::new("ethereum", "r1", 0);
        let mut session = SignatureSession::new(key.clone(), 2, 3, 10);
        session.bind_payload([1u8; 32]);
        session.insert(
            PartialSignature {
                signer_index: 2,
                payload_hash: [1u8; 32],
                signature: vec![1, 2, 3],
            },
            11,
        );
        store.save_session(&session).await.unwrap();

        let loaded = store.load_session(&key).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.state, SessionState::Collecting);

        store.delete_session(&key).await.unwrap();
        assert!(store.load_session(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_sessions_filter_by_state_and_age() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let old = SignatureSession::new(SessionKey::new("ethereum", "old", 0), 2, 3, 10);
        let fresh = SignatureSession::new(SessionKey::new("ethereum", "fresh", 0), 2, 3, 500);
        let mut closed = SignatureSession::new(SessionKey::new("ethereum", "closed", 0), 2, 3, 10);
        closed.mark_abandoned(10);
        for s in [&old, &fresh, &closed] {
            store.save_session(s).await.unwrap();
        }

        let stale = store.stale_sessions(100).await.unwrap();
        assert_eq!(stale, vec![old]);
    }

    #[tokio::test]
    async fn out_of_range_integers_are_storage_errors() {
        let store = SqliteStorage::in_memory().await.unwrap();

        let err = store
            .save_request(&request("r1", u64::MAX, RequestStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Storage(_)));
        assert_eq!(store.request_count().await.unwrap(), 0);

        let err = store
            .save_cursor(&ChainCursor::new("ethereum", i64::MAX as u64 + 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Storage(_)));

        // a corrupted row is reported, not wrapped to a huge height
        sqlx::query("INSERT INTO cursors (chain_id, consumed_block_height, updated_at) VALUES ('bad', -1, 0)")
            .execute(&store.pool)
            .await
            .unwrap();
        assert!(matches!(
            store.load_cursor("bad").await.unwrap_err(),
            OracleError::Storage(_)
        ));
    }

    #[tokio::test]
    async fn cross_chain_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let record = CrossChainRequestRecord {
            message_id: "msg-1".into(),
            source_chain_id: "ethereum".into(),
            target_chain_id: "arbitrum".into(),
            transaction_id: "0xabc".into(),
            status: RequestStatus::Pending,
            last_modify_time: 5,
        };
        store.save_cross_chain(&record).await.unwrap();
        assert_eq!(store.load_cross_chain("msg-1").await.unwrap(), Some(record));
        assert!(store.load_cross_chain("msg-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let path = std::env::temp_dir().join(format!(
            "chainoracle-{}-{}.db",
            std::process::id(),
            unique_suffix()
        ));
        let path_str = path.to_string_lossy().to_string();

        {
            let store = SqliteStorage::open(&path_str).await.unwrap();
            store.save_cursor(&ChainCursor::new("ethereum", 42, 0)).await.unwrap();
            store.pool.close().await;
        }
        let store = SqliteStorage::open(&path_str).await.unwrap();
        assert_eq!(
            store.load_cursor("ethereum").await.unwrap().unwrap().consumed_block_height,
            42
        );
        store.pool.close().await;

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
        }
    }

    fn unique_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    }
}
