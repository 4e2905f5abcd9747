//! Durable-store traits and the in-memory backend.
//!
//! Implementations include [`MemoryStore`] (tests, ephemeral nodes) and
//! `chainoracle_storage::SqliteStorage`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::cursor::ChainCursor;
use crate::error::OracleError;
use crate::session::{SessionState, SignatureSession};
use crate::types::{CrossChainRequestRecord, OracleRequest, RequestKey, RequestStatus, SessionKey};

/// Persists per-chain cursors.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, chain_id: &str) -> Result<Option<ChainCursor>, OracleError>;

    /// Upsert a cursor. Monotonicity is enforced by the tracker, not here.
    async fn save_cursor(&self, cursor: &ChainCursor) -> Result<(), OracleError>;
}

/// Persists oracle requests and cross-chain records.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn load_request(&self, key: &RequestKey) -> Result<Option<OracleRequest>, OracleError>;

    /// Highest-epoch record for `(chain_id, request_id)`.
    async fn load_latest_request(
        &self,
        chain_id: &str,
        request_id: &str,
    ) -> Result<Option<OracleRequest>, OracleError>;

    /// Upsert a request.
    async fn save_request(&self, request: &OracleRequest) -> Result<(), OracleError>;

    /// Non-archived requests currently in `status`.
    async fn requests_in_status(&self, status: RequestStatus) -> Result<Vec<OracleRequest>, OracleError>;

    async fn load_cross_chain(&self, message_id: &str) -> Result<Option<CrossChainRequestRecord>, OracleError>;

    async fn save_cross_chain(&self, record: &CrossChainRequestRecord) -> Result<(), OracleError>;
}

/// Persists signature sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, key: &SessionKey) -> Result<Option<SignatureSession>, OracleError>;

    async fn save_session(&self, session: &SignatureSession) -> Result<(), OracleError>;

    async fn delete_session(&self, key: &SessionKey) -> Result<(), OracleError>;

    /// Collecting sessions not written since `updated_before` (ms).
    async fn stale_sessions(&self, updated_before: i64) -> Result<Vec<SignatureSession>, OracleError>;
}

// ─── In-memory store ──────────────────────────────────────────────────────────

/// In-memory implementation of every store trait. All data is lost when the
/// process exits.
#[derive(Default)]
pub struct MemoryStore {
    cursors: Mutex<HashMap<String, ChainCursor>>,
    requests: Mutex<HashMap<RequestKey, OracleRequest>>,
    cross_chain: Mutex<HashMap<String, CrossChainRequestRecord>>,
    sessions: Mutex<HashMap<SessionKey, SignatureSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests, archived included.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self, chain_id: &str) -> Result<Option<ChainCursor>, OracleError> {
        Ok(self
            .cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned())
    }

    async fn save_cursor(&self, cursor: &ChainCursor) -> Result<(), OracleError> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cursor.chain_id.clone(), cursor.clone());
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn load_request(&self, key: &RequestKey) -> Result<Option<OracleRequest>, OracleError> {
        Ok(self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn load_latest_request(
        &self,
        chain_id: &str,
        request_id: &str,
    ) -> Result<Option<OracleRequest>, OracleError> {
        Ok(self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.key.chain_id == chain_id && r.key.request_id == request_id)
            .max_by_key(|r| r.key.epoch)
            .cloned())
    }

    async fn save_request(&self, request: &OracleRequest) -> Result<(), OracleError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.key.clone(), request.clone());
        Ok(())
    }

    async fn requests_in_status(&self, status: RequestStatus) -> Result<Vec<OracleRequest>, OracleError> {
        let mut found: Vec<_> = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.status == status && !r.is_archived())
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn load_cross_chain(&self, message_id: &str) -> Result<Option<CrossChainRequestRecord>, OracleError> {
        Ok(self
            .cross_chain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_id)
            .cloned())
    }

    async fn save_cross_chain(&self, record: &CrossChainRequestRecord) -> Result<(), OracleError> {
        self.cross_chain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.message_id.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_session(&self, key: &SessionKey) -> Result<Option<SignatureSession>, OracleError> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save_session(&self, session: &SignatureSession) -> Result<(), OracleError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.key.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), OracleError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn stale_sessions(&self, updated_before: i64) -> Result<Vec<SignatureSession>, OracleError> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.state == SessionState::Collecting && s.updated_at < updated_before)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobPayload;

    fn request(epoch: u64, status: RequestStatus) -> OracleRequest {
        let mut r = OracleRequest::pending(
            RequestKey::new("ethereum", "r1", epoch),
            0,
            JobPayload::DataFeeds { feed_ids: vec![] },
            "0xtx",
            1,
            0,
        );
        r.status = status;
        r
    }

    #[tokio::test]
    async fn latest_request_picks_highest_epoch() {
        let store = MemoryStore::new();
        store.save_request(&request(0, RequestStatus::Expired)).await.unwrap();
        store.save_request(&request(2, RequestStatus::Pending)).await.unwrap();
        store.save_request(&request(1, RequestStatus::Expired)).await.unwrap();

        let latest = store.load_latest_request("ethereum", "r1").await.unwrap().unwrap();
        assert_eq!(latest.key.epoch, 2);
        assert!(store.load_latest_request("ethereum", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_query_skips_archived() {
        let store = MemoryStore::new();
        let mut archived = request(0, RequestStatus::Transmitted);
        archived.archived_at = Some(10);
        store.save_request(&archived).await.unwrap();
        store.save_request(&request(1, RequestStatus::Transmitted)).await.unwrap();

        let found = store.requests_in_status(RequestStatus::Transmitted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key.epoch, 1);
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load_cursor("ethereum").await.unwrap().is_none());
        store
            .save_cursor(&ChainCursor::new("ethereum", 100, 0))
            .await
            .unwrap();
        assert_eq!(
            store.load_cursor("ethereum").await.unwrap().unwrap().consumed_block_height,
            100
        );
    }
}
