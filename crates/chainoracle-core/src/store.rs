//! Request state store — race-free lifecycle status per request key.
//!
//! Every mutation for one `(chain, request, epoch)` runs under that key's
//! partition lock, re-reads the committed record, checks the caller's
//! expected status (optimistic concurrency) and the phase graph, persists,
//! and only then updates the cached copy.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::OracleError;
use crate::partition::KeyedPartitions;
use crate::persist::RequestStore;
use crate::types::{CrossChainRequestRecord, OracleRequest, RequestKey, RequestStatus, StatusView};

/// Result of an idempotent create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A record already existed; nothing was written.
    AlreadyExists(RequestStatus),
}

pub struct RequestStateStore {
    backend: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    requests: KeyedPartitions<RequestKey, OracleRequest>,
    cross_chain: KeyedPartitions<String, CrossChainRequestRecord>,
}

impl RequestStateStore {
    pub fn new(backend: Arc<dyn RequestStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            requests: KeyedPartitions::new(),
            cross_chain: KeyedPartitions::new(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ─── Oracle requests ──────────────────────────────────────────────────────

    /// Insert `request` unless a record for its key exists.
    pub async fn create_if_absent(&self, request: OracleRequest) -> Result<CreateOutcome, OracleError> {
        let slot = self.requests.slot(&request.key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_request(&request.key).await?;
        }
        if let Some(existing) = guard.as_ref() {
            return Ok(CreateOutcome::AlreadyExists(existing.status));
        }

        self.backend.save_request(&request).await?;
        tracing::debug!(request = %request.key, kind = %request.request_type, "request created");
        *guard = Some(request);
        Ok(CreateOutcome::Created)
    }

    /// Full committed record.
    pub async fn get(&self, key: &RequestKey) -> Result<Option<OracleRequest>, OracleError> {
        let slot = self.requests.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_request(key).await?;
        }
        Ok(guard.clone())
    }

    /// Status query for external callers. No side effects.
    pub async fn get_status(&self, key: &RequestKey) -> Result<Option<StatusView>, OracleError> {
        Ok(self.backend.load_request(key).await?.map(|r| r.view()))
    }

    /// Status of the highest epoch of `(chain_id, request_id)`.
    pub async fn latest_status(
        &self,
        chain_id: &str,
        request_id: &str,
    ) -> Result<Option<StatusView>, OracleError> {
        Ok(self
            .backend
            .load_latest_request(chain_id, request_id)
            .await?
            .map(|r| r.view()))
    }

    /// Non-archived requests currently in `status`.
    pub async fn requests_in_status(&self, status: RequestStatus) -> Result<Vec<OracleRequest>, OracleError> {
        self.backend.requests_in_status(status).await
    }

    /// Move `key` from `expected` to `next`.
    pub async fn try_transition(
        &self,
        key: &RequestKey,
        expected: RequestStatus,
        next: RequestStatus,
    ) -> Result<OracleRequest, OracleError> {
        self.transition_with(key, expected, next, |_| {}).await
    }

    /// Move `key` from `expected` to `next`, applying `update` to the record in
    /// the same write. Retry bookkeeping is reset.
    pub async fn transition_with<F>(
        &self,
        key: &RequestKey,
        expected: RequestStatus,
        next: RequestStatus,
        update: F,
    ) -> Result<OracleRequest, OracleError>
    where
        F: FnOnce(&mut OracleRequest) + Send,
    {
        let slot = self.requests.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_request(key).await?;
        }
        let current = guard
            .as_ref()
            .ok_or_else(|| OracleError::NotFound(format!("request {key}")))?;

        if current.status != expected || !current.status.can_transition_to(next) {
            return Err(OracleError::InvalidTransition {
                key: key.to_string(),
                expected,
                actual: current.status,
                next,
            });
        }

        let mut updated = current.clone();
        update(&mut updated);
        updated.status = next;
        updated.last_modified_at = self.clock.now_ms();
        updated.attempts = 0;
        updated.next_attempt_at = None;

        self.backend.save_request(&updated).await?;
        tracing::debug!(request = %key, from = %expected, to = %next, "status transition");
        *guard = Some(updated.clone());
        Ok(updated)
    }

    /// Mutate the record without changing its status; fails with
    /// [`OracleError::InvalidTransition`] if it is no longer in `expected`.
    pub async fn update_in_status<F>(
        &self,
        key: &RequestKey,
        expected: RequestStatus,
        update: F,
    ) -> Result<OracleRequest, OracleError>
    where
        F: FnOnce(&mut OracleRequest) + Send,
    {
        let slot = self.requests.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_request(key).await?;
        }
        let current = guard
            .as_ref()
            .ok_or_else(|| OracleError::NotFound(format!("request {key}")))?;
        if current.status != expected {
            return Err(OracleError::InvalidTransition {
                key: key.to_string(),
                expected,
                actual: current.status,
                next: expected,
            });
        }

        let mut updated = current.clone();
        update(&mut updated);
        updated.status = expected;

        self.backend.save_request(&updated).await?;
        *guard = Some(updated.clone());
        Ok(updated)
    }

    /// Durably count one retry attempt in `expected` and schedule the next.
    pub async fn record_attempt(
        &self,
        key: &RequestKey,
        expected: RequestStatus,
        next_attempt_at: i64,
    ) -> Result<OracleRequest, OracleError> {
        self.update_in_status(key, expected, |r| {
            r.attempts += 1;
            r.next_attempt_at = Some(next_attempt_at);
        })
        .await
    }

    /// Retire a terminal request from the active set. Its status stays
    /// queryable.
    pub async fn archive(&self, key: &RequestKey) -> Result<(), OracleError> {
        let slot = self.requests.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_request(key).await?;
        }
        let current = guard
            .as_ref()
            .ok_or_else(|| OracleError::NotFound(format!("request {key}")))?;
        if !current.status.is_terminal() {
            return Err(OracleError::InvalidTransition {
                key: key.to_string(),
                expected: current.status,
                actual: current.status,
                next: current.status,
            });
        }
        if current.is_archived() {
            return Ok(());
        }

        let mut archived = current.clone();
        archived.archived_at = Some(self.clock.now_ms());
        self.backend.save_request(&archived).await?;
        *guard = Some(archived);
        drop(guard);

        // terminal records are never written again
        self.requests.evict(key);
        tracing::debug!(request = %key, "request archived");
        Ok(())
    }

    /// Number of keys with a live partition slot.
    pub fn active_partitions(&self) -> usize {
        self.requests.len()
    }

    // ─── Cross-chain records ──────────────────────────────────────────────────

    /// Insert `record` unless one with its message id exists.
    pub async fn create_cross_chain(&self, record: CrossChainRequestRecord) -> Result<CreateOutcome, OracleError> {
        let slot = self.cross_chain.slot(&record.message_id);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_cross_chain(&record.message_id).await?;
        }
        if let Some(existing) = guard.as_ref() {
            return Ok(CreateOutcome::AlreadyExists(existing.status));
        }
        self.backend.save_cross_chain(&record).await?;
        *guard = Some(record);
        Ok(CreateOutcome::Created)
    }

    /// Status query for a cross-chain record. No side effects.
    pub async fn get_cross_chain(&self, message_id: &str) -> Result<Option<CrossChainRequestRecord>, OracleError> {
        self.backend.load_cross_chain(message_id).await
    }

    pub async fn try_transition_cross_chain(
        &self,
        message_id: &str,
        expected: RequestStatus,
        next: RequestStatus,
    ) -> Result<CrossChainRequestRecord, OracleError> {
        let slot = self.cross_chain.slot(&message_id.to_string());
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.backend.load_cross_chain(message_id).await?;
        }
        let current = guard
            .as_ref()
            .ok_or_else(|| OracleError::NotFound(format!("cross-chain message {message_id}")))?;

        if current.status != expected || !current.status.can_transition_to(next) {
            return Err(OracleError::InvalidTransition {
                key: message_id.to_string(),
                expected,
                actual: current.status,
                next,
            });
        }

        let mut updated = current.clone();
        updated.status = next;
        updated.last_modify_time = self.clock.now_ms();
        self.backend.save_cross_chain(&updated).await?;
        *guard = Some(updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persist::MemoryStore;
    use crate::types::JobPayload;

    fn setup() -> (RequestStateStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = RequestStateStore::new(Arc::new(MemoryStore::new()), clock.clone());
        (store, clock)
    }

    fn pending(request_id: &str) -> OracleRequest {
        OracleRequest::pending(
            RequestKey::new("ethereum", request_id, 0),
            0,
            JobPayload::DataFeeds {
                feed_ids: vec!["ETH/USD".into()],
            },
            "0xabc",
            100,
            1_000,
        )
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (store, _) = setup();
        assert_eq!(store.create_if_absent(pending("r1")).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            store.create_if_absent(pending("r1")).await.unwrap(),
            CreateOutcome::AlreadyExists(RequestStatus::Pending)
        );
    }

    #[tokio::test]
    async fn transition_updates_status_and_timestamp() {
        let (store, clock) = setup();
        let key = RequestKey::new("ethereum", "r1", 0);
        store.create_if_absent(pending("r1")).await.unwrap();

        clock.set(2_000);
        store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Observing)
            .await
            .unwrap();

        let view = store.get_status(&key).await.unwrap().unwrap();
        assert_eq!(view.status, RequestStatus::Observing);
        assert_eq!(view.last_modified_at, 2_000);
    }

    #[tokio::test]
    async fn stale_expected_fails_without_mutation() {
        let (store, _) = setup();
        let key = RequestKey::new("ethereum", "r1", 0);
        store.create_if_absent(pending("r1")).await.unwrap();
        store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Observing)
            .await
            .unwrap();

        let before = store.get(&key).await.unwrap().unwrap();
        let err = store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Observing)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::InvalidTransition {
                actual: RequestStatus::Observing,
                ..
            }
        ));
        assert_eq!(store.get(&key).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn off_graph_transition_rejected() {
        let (store, _) = setup();
        let key = RequestKey::new("ethereum", "r1", 0);
        store.create_if_absent(pending("r1")).await.unwrap();
        assert!(store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Transmitted)
            .await
            .is_err());
        store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Expired)
            .await
            .unwrap();
        // terminal
        assert!(store
            .try_transition(&key, RequestStatus::Expired, RequestStatus::Cancelled)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn concurrent_transitions_single_winner() {
        let (store, _) = setup();
        let store = Arc::new(store);
        let key = RequestKey::new("ethereum", "r1", 0);
        store.create_if_absent(pending("r1")).await.unwrap();

        let mut handles = vec![];
        for _ in 0..16 {
            let s = store.clone();
            let k = key.clone();
            handles.push(tokio::spawn(async move {
                s.try_transition(&k, RequestStatus::Pending, RequestStatus::Observing)
                    .await
                    .is_ok()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn attempts_reset_on_transition() {
        let (store, _) = setup();
        let key = RequestKey::new("ethereum", "r1", 0);
        store.create_if_absent(pending("r1")).await.unwrap();

        let r = store.record_attempt(&key, RequestStatus::Pending, 5_000).await.unwrap();
        assert_eq!(r.attempts, 1);
        assert_eq!(r.next_attempt_at, Some(5_000));

        let r = store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Observing)
            .await
            .unwrap();
        assert_eq!(r.attempts, 0);
        assert_eq!(r.next_attempt_at, None);
    }

    #[tokio::test]
    async fn archive_requires_terminal_and_keeps_status() {
        let (store, _) = setup();
        let key = RequestKey::new("ethereum", "r1", 0);
        store.create_if_absent(pending("r1")).await.unwrap();
        assert!(store.archive(&key).await.is_err());

        store
            .try_transition(&key, RequestStatus::Pending, RequestStatus::Cancelled)
            .await
            .unwrap();
        store.archive(&key).await.unwrap();

        assert!(store.requests_in_status(RequestStatus::Cancelled).await.unwrap().is_empty());
        assert_eq!(
            store.latest_status("ethereum", "r1").await.unwrap().unwrap().status,
            RequestStatus::Cancelled
        );
        assert_eq!(store.active_partitions(), 0);
    }

    #[tokio::test]
    async fn cross_chain_lifecycle() {
        let (store, clock) = setup();
        let record = CrossChainRequestRecord {
            message_id: "msg-1".into(),
            source_chain_id: "ethereum".into(),
            target_chain_id: "polygon".into(),
            transaction_id: "0xbridge".into(),
            status: RequestStatus::Pending,
            last_modify_time: 1_000,
        };
        assert_eq!(store.create_cross_chain(record.clone()).await.unwrap(), CreateOutcome::Created);
        assert!(matches!(
            store.create_cross_chain(record).await.unwrap(),
            CreateOutcome::AlreadyExists(RequestStatus::Pending)
        ));

        clock.set(3_000);
        let updated = store
            .try_transition_cross_chain("msg-1", RequestStatus::Pending, RequestStatus::Observing)
            .await
            .unwrap();
        assert_eq!(updated.last_modify_time, 3_000);
        assert!(store
            .try_transition_cross_chain("msg-1", RequestStatus::Pending, RequestStatus::Observing)
            .await
            .is_err());
        assert_eq!(
            store.get_cross_chain("msg-1").await.unwrap().unwrap().status,
            RequestStatus::Observing
        );
    }
}
