//! Multi-signature aggregator — collects partial signatures per session
//! until the threshold is met, then combines them exactly once.

use std::sync::Arc;

use chainoracle_core::{
    Clock, InsertOutcome, KeyedPartitions, OracleError, PartialSignature, PipelineMetrics,
    SessionKey, SessionState, SessionStore, SignatureSession,
};

use crate::threshold::PublicKeySet;

/// What happened to a submitted partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored against the bound payload. A session that already reached its
    /// threshold keeps late partials but does not combine again.
    Accepted { collected: usize },
    /// Parked until the local node opens the session with its own payload.
    Buffered { pending: usize },
    /// Same signer, same payload: no-op.
    Duplicate,
    /// This partial completed the threshold. Reported exactly once per session.
    Reached { aggregate: Vec<u8> },
    /// The session is finalized or abandoned.
    Ignored(SessionState),
}

pub struct MultiSignatureAggregator {
    keys: Arc<PublicKeySet>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn PipelineMetrics>,
    partitions: KeyedPartitions<SessionKey, SignatureSession>,
}

impl MultiSignatureAggregator {
    pub fn new(
        keys: Arc<PublicKeySet>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn PipelineMetrics>,
    ) -> Self {
        Self {
            keys,
            store,
            clock,
            metrics,
            partitions: KeyedPartitions::new(),
        }
    }

    pub fn keys(&self) -> &PublicKeySet {
        &self.keys
    }

    fn fresh_session(&self, key: &SessionKey) -> SignatureSession {
        SignatureSession::new(
            key.clone(),
            self.keys.threshold(),
            self.keys.participants(),
            self.clock.now_ms(),
        )
    }

    /// Combine and mark `Reached` if a collecting session holds enough
    /// partials. Returns the aggregate when this call reached the threshold.
    fn combine_if_ready(
        &self,
        session: &mut SignatureSession,
        now: i64,
    ) -> Result<Option<Vec<u8>>, OracleError> {
        if session.state != SessionState::Collecting || !session.has_threshold() {
            return Ok(None);
        }
        let aggregate = self
            .keys
            .combine(
                session
                    .combination_set()
                    .into_iter()
                    .map(|p| (p.signer_index, p.signature.as_slice())),
            )
            .map_err(|e| OracleError::Other(format!("combine failed for {}: {e}", session.key)))?;
        session.mark_reached(aggregate.clone(), now);
        Ok(Some(aggregate))
    }

    /// Open (or join) the session for `key`, bound to `payload_hash`. Only
    /// the local node binds a session: early peer partials for the same
    /// payload are promoted here and the rest are dropped.
    pub async fn open_session(
        &self,
        key: &SessionKey,
        payload_hash: [u8; 32],
    ) -> Result<SignatureSession, OracleError> {
        let slot = self.partitions.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.store.load_session(key).await?;
        }

        let mut session = guard.clone().unwrap_or_else(|| self.fresh_session(key));
        let was_bound = session.payload_hash.is_some();
        let dropped = session.pending_mismatches(&payload_hash);
        if !session.bind_payload(payload_hash) {
            return Err(OracleError::SessionState {
                key: key.to_string(),
                state: "bound to another payload".into(),
                operation: "open",
            });
        }
        if guard.is_some() && was_bound {
            return Ok(session);
        }

        let now = self.clock.now_ms();
        session.updated_at = now;
        let reached = self.combine_if_ready(&mut session, now)?;
        self.store.save_session(&session).await?;
        *guard = Some(session.clone());

        tracing::debug!(session = %key, threshold = session.threshold, collected = session.partials.len(), "signature session opened");
        if dropped > 0 {
            tracing::warn!(session = %key, dropped, "early partials for another payload dropped");
        }
        if reached.is_some() {
            self.metrics.record_threshold_reached(&key.chain_id);
            tracing::info!(session = %key, "signature threshold reached from early partials");
        }
        Ok(session)
    }

    /// Admit one partial. Invalid partials fail with
    /// [`OracleError::InvalidPartialSignature`] and leave the session
    /// untouched. The session is persisted before this returns.
    pub async fn submit_partial(
        &self,
        key: &SessionKey,
        partial: PartialSignature,
    ) -> Result<SubmitOutcome, OracleError> {
        let slot = self.partitions.slot(key);
        let (result, untracked) = {
            let mut guard = slot.lock().await;
            let result = self.admit(key, &mut guard, partial).await;
            (result, guard.is_none())
        };
        if untracked {
            // rejected before anything was stored
            drop(slot);
            self.partitions.evict_idle(key);
        }
        result
    }

    async fn admit(
        &self,
        key: &SessionKey,
        cached: &mut Option<SignatureSession>,
        partial: PartialSignature,
    ) -> Result<SubmitOutcome, OracleError> {
        if cached.is_none() {
            *cached = self.store.load_session(key).await?;
        }

        let mut session = cached.clone().unwrap_or_else(|| self.fresh_session(key));
        if session.state.is_closed() {
            tracing::debug!(session = %key, signer = partial.signer_index, state = %session.state, "partial ignored");
            return Ok(SubmitOutcome::Ignored(session.state));
        }

        let signer_index = partial.signer_index;
        if let Some(reason) = session.admission_error(&partial) {
            return Err(OracleError::InvalidPartialSignature { signer_index, reason });
        }
        if session.contains(&partial) {
            return Ok(SubmitOutcome::Duplicate);
        }
        self.keys
            .verify_share(signer_index, &partial.payload_hash, &partial.signature)
            .map_err(|e| OracleError::InvalidPartialSignature {
                signer_index,
                reason: e.to_string(),
            })?;

        let now = self.clock.now_ms();
        let outcome = match session.insert(partial, now) {
            InsertOutcome::Inserted => match self.combine_if_ready(&mut session, now)? {
                Some(aggregate) => SubmitOutcome::Reached { aggregate },
                None => SubmitOutcome::Accepted {
                    collected: session.partials.len(),
                },
            },
            InsertOutcome::Buffered => SubmitOutcome::Buffered {
                pending: session.pending.len(),
            },
            InsertOutcome::Duplicate => return Ok(SubmitOutcome::Duplicate),
            InsertOutcome::Closed => return Ok(SubmitOutcome::Ignored(session.state)),
        };

        self.store.save_session(&session).await?;
        *cached = Some(session);

        match &outcome {
            SubmitOutcome::Reached { .. } => {
                self.metrics.record_threshold_reached(&key.chain_id);
                tracing::info!(session = %key, signer = signer_index, "signature threshold reached");
            }
            SubmitOutcome::Accepted { collected } => {
                tracing::debug!(session = %key, signer = signer_index, collected, "partial accepted");
            }
            SubmitOutcome::Buffered { pending } => {
                tracing::debug!(session = %key, signer = signer_index, pending, "partial buffered before local report");
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// `Reached → Finalized` once the report is on chain. Idempotent.
    pub async fn finalize(&self, key: &SessionKey) -> Result<SignatureSession, OracleError> {
        let slot = self.partitions.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.store.load_session(key).await?;
        }
        let mut session = guard
            .clone()
            .ok_or_else(|| OracleError::NotFound(format!("signature session {key}")))?;

        if session.state == SessionState::Finalized {
            return Ok(session);
        }
        if !session.mark_finalized(self.clock.now_ms()) {
            return Err(OracleError::SessionState {
                key: key.to_string(),
                state: session.state.to_string(),
                operation: "finalize",
            });
        }
        self.store.save_session(&session).await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Close a collecting session without an aggregate. Returns the session's
    /// resulting state: a session that already reached its threshold stays
    /// `Reached`. A missing session is recorded as abandoned so late partials
    /// are ignored.
    pub async fn abandon(&self, key: &SessionKey) -> Result<SessionState, OracleError> {
        let slot = self.partitions.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.store.load_session(key).await?;
        }
        let mut session = guard.clone().unwrap_or_else(|| self.fresh_session(key));
        if session.mark_abandoned(self.clock.now_ms()) {
            self.store.save_session(&session).await?;
            tracing::warn!(session = %key, collected = session.partials.len(), "signature session abandoned");
        }
        let state = session.state;
        *guard = Some(session);
        Ok(state)
    }

    /// Current committed session, if any.
    pub async fn session(&self, key: &SessionKey) -> Result<Option<SignatureSession>, OracleError> {
        let slot = self.partitions.slot(key);
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.store.load_session(key).await?;
        }
        Ok(guard.clone())
    }

    /// Drop a closed session from storage and memory.
    pub async fn prune(&self, key: &SessionKey) -> Result<(), OracleError> {
        {
            let slot = self.partitions.slot(key);
            let _guard = slot.lock().await;
            self.store.delete_session(key).await?;
        }
        self.partitions.evict(key);
        Ok(())
    }

    /// Delete sessions that only ever held buffered peer partials and have
    /// been idle since `cutoff` (ms). Returns how many were removed.
    pub async fn prune_orphans(&self, cutoff: i64) -> Result<usize, OracleError> {
        let mut pruned = 0;
        for stale in self.store.stale_sessions(cutoff).await? {
            if stale.payload_hash.is_some() {
                continue;
            }
            let key = stale.key;
            let slot = self.partitions.slot(&key);
            {
                let mut guard = slot.lock().await;
                if guard.is_none() {
                    *guard = self.store.load_session(&key).await?;
                }
                // re-check under the lock: the local node may have opened it
                let orphaned = guard
                    .as_ref()
                    .is_some_and(|s| s.payload_hash.is_none() && s.updated_at < cutoff);
                if !orphaned {
                    continue;
                }
                self.store.delete_session(&key).await?;
                *guard = None;
            }
            drop(slot);
            self.partitions.evict_idle(&key);
            tracing::debug!(session = %key, "orphaned signature session pruned");
            pruned += 1;
        }
        Ok(pruned)
    }

    /// Cached session slots; used to check that pruning releases memory.
    pub fn tracked_sessions(&self) -> usize {
        self.partitions.len()
    }
}
