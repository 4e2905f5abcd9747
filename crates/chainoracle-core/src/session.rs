//! Signature session state — the data half of the aggregator.
//!
//! Verification and combination live in `chainoracle-signer`; this module
//! only enforces the session's bookkeeping invariants:
//! - one accepted partial per signer index,
//! - one payload hash per session, pinned only by the local node,
//! - monotonic state: `Collecting → Reached → Finalized`, `Collecting → Abandoned`.
//!
//! Partials that arrive before the local node has built its report are
//! parked in `pending`, one per signer. Binding the payload promotes the
//! matching ones and drops the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::SessionKey;

/// A participant's share of the report signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    /// 1-based signer index.
    pub signer_index: u32,
    pub payload_hash: [u8; 32],
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Collecting,
    Reached,
    Finalized,
    Abandoned,
}

impl SessionState {
    /// No further partials change a closed session.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Finalized | Self::Abandoned)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collecting => write!(f, "collecting"),
            Self::Reached => write!(f, "reached"),
            Self::Finalized => write!(f, "finalized"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Result of offering a partial signature to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Parked until the session is bound to a payload.
    Buffered,
    /// Same signer, same payload hash — nothing changed.
    Duplicate,
    /// Session is finalized or abandoned — nothing changed.
    Closed,
}

/// Collects partial signatures for one `(chain, request, epoch)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSession {
    pub key: SessionKey,
    pub threshold: u32,
    pub participants: u32,
    pub payload_hash: Option<[u8; 32]>,
    pub partials: BTreeMap<u32, PartialSignature>,
    /// Early partials, not yet checked against a payload hash.
    #[serde(default)]
    pub pending: BTreeMap<u32, PartialSignature>,
    pub aggregate: Option<Vec<u8>>,
    pub state: SessionState,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SignatureSession {
    pub fn new(key: SessionKey, threshold: u32, participants: u32, now: i64) -> Self {
        Self {
            key,
            threshold,
            participants,
            payload_hash: None,
            partials: BTreeMap::new(),
            pending: BTreeMap::new(),
            aggregate: None,
            state: SessionState::Collecting,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pin the payload hash if none is set yet and promote matching pending
    /// partials. Returns `false` on conflict.
    pub fn bind_payload(&mut self, payload_hash: [u8; 32]) -> bool {
        match self.payload_hash {
            None => {
                self.payload_hash = Some(payload_hash);
                for (index, partial) in std::mem::take(&mut self.pending) {
                    if partial.payload_hash == payload_hash {
                        self.partials.entry(index).or_insert(partial);
                    }
                }
                true
            }
            Some(existing) => existing == payload_hash,
        }
    }

    /// Pending partials that would be dropped by binding `payload_hash`.
    pub fn pending_mismatches(&self, payload_hash: &[u8; 32]) -> usize {
        self.pending
            .values()
            .filter(|p| &p.payload_hash != payload_hash)
            .count()
    }

    /// Same signer, same payload hash already held (accepted or pending).
    pub fn contains(&self, partial: &PartialSignature) -> bool {
        self.partials
            .get(&partial.signer_index)
            .or_else(|| self.pending.get(&partial.signer_index))
            .is_some_and(|p| p.payload_hash == partial.payload_hash)
    }

    /// Reason a partial must be rejected before cryptographic checks, if any.
    pub fn admission_error(&self, partial: &PartialSignature) -> Option<String> {
        if partial.signer_index == 0 || partial.signer_index > self.participants {
            return Some(format!(
                "signer index outside 1..={}",
                self.participants
            ));
        }
        if let Some(expected) = self.payload_hash {
            if expected != partial.payload_hash {
                return Some("payload hash does not match session".into());
            }
        }
        let held = self
            .partials
            .get(&partial.signer_index)
            .or_else(|| self.pending.get(&partial.signer_index));
        if let Some(existing) = held {
            if existing.payload_hash != partial.payload_hash {
                return Some("signer already submitted a different payload hash".into());
            }
        }
        None
    }

    /// Record an already-verified partial. An unbound session parks it.
    pub fn insert(&mut self, partial: PartialSignature, now: i64) -> InsertOutcome {
        if self.state.is_closed() {
            return InsertOutcome::Closed;
        }
        if self.contains(&partial) {
            return InsertOutcome::Duplicate;
        }
        let outcome = if self.payload_hash.is_some() {
            self.partials.insert(partial.signer_index, partial);
            InsertOutcome::Inserted
        } else {
            self.pending.insert(partial.signer_index, partial);
            InsertOutcome::Buffered
        };
        self.updated_at = now;
        outcome
    }

    pub fn has_threshold(&self) -> bool {
        self.partials.len() as u64 >= self.threshold as u64
    }

    /// The `threshold` lowest signer indices with their partials, ascending.
    pub fn combination_set(&self) -> Vec<&PartialSignature> {
        self.partials
            .values()
            .take(self.threshold as usize)
            .collect()
    }

    /// `Collecting → Reached` with the combined signature.
    pub fn mark_reached(&mut self, aggregate: Vec<u8>, now: i64) -> bool {
        if self.state != SessionState::Collecting {
            return false;
        }
        self.aggregate = Some(aggregate);
        self.state = SessionState::Reached;
        self.updated_at = now;
        true
    }

    /// `Reached → Finalized`; idempotent once finalized.
    pub fn mark_finalized(&mut self, now: i64) -> bool {
        match self.state {
            SessionState::Reached => {
                self.state = SessionState::Finalized;
                self.updated_at = now;
                true
            }
            SessionState::Finalized => true,
            SessionState::Collecting | SessionState::Abandoned => false,
        }
    }

    /// `Collecting → Abandoned`. Returns `true` if the state changed.
    pub fn mark_abandoned(&mut self, now: i64) -> bool {
        if self.state != SessionState::Collecting {
            return false;
        }
        self.state = SessionState::Abandoned;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(index: u32, hash: u8) -> PartialSignature {
        PartialSignature {
            signer_index: index,
            payload_hash: [hash; 32],
            signature: vec![index as u8],
        }
    }

    fn session() -> SignatureSession {
        SignatureSession::new(SessionKey::new("ethereum", "r", 0), 2, 3, 0)
    }

    fn bound(hash: u8) -> SignatureSession {
        let mut s = session();
        assert!(s.bind_payload([hash; 32]));
        s
    }

    #[test]
    fn duplicate_partial_is_noop() {
        let mut s = bound(7);
        assert_eq!(s.insert(partial(1, 7), 1), InsertOutcome::Inserted);
        let before = s.clone();
        assert_eq!(s.insert(partial(1, 7), 2), InsertOutcome::Duplicate);
        assert_eq!(s, before);
    }

    #[test]
    fn conflicting_hash_rejected_at_admission() {
        let mut s = bound(7);
        s.insert(partial(1, 7), 1);
        assert!(s.admission_error(&partial(1, 8)).is_some());
        assert!(s.admission_error(&partial(2, 8)).is_some());
        assert!(s.admission_error(&partial(2, 7)).is_none());
        assert!(s.admission_error(&partial(0, 7)).is_some());
        assert!(s.admission_error(&partial(4, 7)).is_some());
    }

    #[test]
    fn unbound_session_parks_partials_without_binding() {
        let mut s = session();
        assert_eq!(s.insert(partial(3, 0xee), 1), InsertOutcome::Buffered);
        assert_eq!(s.insert(partial(3, 0xee), 2), InsertOutcome::Duplicate);
        assert_eq!(s.payload_hash, None);
        assert!(s.partials.is_empty());

        // a different payload from another signer is still admissible
        assert!(s.admission_error(&partial(2, 7)).is_none());
        // but one signer cannot park two payloads
        assert!(s.admission_error(&partial(3, 7)).is_some());
    }

    #[test]
    fn binding_promotes_matching_and_drops_the_rest() {
        let mut s = session();
        s.insert(partial(3, 0xee), 1);
        s.insert(partial(2, 7), 1);
        assert_eq!(s.pending_mismatches(&[7; 32]), 1);

        assert!(s.bind_payload([7; 32]));
        assert!(s.pending.is_empty());
        assert_eq!(s.partials.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert!(!s.bind_payload([0xee; 32]));

        // the faulty signer may now submit the real payload
        assert!(s.admission_error(&partial(3, 7)).is_none());
        assert_eq!(s.insert(partial(3, 7), 2), InsertOutcome::Inserted);
        assert!(s.has_threshold());
    }

    #[test]
    fn states_are_monotonic() {
        let mut s = bound(0);
        assert!(!s.mark_finalized(1));
        assert!(s.mark_reached(vec![1], 1));
        assert!(!s.mark_abandoned(2));
        assert!(!s.mark_reached(vec![2], 2));
        assert!(s.mark_finalized(3));
        assert!(s.mark_finalized(4));
        assert_eq!(s.aggregate, Some(vec![1]));
        assert_eq!(s.insert(partial(3, 0), 5), InsertOutcome::Closed);
    }

    #[test]
    fn combination_set_uses_lowest_indices() {
        let mut s = bound(1);
        s.insert(partial(3, 1), 1);
        s.insert(partial(1, 1), 1);
        s.insert(partial(2, 1), 1);
        let indices: Vec<u32> = s.combination_set().iter().map(|p| p.signer_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
