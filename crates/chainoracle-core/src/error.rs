//! Error types for the oracle pipeline.

use thiserror::Error;

use crate::types::RequestStatus;

/// Errors that can occur while driving oracle requests.
#[derive(Debug, Error)]
pub enum OracleError {
    /// A chain RPC call failed in a way that is worth retrying.
    #[error("transient chain RPC error: {0}")]
    TransientChainRpc(String),

    /// A partial signature failed verification or contradicts the session.
    #[error("invalid partial signature from signer {signer_index}: {reason}")]
    InvalidPartialSignature { signer_index: u32, reason: String },

    /// A cursor update that does not move the chain forward.
    #[error("stale cursor for {chain_id}: current {current}, attempted {attempted}")]
    StaleCursor {
        chain_id: String,
        current: u64,
        attempted: u64,
    },

    /// Optimistic-concurrency failure or a transition outside the phase graph.
    #[error("invalid transition for {key}: expected {expected}, found {actual}, wanted {next}")]
    InvalidTransition {
        key: String,
        expected: RequestStatus,
        actual: RequestStatus,
        next: RequestStatus,
    },

    #[error("request {key} expired")]
    RequestExpired { key: String },

    /// Unusable configuration; aborts startup.
    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    /// A signature session is not in the state the operation requires.
    #[error("signature session {key} is {state}, cannot {operation}")]
    SessionState {
        key: String,
        state: String,
        operation: &'static str,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Handing a pipeline message to the scheduler failed.
    #[error("hand-off failed: {0}")]
    Handoff(String),

    #[error("{0}")]
    Other(String),
}

impl OracleError {
    /// Returns `true` if the error should be retried under the phase budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientChainRpc(_) | Self::Storage(_))
    }

    /// Returns `true` for conditions that are absorbed where they are detected
    /// (duplicate delivery, concurrent writers, bad peer input).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::StaleCursor { .. }
                | Self::InvalidTransition { .. }
                | Self::InvalidPartialSignature { .. }
        )
    }

    /// Returns `true` if the error must abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(OracleError::TransientChainRpc("timeout".into()).is_transient());
        assert!(!OracleError::FatalConfig("x".into()).is_transient());
        assert!(OracleError::FatalConfig("x".into()).is_fatal());
        assert!(OracleError::StaleCursor {
            chain_id: "ethereum".into(),
            current: 10,
            attempted: 9,
        }
        .is_expected());
    }
}
