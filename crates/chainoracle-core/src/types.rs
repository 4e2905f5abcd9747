//! Shared types for the oracle pipeline.

use serde::{Deserialize, Serialize};

// ─── RequestKey ───────────────────────────────────────────────────────────────

/// Identity of one reporting instance: `(chain, request, epoch)`.
///
/// All status transitions and signature submissions for one key are
/// serialized; different keys never contend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub chain_id: String,
    pub request_id: String,
    pub epoch: u64,
}

impl RequestKey {
    pub fn new(chain_id: impl Into<String>, request_id: impl Into<String>, epoch: u64) -> Self {
        Self {
            chain_id: chain_id.into(),
            request_id: request_id.into(),
            epoch,
        }
    }

    /// The same request one epoch later.
    pub fn next_epoch(&self) -> Self {
        Self {
            epoch: self.epoch + 1,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.chain_id, self.request_id, self.epoch)
    }
}

/// Signature sessions share the request identity.
pub type SessionKey = RequestKey;

// ─── RequestStatus ────────────────────────────────────────────────────────────

/// Lifecycle status of an oracle request (and of a cross-chain record).
///
/// ```text
/// Pending → Observing → Committing → ReportBuilt → Transmitting → Transmitted
///    └──────────┴────────────┴────────────┴──────────────┴──→ Cancelled | Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Observing,
    Committing,
    ReportBuilt,
    Transmitting,
    Transmitted,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        Self::Pending,
        Self::Observing,
        Self::Committing,
        Self::ReportBuilt,
        Self::Transmitting,
        Self::Transmitted,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transmitted | Self::Cancelled | Self::Expired)
    }

    /// The forward successor in the phase graph, if any.
    pub fn successor(&self) -> Option<RequestStatus> {
        match self {
            Self::Pending => Some(Self::Observing),
            Self::Observing => Some(Self::Committing),
            Self::Committing => Some(Self::ReportBuilt),
            Self::ReportBuilt => Some(Self::Transmitting),
            Self::Transmitting => Some(Self::Transmitted),
            Self::Transmitted | Self::Cancelled | Self::Expired => None,
        }
    }

    /// Returns `true` if `next` is an edge of the phase graph from `self`.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Cancelled | Self::Expired) || self.successor() == Some(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Observing => "observing",
            Self::Committing => "committing",
            Self::ReportBuilt => "report_built",
            Self::Transmitting => "transmitting",
            Self::Transmitted => "transmitted",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown request status: {s}"))
    }
}

// ─── Request payloads ─────────────────────────────────────────────────────────

/// Kind of oracle job a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    DataFeeds,
    Vrf,
    Automation,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataFeeds => write!(f, "data-feeds"),
            Self::Vrf => write!(f, "vrf"),
            Self::Automation => write!(f, "automation"),
        }
    }
}

/// Type-specific payload carried by a trigger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    DataFeeds {
        /// Feed identifiers to observe (e.g. `"ETH/USD"`).
        feed_ids: Vec<String>,
    },
    Vrf {
        /// Hex-encoded request seed.
        seed: String,
        num_words: u32,
    },
    Automation {
        upkeep_id: String,
        /// Hex-encoded perform data.
        perform_data: String,
    },
}

impl JobPayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::DataFeeds { .. } => RequestType::DataFeeds,
            Self::Vrf { .. } => RequestType::Vrf,
            Self::Automation { .. } => RequestType::Automation,
        }
    }
}

// ─── OracleRequest ────────────────────────────────────────────────────────────

/// The durable record of one request at one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub key: RequestKey,
    pub round_id: u64,
    pub request_type: RequestType,
    pub payload: JobPayload,
    pub status: RequestStatus,
    /// Transaction that emitted the trigger event.
    pub source_tx: String,
    /// Height of the trigger event.
    pub height: u64,
    /// Unix millis.
    pub created_at: i64,
    /// Unix millis of the last status change.
    pub last_modified_at: i64,
    /// Retry attempts spent in the current status.
    pub attempts: u32,
    /// Earliest unix millis for the next retry in the current status.
    pub next_attempt_at: Option<i64>,
    /// Report payload built in the observation-commit phase.
    pub report: Option<Vec<u8>>,
    /// SHA-256 of `report`; the message every signer signs.
    pub report_hash: Option<[u8; 32]>,
    /// Transmit transaction id, once submitted.
    pub tx_id: Option<String>,
    /// Set once the request left the active set after its retention window.
    pub archived_at: Option<i64>,
}

impl OracleRequest {
    /// A fresh `Pending` request.
    pub fn pending(
        key: RequestKey,
        round_id: u64,
        payload: JobPayload,
        source_tx: impl Into<String>,
        height: u64,
        now: i64,
    ) -> Self {
        Self {
            key,
            round_id,
            request_type: payload.request_type(),
            payload,
            status: RequestStatus::Pending,
            source_tx: source_tx.into(),
            height,
            created_at: now,
            last_modified_at: now,
            attempts: 0,
            next_attempt_at: None,
            report: None,
            report_hash: None,
            tx_id: None,
            archived_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Read-only projection for status queries.
    pub fn view(&self) -> StatusView {
        StatusView {
            epoch: self.key.epoch,
            status: self.status,
            last_modified_at: self.last_modified_at,
        }
    }
}

/// What external status queries see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub epoch: u64,
    pub status: RequestStatus,
    pub last_modified_at: i64,
}

// ─── CrossChainRequestRecord ──────────────────────────────────────────────────

/// A bridging request between two chains; same status machine as
/// [`OracleRequest`], keyed by message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainRequestRecord {
    pub message_id: String,
    pub source_chain_id: String,
    pub target_chain_id: String,
    pub transaction_id: String,
    pub status: RequestStatus,
    /// Unix millis.
    pub last_modify_time: i64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_follow_phase_graph() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Observing));
        assert!(RequestStatus::Transmitting.can_transition_to(RequestStatus::Transmitted));
        // no skipping, no going back
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Committing));
        assert!(!RequestStatus::ReportBuilt.can_transition_to(RequestStatus::Observing));
    }

    #[test]
    fn cancel_and_expire_from_any_non_terminal() {
        for status in RequestStatus::ALL {
            let allowed = !status.is_terminal();
            assert_eq!(status.can_transition_to(RequestStatus::Cancelled), allowed);
            assert_eq!(status.can_transition_to(RequestStatus::Expired), allowed);
        }
    }

    #[test]
    fn status_string_roundtrip() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn payload_determines_request_type() {
        let payload = JobPayload::Vrf {
            seed: "0x01".into(),
            num_words: 2,
        };
        let req = OracleRequest::pending(RequestKey::new("ethereum", "r1", 0), 0, payload, "0xtx", 10, 5);
        assert_eq!(req.request_type, RequestType::Vrf);
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.view().last_modified_at, 5);
    }

    #[test]
    fn key_display_and_next_epoch() {
        let key = RequestKey::new("polygon", "abc", 3);
        assert_eq!(key.to_string(), "polygon/abc#3");
        assert_eq!(key.next_epoch().epoch, 4);
    }
}
