//! Collaborator traits — the seams between the pipeline and chain-specific
//! code (indexer queries, observation, peer broadcast, transaction submit).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainoracle_core::{IndexerEvent, JobPipelineArgs, OracleError, OracleRequest, PartialSignature, RequestKey};

/// An external indexing service for one or more chains.
///
/// Responses must be stable and replayable for a given `(chain, height range)`.
#[async_trait]
pub trait IndexerSource: Send + Sync {
    /// Events with height in `[start_height, start_height + page_limit)`,
    /// in any order.
    async fn fetch_events(
        &self,
        chain_id: &str,
        start_height: u64,
        page_limit: u64,
    ) -> Result<Vec<IndexerEvent>, OracleError>;

    /// Highest height the indexer has fully processed, if it reports one.
    async fn indexed_height(&self, _chain_id: &str) -> Result<Option<u64>, OracleError> {
        Ok(None)
    }
}

/// Pipeline entry point fed by the poller.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    /// Accept one trigger. `Ok` means the request is durably recorded
    /// (or already was).
    async fn submit_trigger(&self, args: JobPipelineArgs) -> Result<(), OracleError>;
}

/// Observation and report building for a request's job type.
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    /// Start (or re-broadcast) this node's observation.
    async fn observe(&self, request: &OracleRequest) -> Result<(), OracleError>;

    /// The canonical report payload, or `None` while observations are still
    /// outstanding.
    async fn build_report(&self, request: &OracleRequest) -> Result<Option<Vec<u8>>, OracleError>;
}

/// Gossips this node's partial signature to its peers.
#[async_trait]
pub trait SignatureBroadcaster: Send + Sync {
    async fn broadcast(&self, key: &RequestKey, partial: &PartialSignature) -> Result<(), OracleError>;
}

/// What the transmit phase submits on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitRequest {
    pub key: RequestKey,
    pub report: Vec<u8>,
    pub report_hash: [u8; 32],
    /// Combined group signature.
    pub signature: Vec<u8>,
}

/// On-chain state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Mined,
    Pending,
    /// Not (yet) visible to the node's RPC.
    NotExisted,
}

/// Chain-specific contract call layer.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Submit the report; returns the transaction id.
    async fn submit(&self, request: &TransmitRequest) -> Result<String, OracleError>;

    async fn status(&self, chain_id: &str, tx_id: &str) -> Result<TxStatus, OracleError>;
}
