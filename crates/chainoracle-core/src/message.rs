//! Pipeline messages: indexer events and the immutable per-phase arguments
//! built from them.

use serde::{Deserialize, Serialize};

use crate::types::{JobPayload, RequestKey, RequestType};

/// One event returned by the external indexer.
///
/// Responses are ordered by `(height, log_index)` and replayable for a given
/// height range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerEvent {
    pub chain_id: String,
    pub request_id: String,
    pub transaction_id: String,
    pub height: u64,
    pub log_index: u32,
    pub payload: JobPayload,
}

impl IndexerEvent {
    /// Sort key used for paging.
    pub fn position(&self) -> (u64, u32) {
        (self.height, self.log_index)
    }
}

/// Fields common to every pipeline message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineBase {
    pub chain_id: String,
    pub request_id: String,
    pub epoch: u64,
    pub round_id: u64,
}

/// Immutable message carrying one phase's payload to the next handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPipelineArgs {
    base: PipelineBase,
    source_tx: String,
    height: u64,
    payload: JobPayload,
}

impl JobPipelineArgs {
    pub fn new(base: PipelineBase, source_tx: impl Into<String>, height: u64, payload: JobPayload) -> Self {
        Self {
            base,
            source_tx: source_tx.into(),
            height,
            payload,
        }
    }

    /// Build the initial trigger for an indexer event (epoch 0, round 0).
    pub fn from_event(event: &IndexerEvent) -> Self {
        Self::new(
            PipelineBase {
                chain_id: event.chain_id.clone(),
                request_id: event.request_id.clone(),
                epoch: 0,
                round_id: 0,
            },
            event.transaction_id.clone(),
            event.height,
            event.payload.clone(),
        )
    }

    pub fn base(&self) -> &PipelineBase {
        &self.base
    }

    pub fn source_tx(&self) -> &str {
        &self.source_tx
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn request_type(&self) -> RequestType {
        self.payload.request_type()
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.base.chain_id, &self.base.request_id, self.base.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_from_event() {
        let event = IndexerEvent {
            chain_id: "ethereum".into(),
            request_id: "req-7".into(),
            transaction_id: "0xfeed".into(),
            height: 101,
            log_index: 2,
            payload: JobPayload::DataFeeds {
                feed_ids: vec!["ETH/USD".into()],
            },
        };
        let args = JobPipelineArgs::from_event(&event);
        assert_eq!(args.key(), RequestKey::new("ethereum", "req-7", 0));
        assert_eq!(args.base().round_id, 0);
        assert_eq!(args.source_tx(), "0xfeed");
        assert_eq!(args.height(), 101);
        assert_eq!(args.request_type(), RequestType::DataFeeds);
        assert_eq!(event.position(), (101, 2));
    }
}
