//! chainoracle-pipeline — the OCR job pipeline.
//!
//! # Architecture
//!
//! ```text
//! OracleNode
//!   ├── IndexerPoller × chains  (indexer page → triggers → cursor advance)
//!   └── PipelineScheduler
//!         ├── phase dispatch table (Phase → handler)
//!         ├── six phase checkers   (timeout → retry → expire)
//!         ├── RequestStateStore
//!         └── MultiSignatureAggregator
//! ```
//!
//! Chain-specific behaviour enters through the traits in [`contracts`].

pub mod contracts;
pub mod node;
pub mod poller;
pub mod scheduler;

pub use contracts::{
    IndexerSource, ReportBuilder, SignatureBroadcaster, TransmitRequest, Transmitter, TriggerSink,
    TxStatus,
};
pub use node::{NodeHandle, OracleNode, OracleNodeBuilder};
pub use poller::{IndexerPoller, PollReport};
pub use scheduler::{Collaborators, PhaseOutcome, PipelineScheduler, TickReport};
