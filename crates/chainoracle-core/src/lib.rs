//! chainoracle-core — request lifecycle, chain cursors and durable-store
//! traits for the ChainOracle node.
//!
//! # Architecture
//!
//! ```text
//! IndexerPoller ──▶ PipelineScheduler ──▶ phase handlers
//!      │                  │                    │
//!      ▼                  ▼                    ▼
//! ChainCursorTracker  RequestStateStore   MultiSignatureAggregator
//!      └──────────────────┴────────────────────┘
//!                  CursorStore / RequestStore / SessionStore
//!                  (memory / SQLite)
//! ```
//!
//! This crate owns the data model and the two state owners that every other
//! crate shares: [`ChainCursorTracker`] and [`RequestStateStore`].

pub mod clock;
pub mod config;
pub mod cursor;
pub mod error;
pub mod message;
pub mod metrics;
pub mod partition;
pub mod persist;
pub mod phase;
pub mod retry;
pub mod session;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChainPollConfig, NodeConfig, PhaseConfig, PhaseSettings, SigningConfig};
pub use cursor::{ChainCursor, ChainCursorTracker};
pub use error::OracleError;
pub use message::{IndexerEvent, JobPipelineArgs, PipelineBase};
pub use metrics::{NoopMetrics, PipelineMetrics};
pub use partition::KeyedPartitions;
pub use persist::{CursorStore, MemoryStore, RequestStore, SessionStore};
pub use phase::Phase;
pub use retry::{RetryConfig, RetryPolicy};
pub use session::{InsertOutcome, PartialSignature, SessionState, SignatureSession};
pub use store::{CreateOutcome, RequestStateStore};
pub use types::{
    CrossChainRequestRecord, JobPayload, OracleRequest, RequestKey, RequestStatus, RequestType,
    SessionKey, StatusView,
};
