//! # chainoracle-observability
//!
//! OpenTelemetry-based observability for ChainOracle.
//!
//! ## Built-in metrics
//! - `chainoracle.phase_duration_ms`         — histogram, tagged with chain + phase
//! - `chainoracle.phase_retries`             — counter, tagged with chain + phase
//! - `chainoracle.session_threshold_reached` — counter, tagged with chain
//! - `chainoracle.requests_expired`          — counter, tagged with chain + phase
//!
//! ## Structured logging
//! Text or JSON logs through `tracing-subscriber`, with per-component levels.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::OracleMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
