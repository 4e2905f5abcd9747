//! Metric hooks emitted by the pipeline.
//!
//! The scheduler only talks to [`PipelineMetrics`]; the OpenTelemetry-backed
//! implementation lives in `chainoracle-observability`.

use crate::phase::Phase;

pub const PHASE_DURATION_MS: &str = "chainoracle.phase_duration_ms";
pub const PHASE_RETRIES: &str = "chainoracle.phase_retries";
pub const SESSION_THRESHOLD_REACHED: &str = "chainoracle.session_threshold_reached";
pub const REQUESTS_EXPIRED: &str = "chainoracle.requests_expired";

/// Sink for pipeline measurements. Implementations must be cheap and
/// non-blocking.
pub trait PipelineMetrics: Send + Sync {
    /// Time a request spent in `phase` before leaving it.
    fn record_phase_duration(&self, chain_id: &str, phase: Phase, duration_ms: u64);

    /// One checker-driven retry of `phase`.
    fn record_retry(&self, chain_id: &str, phase: Phase);

    /// A signature session collected its threshold of partials.
    fn record_threshold_reached(&self, chain_id: &str);

    /// A request was marked `Expired` while in `phase`.
    fn record_expired(&self, chain_id: &str, phase: Phase);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl PipelineMetrics for NoopMetrics {
    fn record_phase_duration(&self, _chain_id: &str, _phase: Phase, _duration_ms: u64) {}
    fn record_retry(&self, _chain_id: &str, _phase: Phase) {}
    fn record_threshold_reached(&self, _chain_id: &str) {}
    fn record_expired(&self, _chain_id: &str, _phase: Phase) {}
}
