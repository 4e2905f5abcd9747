//! OpenTelemetry implementation of [`PipelineMetrics`].
//!
//! Instruments are created against whatever meter provider the binary
//! installed globally; without one they are no-ops.

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

use chainoracle_core::metrics::{
    PHASE_DURATION_MS, PHASE_RETRIES, REQUESTS_EXPIRED, SESSION_THRESHOLD_REACHED,
};
use chainoracle_core::{Phase, PipelineMetrics};

/// Central metrics handle for the oracle pipeline.
#[derive(Clone)]
pub struct OracleMetrics {
    pub phase_duration_ms: Histogram<u64>,
    pub phase_retries: Counter<u64>,
    pub threshold_reached: Counter<u64>,
    pub requests_expired: Counter<u64>,
}

impl OracleMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            phase_duration_ms: meter
                .u64_histogram(PHASE_DURATION_MS)
                .with_description("Time a request spent in a pipeline phase in milliseconds")
                .build(),
            phase_retries: meter
                .u64_counter(PHASE_RETRIES)
                .with_description("Checker-driven retries of a pipeline phase")
                .build(),
            threshold_reached: meter
                .u64_counter(SESSION_THRESHOLD_REACHED)
                .with_description("Signature sessions that collected their threshold")
                .build(),
            requests_expired: meter
                .u64_counter(REQUESTS_EXPIRED)
                .with_description("Requests that exhausted their retry budget")
                .build(),
        }
    }

    /// Instruments on the global `chainoracle` meter.
    pub fn global() -> Self {
        Self::new(&global::meter("chainoracle"))
    }
}

fn labels(chain_id: &str, phase: Phase) -> [KeyValue; 2] {
    [
        KeyValue::new("chain", chain_id.to_string()),
        KeyValue::new("phase", phase.as_str()),
    ]
}

impl PipelineMetrics for OracleMetrics {
    fn record_phase_duration(&self, chain_id: &str, phase: Phase, duration_ms: u64) {
        self.phase_duration_ms
            .record(duration_ms, &labels(chain_id, phase));
    }

    fn record_retry(&self, chain_id: &str, phase: Phase) {
        self.phase_retries.add(1, &labels(chain_id, phase));
    }

    fn record_threshold_reached(&self, chain_id: &str) {
        self.threshold_reached
            .add(1, &[KeyValue::new("chain", chain_id.to_string())]);
    }

    fn record_expired(&self, chain_id: &str, phase: Phase) {
        self.requests_expired.add(1, &labels(chain_id, phase));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn records_without_a_provider() {
        let metrics: Arc<dyn PipelineMetrics> = Arc::new(OracleMetrics::global());
        for phase in Phase::ALL {
            metrics.record_phase_duration("ethereum", phase, 12);
            metrics.record_retry("ethereum", phase);
            metrics.record_expired("ethereum", phase);
        }
        metrics.record_threshold_reached("ethereum");
    }
}
