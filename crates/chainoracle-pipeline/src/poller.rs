//! Indexer poller — turns an indexer's event feed into pipeline triggers.
//!
//! Each poll asks for events in `(cursor, cursor + page_limit]`, hands every
//! one to the scheduler in `(height, log_index)` order and only then advances
//! the cursor. A failed hand-off leaves the cursor untouched, so the next
//! poll re-delivers the whole page; request creation is idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use chainoracle_core::{ChainCursorTracker, ChainPollConfig, JobPipelineArgs, OracleError};

use crate::contracts::{IndexerSource, TriggerSink};

/// Outcome of one poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Events in the window after filtering.
    pub events: usize,
    /// Cursor after the poll.
    pub cursor: u64,
    pub advanced: bool,
}

/// One chain's poller. Generic over the indexer capability so every chain
/// kind shares the same paging and cursor logic.
pub struct IndexerPoller<S> {
    config: ChainPollConfig,
    source: Arc<S>,
    cursors: Arc<ChainCursorTracker>,
    sink: Arc<dyn TriggerSink>,
}

impl<S: IndexerSource> IndexerPoller<S> {
    pub fn new(
        config: ChainPollConfig,
        source: Arc<S>,
        cursors: Arc<ChainCursorTracker>,
        sink: Arc<dyn TriggerSink>,
    ) -> Self {
        Self {
            config,
            source,
            cursors,
            sink,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    /// Fetch one page, hand it off and advance the cursor.
    pub async fn poll_once(&self) -> Result<PollReport, OracleError> {
        let chain = self.config.chain_id.as_str();
        let cursor = self
            .cursors
            .get(chain)
            .await?
            .unwrap_or(self.config.start_height);
        let window_end = cursor.saturating_add(self.config.page_limit);

        let mut events = self
            .source
            .fetch_events(chain, cursor + 1, self.config.page_limit)
            .await?;
        events.retain(|e| e.chain_id == chain && e.height > cursor && e.height <= window_end);
        events.sort_by_key(|e| e.position());

        for event in &events {
            self.sink
                .submit_trigger(JobPipelineArgs::from_event(event))
                .await
                .map_err(|e| {
                    OracleError::Handoff(format!(
                        "{chain} event {}@{}:{}: {e}",
                        event.request_id, event.height, event.log_index
                    ))
                })?;
        }

        let mut target = events.last().map(|e| e.height);
        if let Some(indexed) = self.source.indexed_height(chain).await? {
            // heights the indexer has covered are consumed even without events
            let covered = window_end.min(indexed);
            target = Some(target.map_or(covered, |t| t.max(covered)));
        }

        let mut report = PollReport {
            events: events.len(),
            cursor,
            advanced: false,
        };
        if let Some(height) = target.filter(|h| *h > cursor) {
            match self.cursors.advance(chain, height).await {
                Ok(c) => {
                    report.cursor = c.consumed_block_height;
                    report.advanced = true;
                }
                Err(e @ OracleError::StaleCursor { .. }) => {
                    tracing::debug!(chain, error = %e, "cursor already past page");
                }
                Err(e) => return Err(e),
            }
        }

        if report.events > 0 || report.advanced {
            tracing::info!(chain, events = report.events, from = cursor, to = report.cursor, "indexer page handed off");
        }
        Ok(report)
    }

    /// Poll every `poll_interval_ms` until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let chain = self.config.chain_id.as_str();
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(chain, start_height = self.config.start_height, "poller started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        if e.is_transient() {
                            tracing::debug!(chain, error = %e, "poll failed");
                        } else {
                            tracing::warn!(chain, error = %e, "poll failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(chain, "poller stopped");
    }
}
