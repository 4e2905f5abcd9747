//! Pipeline scheduler — drives requests through the phase graph and runs
//! the six phase checkers that retry or expire stalled requests.
//!
//! # Forward path
//!
//! A trigger creates the request in `Pending` and handlers run back-to-back
//! until one has to wait (for observations, peer partials or a mined
//! transaction). A partial signature that completes a session resumes the
//! same path. Triggers arriving through [`TriggerSink`] are recorded durably
//! and then processed on a spawned task, so the indexer never waits on chain
//! RPCs.
//!
//! Every phase action for a request runs under that request's driver lock:
//! the forward path, a checker retry and its exhaustion never overlap for the
//! same key, so a side effect such as a transaction submission happens once
//! per attempt.
//!
//! # Checkers
//!
//! Each tick of a phase checker loads the requests in its governed status.
//! A request idle for longer than the phase timeout, and past its backoff, gets
//! one retry: the attempt is recorded durably first, then the phase action
//! runs again. An attempt that does not advance once the budget is spent
//! exhausts the request. Due requests are retried concurrently, up to
//! `checker_concurrency` at a time.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use chainoracle_core::{
    CreateOutcome, JobPipelineArgs, KeyedPartitions, NodeConfig, OracleError, OracleRequest,
    PartialSignature, Phase, PipelineMetrics, RequestKey, RequestStateStore, RequestStatus,
    RetryPolicy, SessionState,
};
use chainoracle_signer::{KeyShare, MultiSignatureAggregator, SubmitOutcome};

use crate::contracts::{
    ReportBuilder, SignatureBroadcaster, TransmitRequest, Transmitter, TriggerSink, TxStatus,
};

/// Result of running one phase action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The request moved to this status.
    Advanced(RequestStatus),
    /// Nothing more to do until something external happens.
    Waiting,
    /// Another writer moved the request first.
    Superseded,
}

type PhaseHandler =
    for<'a> fn(&'a PipelineScheduler, OracleRequest, bool) -> BoxFuture<'a, Result<PhaseOutcome, OracleError>>;

/// Counters for one checker tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Requests past their phase timeout and backoff.
    pub due: usize,
    pub retried: usize,
    pub advanced: usize,
    pub expired: usize,
    /// Collection timeouts that restarted the request in a new epoch.
    pub new_epochs: usize,
    pub archived: usize,
    /// Signature sessions dropped because no local request ever opened them.
    pub orphans_pruned: usize,
}

impl TickReport {
    fn absorb(&mut self, other: TickReport) {
        self.due += other.due;
        self.retried += other.retried;
        self.advanced += other.advanced;
        self.expired += other.expired;
        self.new_epochs += other.new_epochs;
        self.archived += other.archived;
        self.orphans_pruned += other.orphans_pruned;
    }
}

/// The chain-specific collaborators a scheduler calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub reports: Arc<dyn ReportBuilder>,
    pub broadcaster: Arc<dyn SignatureBroadcaster>,
    pub transmitter: Arc<dyn Transmitter>,
}

pub struct PipelineScheduler {
    me: Weak<PipelineScheduler>,
    config: Arc<NodeConfig>,
    requests: Arc<RequestStateStore>,
    aggregator: Arc<MultiSignatureAggregator>,
    signer: Arc<KeyShare>,
    collaborators: Collaborators,
    metrics: Arc<dyn PipelineMetrics>,
    drivers: KeyedPartitions<RequestKey, ()>,
}

impl PipelineScheduler {
    pub fn new(
        config: Arc<NodeConfig>,
        requests: Arc<RequestStateStore>,
        aggregator: Arc<MultiSignatureAggregator>,
        signer: Arc<KeyShare>,
        collaborators: Collaborators,
        metrics: Arc<dyn PipelineMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            requests,
            aggregator,
            signer,
            collaborators,
            metrics,
            drivers: KeyedPartitions::new(),
        })
    }

    pub fn requests(&self) -> &Arc<RequestStateStore> {
        &self.requests
    }

    pub fn aggregator(&self) -> &Arc<MultiSignatureAggregator> {
        &self.aggregator
    }

    // ─── Dispatch table ───────────────────────────────────────────────────────

    fn handler(phase: Phase) -> PhaseHandler {
        match phase {
            Phase::RequestReceived => request_received,
            Phase::ObservationCommit => observation_commit,
            Phase::ReportReceived => report_received,
            Phase::ReportCommit => report_commit,
            Phase::Transmit => transmit,
            Phase::RequestEnd => request_end,
        }
    }

    async fn run_phase(
        &self,
        phase: Phase,
        request: OracleRequest,
        retry: bool,
    ) -> Result<PhaseOutcome, OracleError> {
        let key = request.key.clone();
        let entered_at = request.last_modified_at;
        let outcome = match Self::handler(phase)(self, request, retry).await {
            Err(OracleError::InvalidTransition { .. }) => Ok(PhaseOutcome::Superseded),
            other => other,
        }?;

        if let PhaseOutcome::Advanced(next) = outcome {
            let spent = (self.requests.now_ms() - entered_at).max(0) as u64;
            self.metrics.record_phase_duration(&key.chain_id, phase, spent);
            tracing::debug!(request = %key, %phase, to = %next, spent_ms = spent, "phase complete");
        }
        Ok(outcome)
    }

    /// Run `work` holding the driver lock for `key`.
    async fn exclusive<T>(&self, key: &RequestKey, work: impl Future<Output = T>) -> T {
        let driver = self.drivers.slot(key);
        let out = {
            let _driving = driver.lock().await;
            work.await
        };
        drop(driver);
        self.drivers.evict_idle(key);
        out
    }

    /// Requests with a live driver lock.
    pub fn active_drivers(&self) -> usize {
        self.drivers.len()
    }

    // ─── Forward path ─────────────────────────────────────────────────────────

    /// Run handlers for `key` until one waits or the request is terminal.
    /// Returns the status the request was left in.
    pub async fn process(&self, key: &RequestKey) -> Result<RequestStatus, OracleError> {
        self.exclusive(key, self.advance(key)).await
    }

    /// [`process`](Self::process) body; the caller holds the driver lock.
    async fn advance(&self, key: &RequestKey) -> Result<RequestStatus, OracleError> {
        loop {
            let request = self
                .requests
                .get(key)
                .await?
                .ok_or_else(|| OracleError::NotFound(format!("request {key}")))?;
            let status = request.status;
            if status.is_terminal() {
                return Ok(status);
            }
            match self.run_phase(Phase::for_status(status), request, false).await? {
                PhaseOutcome::Advanced(_) => continue,
                PhaseOutcome::Waiting | PhaseOutcome::Superseded => return Ok(status),
            }
        }
    }

    /// [`process`](Self::process), absorbing failures; the checkers pick the
    /// request up again.
    async fn drive(&self, key: &RequestKey) {
        if let Err(e) = self.process(key).await {
            forward_paused(key, &e);
        }
    }

    /// [`drive`](Self::drive) for a caller that already holds the lock.
    async fn resume(&self, key: &RequestKey) {
        if let Err(e) = self.advance(key).await {
            forward_paused(key, &e);
        }
    }

    /// Record a trigger as a new `Pending` request and process it before
    /// returning. A trigger for an existing key is a no-op.
    pub async fn submit_trigger(&self, args: JobPipelineArgs) -> Result<(), OracleError> {
        if let Some(key) = self.record_trigger(args).await? {
            self.drive(&key).await;
        }
        Ok(())
    }

    /// Record a trigger durably and process it on a spawned task. Returns as
    /// soon as the `Pending` request is stored.
    pub async fn hand_off_trigger(&self, args: JobPipelineArgs) -> Result<(), OracleError> {
        let Some(key) = self.record_trigger(args).await? else {
            return Ok(());
        };
        match self.me.upgrade() {
            Some(scheduler) => {
                tokio::spawn(async move { scheduler.drive(&key).await });
            }
            None => tracing::debug!(request = %key, "scheduler shutting down, left for checkers"),
        }
        Ok(())
    }

    /// Create the `Pending` request. Returns its key if it was new.
    async fn record_trigger(&self, args: JobPipelineArgs) -> Result<Option<RequestKey>, OracleError> {
        let key = args.key();
        let request = OracleRequest::pending(
            key.clone(),
            args.base().round_id,
            args.payload().clone(),
            args.source_tx(),
            args.height(),
            self.requests.now_ms(),
        );
        match self.requests.create_if_absent(request).await? {
            CreateOutcome::Created => {
                tracing::info!(request = %key, kind = %args.request_type(), height = args.height(), "request received");
                Ok(Some(key))
            }
            CreateOutcome::AlreadyExists(status) => {
                tracing::debug!(request = %key, %status, "duplicate trigger ignored");
                Ok(None)
            }
        }
    }

    /// Feed a peer's partial signature. Invalid partials are logged and
    /// dropped (`Ok(None)`).
    pub async fn on_partial_signature(
        &self,
        key: &RequestKey,
        partial: PartialSignature,
    ) -> Result<Option<SubmitOutcome>, OracleError> {
        let signer = partial.signer_index;
        match self.aggregator.submit_partial(key, partial).await {
            Ok(outcome) => {
                if matches!(outcome, SubmitOutcome::Reached { .. }) {
                    self.drive(key).await;
                }
                Ok(Some(outcome))
            }
            Err(e @ OracleError::InvalidPartialSignature { .. }) => {
                tracing::warn!(request = %key, signer, error = %e, "partial signature rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Move a non-terminal request to `Cancelled`. Cancelling an expired
    /// request fails with [`OracleError::RequestExpired`]; other terminal
    /// statuses are returned unchanged.
    pub async fn cancel(&self, key: &RequestKey) -> Result<RequestStatus, OracleError> {
        self.exclusive(key, self.cancel_locked(key)).await
    }

    async fn cancel_locked(&self, key: &RequestKey) -> Result<RequestStatus, OracleError> {
        loop {
            let request = self
                .requests
                .get(key)
                .await?
                .ok_or_else(|| OracleError::NotFound(format!("request {key}")))?;
            match request.status {
                RequestStatus::Expired => {
                    return Err(OracleError::RequestExpired { key: key.to_string() })
                }
                status if status.is_terminal() => return Ok(status),
                _ => {}
            }
            match self
                .requests
                .try_transition(key, request.status, RequestStatus::Cancelled)
                .await
            {
                Ok(_) => {
                    if request.status == RequestStatus::Committing {
                        self.aggregator.abandon(key).await?;
                    }
                    tracing::info!(request = %key, from = %request.status, "request cancelled");
                    return Ok(RequestStatus::Cancelled);
                }
                // raced with another writer; re-read
                Err(OracleError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    // ─── Checkers ─────────────────────────────────────────────────────────────

    /// One checker pass over every request in `phase`'s governed statuses.
    pub async fn tick(&self, phase: Phase) -> Result<TickReport, OracleError> {
        let cfg = self.config.phases.get(phase);
        let policy = RetryPolicy::new(cfg.retry.clone());
        let timeout = cfg.timeout_ms as i64;
        let mut report = TickReport::default();

        let mut due = Vec::new();
        for &status in phase.governed_statuses() {
            for request in self.requests.requests_in_status(status).await? {
                let now = self.requests.now_ms();
                if now - request.last_modified_at <= timeout {
                    continue;
                }
                if request.next_attempt_at.is_some_and(|at| now < at) {
                    continue;
                }
                due.push(request);
            }
        }
        report.due = due.len();

        let policy = &policy;
        let mut checks = futures::stream::iter(due)
            .map(|request| self.check(phase, policy, request))
            .buffer_unordered(self.config.checker_concurrency.max(1));
        while let Some(done) = checks.next().await {
            report.absorb(done);
        }

        if phase == Phase::RequestEnd {
            let ttl = i64::try_from(self.config.signing.orphan_session_ttl_ms).unwrap_or(i64::MAX);
            let cutoff = self.requests.now_ms().saturating_sub(ttl);
            match self.aggregator.prune_orphans(cutoff).await {
                Ok(pruned) => report.orphans_pruned = pruned,
                Err(e) => tracing::warn!(error = %e, "orphaned session prune failed"),
            }
        }
        Ok(report)
    }

    /// Retry (or, for `RequestEnd`, archive) one due request.
    async fn check(&self, phase: Phase, policy: &RetryPolicy, request: OracleRequest) -> TickReport {
        let key = request.key.clone();
        let mut report = TickReport::default();
        if phase == Phase::RequestEnd {
            match self.exclusive(&key, self.run_phase(phase, request, false)).await {
                Ok(_) => report.archived += 1,
                Err(e) => tracing::warn!(request = %key, error = %e, "archive failed"),
            }
            return report;
        }
        self.exclusive(&key, self.retry(phase, policy, request, &mut report))
            .await;
        report
    }

    /// One retry attempt; the caller holds the driver lock.
    async fn retry(
        &self,
        phase: Phase,
        policy: &RetryPolicy,
        request: OracleRequest,
        report: &mut TickReport,
    ) {
        let key = request.key.clone();
        let now = self.requests.now_ms();
        let attempt = request.attempts + 1;
        let next_attempt_at = now + policy.backoff(attempt).as_millis() as i64;

        // durable before the side effect
        let request = match self
            .requests
            .record_attempt(&key, request.status, next_attempt_at)
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_expected() => {
                tracing::debug!(request = %key, %phase, error = %e, "request moved before retry");
                return;
            }
            Err(e) => {
                tracing::warn!(request = %key, %phase, error = %e, "could not record retry attempt");
                return;
            }
        };
        report.retried += 1;
        self.metrics.record_retry(&key.chain_id, phase);
        tracing::info!(request = %key, %phase, attempt, max_attempts = policy.config.max_attempts, "retrying phase");

        let stalled = match self.run_phase(phase, request.clone(), true).await {
            Ok(PhaseOutcome::Advanced(_)) => {
                report.advanced += 1;
                self.resume(&key).await;
                false
            }
            Ok(PhaseOutcome::Superseded) => false,
            Ok(PhaseOutcome::Waiting) => true,
            Err(e) => {
                if e.is_transient() {
                    tracing::debug!(request = %key, %phase, attempt, error = %e, "retry attempt failed");
                } else {
                    tracing::warn!(request = %key, %phase, attempt, error = %e, "retry attempt failed");
                }
                true
            }
        };

        if stalled && !policy.has_budget(request.attempts) {
            match self.exhaust(phase, &request).await {
                Ok(Exhaustion::Expired) => report.expired += 1,
                Ok(Exhaustion::NewEpoch) => report.new_epochs += 1,
                Ok(Exhaustion::Resumed) => report.advanced += 1,
                Ok(Exhaustion::Superseded) => {}
                Err(e) => tracing::warn!(request = %key, %phase, error = %e, "could not exhaust request"),
            }
        }
    }

    async fn exhaust(&self, phase: Phase, request: &OracleRequest) -> Result<Exhaustion, OracleError> {
        let key = &request.key;

        if request.status == RequestStatus::Committing {
            if self.aggregator.abandon(key).await? == SessionState::Reached {
                // threshold arrived after the last attempt
                self.resume(key).await;
                return Ok(Exhaustion::Resumed);
            }
            if key.epoch < self.config.signing.max_epoch_retries {
                return self.restart_in_next_epoch(request).await;
            }
        }

        match self
            .requests
            .try_transition(key, request.status, RequestStatus::Expired)
            .await
        {
            Ok(_) => {
                self.metrics.record_expired(&key.chain_id, phase);
                tracing::warn!(request = %key, %phase, attempts = request.attempts, "retry budget exhausted, request expired");
                Ok(Exhaustion::Expired)
            }
            Err(OracleError::InvalidTransition { .. }) => Ok(Exhaustion::Superseded),
            Err(e) => Err(e),
        }
    }

    async fn restart_in_next_epoch(&self, request: &OracleRequest) -> Result<Exhaustion, OracleError> {
        let key = &request.key;
        match self
            .requests
            .try_transition(key, RequestStatus::Committing, RequestStatus::Expired)
            .await
        {
            Ok(_) => {}
            Err(OracleError::InvalidTransition { .. }) => return Ok(Exhaustion::Superseded),
            Err(e) => return Err(e),
        }

        let next = OracleRequest::pending(
            key.next_epoch(),
            request.round_id,
            request.payload.clone(),
            request.source_tx.clone(),
            request.height,
            self.requests.now_ms(),
        );
        let next_key = next.key.clone();
        self.requests.create_if_absent(next).await?;
        tracing::warn!(request = %key, next_epoch = next_key.epoch, "signature collection timed out, restarting in new epoch");
        self.drive(&next_key).await;
        Ok(Exhaustion::NewEpoch)
    }

    /// Spawn one periodic task per phase checker. Tasks stop when `shutdown`
    /// flips to `true`.
    pub fn spawn_checkers(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        Phase::ALL
            .iter()
            .map(|&phase| {
                let scheduler = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.run_checker(phase, shutdown).await })
            })
            .collect()
    }

    async fn run_checker(&self, phase: Phase, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = Duration::from_millis(self.config.tick_deadline_ms);
        tracing::debug!(%phase, "checker started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match tokio::time::timeout(deadline, self.tick(phase)).await {
                        Ok(Ok(report)) if report.due > 0 => {
                            tracing::debug!(%phase, ?report, "checker tick");
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::warn!(%phase, error = %e, "checker tick failed"),
                        Err(_) => tracing::warn!(%phase, deadline_ms = self.config.tick_deadline_ms, "checker tick exceeded deadline"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(%phase, "checker stopped");
    }

    // ─── Phase actions ────────────────────────────────────────────────────────

    async fn on_request_received(&self, request: OracleRequest, _retry: bool) -> Result<PhaseOutcome, OracleError> {
        self.collaborators.reports.observe(&request).await?;
        self.requests
            .try_transition(&request.key, RequestStatus::Pending, RequestStatus::Observing)
            .await?;
        Ok(PhaseOutcome::Advanced(RequestStatus::Observing))
    }

    async fn on_observation_commit(&self, request: OracleRequest, retry: bool) -> Result<PhaseOutcome, OracleError> {
        if retry {
            self.collaborators.reports.observe(&request).await?;
        }
        let Some(report) = self.collaborators.reports.build_report(&request).await? else {
            return Ok(PhaseOutcome::Waiting);
        };
        let hash: [u8; 32] = Sha256::digest(&report).into();
        self.requests
            .transition_with(&request.key, RequestStatus::Observing, RequestStatus::Committing, |r| {
                r.report = Some(report);
                r.report_hash = Some(hash);
            })
            .await?;
        Ok(PhaseOutcome::Advanced(RequestStatus::Committing))
    }

    async fn on_report_received(&self, request: OracleRequest, retry: bool) -> Result<PhaseOutcome, OracleError> {
        let key = &request.key;
        let hash = request
            .report_hash
            .ok_or_else(|| OracleError::Other(format!("{key} is committing without a report hash")))?;

        let session = self.aggregator.open_session(key, hash).await?;
        let reached = match session.state {
            SessionState::Finalized => true,
            SessionState::Abandoned => return Ok(PhaseOutcome::Waiting),
            // early peer partials may already have met the threshold; peers
            // still need this node's share
            SessionState::Collecting | SessionState::Reached => {
                let partial = self
                    .signer
                    .partial(hash)
                    .map_err(|e| OracleError::Other(format!("signing {key}: {e}")))?;
                let outcome = self.aggregator.submit_partial(key, partial.clone()).await?;
                let first = matches!(outcome, SubmitOutcome::Accepted { .. } | SubmitOutcome::Reached { .. });
                if first || retry {
                    self.collaborators.broadcaster.broadcast(key, &partial).await?;
                }
                session.state == SessionState::Reached || matches!(outcome, SubmitOutcome::Reached { .. })
            }
        };
        if !reached {
            return Ok(PhaseOutcome::Waiting);
        }

        self.requests
            .try_transition(key, RequestStatus::Committing, RequestStatus::ReportBuilt)
            .await?;
        Ok(PhaseOutcome::Advanced(RequestStatus::ReportBuilt))
    }

    async fn transmit_request(&self, request: &OracleRequest) -> Result<TransmitRequest, OracleError> {
        let key = &request.key;
        let signature = self
            .aggregator
            .session(key)
            .await?
            .and_then(|s| s.aggregate)
            .ok_or_else(|| OracleError::NotFound(format!("aggregate signature for {key}")))?;
        let (Some(report), Some(report_hash)) = (request.report.clone(), request.report_hash) else {
            return Err(OracleError::NotFound(format!("report for {key}")));
        };
        Ok(TransmitRequest {
            key: key.clone(),
            report,
            report_hash,
            signature,
        })
    }

    async fn on_report_commit(&self, request: OracleRequest, _retry: bool) -> Result<PhaseOutcome, OracleError> {
        let tx = self.transmit_request(&request).await?;
        let tx_id = self.collaborators.transmitter.submit(&tx).await?;
        tracing::info!(request = %request.key, %tx_id, "report submitted");
        self.requests
            .transition_with(&request.key, RequestStatus::ReportBuilt, RequestStatus::Transmitting, |r| {
                r.tx_id = Some(tx_id);
            })
            .await?;
        Ok(PhaseOutcome::Advanced(RequestStatus::Transmitting))
    }

    async fn on_transmit(&self, request: OracleRequest, retry: bool) -> Result<PhaseOutcome, OracleError> {
        let key = &request.key;
        let tx_id = request
            .tx_id
            .clone()
            .ok_or_else(|| OracleError::Other(format!("{key} is transmitting without a tx id")))?;

        match self.collaborators.transmitter.status(&key.chain_id, &tx_id).await? {
            TxStatus::Mined => {
                self.aggregator.finalize(key).await?;
                self.requests
                    .try_transition(key, RequestStatus::Transmitting, RequestStatus::Transmitted)
                    .await?;
                tracing::info!(request = %key, %tx_id, "report transmitted");
                Ok(PhaseOutcome::Advanced(RequestStatus::Transmitted))
            }
            TxStatus::Pending => Ok(PhaseOutcome::Waiting),
            TxStatus::NotExisted if retry => {
                let tx = self.transmit_request(&request).await?;
                let resubmitted = self.collaborators.transmitter.submit(&tx).await?;
                tracing::info!(request = %key, previous = %tx_id, tx_id = %resubmitted, "transaction not found, resubmitted");
                self.requests
                    .update_in_status(key, RequestStatus::Transmitting, |r| r.tx_id = Some(resubmitted))
                    .await?;
                Ok(PhaseOutcome::Waiting)
            }
            TxStatus::NotExisted => Ok(PhaseOutcome::Waiting),
        }
    }

    /// Archive a terminal request past its retention window and drop its
    /// signature session. Runs under the driver lock, which is released for
    /// good once the request is archived.
    async fn on_request_end(&self, request: OracleRequest, _retry: bool) -> Result<PhaseOutcome, OracleError> {
        let key = &request.key;
        self.requests.archive(key).await?;
        if let Err(e) = self.aggregator.prune(key).await {
            tracing::warn!(request = %key, error = %e, "session prune failed");
        }
        Ok(PhaseOutcome::Waiting)
    }
}

enum Exhaustion {
    Expired,
    NewEpoch,
    /// The session reached its threshold meanwhile; processing continued.
    Resumed,
    Superseded,
}

fn request_received(s: &PipelineScheduler, r: OracleRequest, retry: bool) -> BoxFuture<'_, Result<PhaseOutcome, OracleError>> {
    Box::pin(s.on_request_received(r, retry))
}

fn observation_commit(s: &PipelineScheduler, r: OracleRequest, retry: bool) -> BoxFuture<'_, Result<PhaseOutcome, OracleError>> {
    Box::pin(s.on_observation_commit(r, retry))
}

fn report_received(s: &PipelineScheduler, r: OracleRequest, retry: bool) -> BoxFuture<'_, Result<PhaseOutcome, OracleError>> {
    Box::pin(s.on_report_received(r, retry))
}

fn report_commit(s: &PipelineScheduler, r: OracleRequest, retry: bool) -> BoxFuture<'_, Result<PhaseOutcome, OracleError>> {
    Box::pin(s.on_report_commit(r, retry))
}

fn transmit(s: &PipelineScheduler, r: OracleRequest, retry: bool) -> BoxFuture<'_, Result<PhaseOutcome, OracleError>> {
    Box::pin(s.on_transmit(r, retry))
}

fn request_end(s: &PipelineScheduler, r: OracleRequest, retry: bool) -> BoxFuture<'_, Result<PhaseOutcome, OracleError>> {
    Box::pin(s.on_request_end(r, retry))
}

fn forward_paused(key: &RequestKey, e: &OracleError) {
    if e.is_transient() || e.is_expected() {
        tracing::debug!(request = %key, error = %e, "forward path paused");
    } else {
        tracing::warn!(request = %key, error = %e, "forward path failed");
    }
}

#[async_trait]
impl TriggerSink for PipelineScheduler {
    async fn submit_trigger(&self, args: JobPipelineArgs) -> Result<(), OracleError> {
        self.hand_off_trigger(args).await
    }
}
