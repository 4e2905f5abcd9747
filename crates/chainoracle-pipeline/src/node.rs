//! Node runtime: wires stores, aggregator, scheduler and pollers together
//! and owns their background tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! let node = OracleNodeBuilder::new(config)
//!     .keys(public_keys, key_share)
//!     .store(Arc::new(SqliteStorage::open("oracle.db").await?))
//!     .collaborators(collaborators)
//!     .build(Arc::new(indexer))?;
//! let handle = node.start();
//! // ...
//! handle.shutdown().await;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use chainoracle_core::{
    ChainCursorTracker, Clock, CursorStore, MemoryStore, NodeConfig, NoopMetrics, OracleError,
    PipelineMetrics, RequestStateStore, RequestStore, SessionStore, SystemClock,
};
use chainoracle_signer::{KeyShare, MultiSignatureAggregator, PublicKeySet};

use crate::contracts::{IndexerSource, TriggerSink};
use crate::poller::IndexerPoller;
use crate::scheduler::{Collaborators, PipelineScheduler};

/// Fluent builder for [`OracleNode`].
pub struct OracleNodeBuilder {
    config: NodeConfig,
    keys: Option<(PublicKeySet, KeyShare)>,
    cursor_store: Option<Arc<dyn CursorStore>>,
    request_store: Option<Arc<dyn RequestStore>>,
    session_store: Option<Arc<dyn SessionStore>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn PipelineMetrics>,
    collaborators: Option<Collaborators>,
}

impl OracleNodeBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            keys: None,
            cursor_store: None,
            request_store: None,
            session_store: None,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoopMetrics),
            collaborators: None,
        }
    }

    /// This node's key share and the group's public key set.
    pub fn keys(mut self, public: PublicKeySet, share: KeyShare) -> Self {
        self.keys = Some((public, share));
        self
    }

    /// One backend for cursors, requests and sessions. Defaults to
    /// [`MemoryStore`].
    pub fn store<T>(mut self, store: Arc<T>) -> Self
    where
        T: CursorStore + RequestStore + SessionStore + 'static,
    {
        self.cursor_store = Some(store.clone());
        self.request_store = Some(store.clone());
        self.session_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Validate configuration and key material and assemble the node.
    pub fn build<S: IndexerSource + 'static>(self, source: Arc<S>) -> Result<OracleNode<S>, OracleError> {
        self.config.validate()?;
        let (public, share) = self
            .keys
            .ok_or_else(|| OracleError::FatalConfig("no signing keys configured".into()))?;
        check_keys(&self.config, &public, &share)?;
        let collaborators = self
            .collaborators
            .ok_or_else(|| OracleError::FatalConfig("no chain collaborators configured".into()))?;

        let (cursor_store, request_store, session_store) =
            match (self.cursor_store, self.request_store, self.session_store) {
                (Some(c), Some(r), Some(s)) => (c, r, s),
                _ => {
                    let memory = Arc::new(MemoryStore::new());
                    let c: Arc<dyn CursorStore> = memory.clone();
                    let r: Arc<dyn RequestStore> = memory.clone();
                    let s: Arc<dyn SessionStore> = memory;
                    (c, r, s)
                }
            };

        let config = Arc::new(self.config);
        let cursors = Arc::new(ChainCursorTracker::new(cursor_store, self.clock.clone()));
        let requests = Arc::new(RequestStateStore::new(request_store, self.clock.clone()));
        let aggregator = Arc::new(MultiSignatureAggregator::new(
            Arc::new(public),
            session_store,
            self.clock.clone(),
            self.metrics.clone(),
        ));
        let scheduler = PipelineScheduler::new(
            config.clone(),
            requests.clone(),
            aggregator,
            Arc::new(share),
            collaborators,
            self.metrics,
        );

        let sink: Arc<dyn TriggerSink> = scheduler.clone();
        let pollers = config
            .chains
            .iter()
            .map(|chain| {
                Arc::new(IndexerPoller::new(
                    chain.clone(),
                    source.clone(),
                    cursors.clone(),
                    sink.clone(),
                ))
            })
            .collect();

        Ok(OracleNode {
            config,
            cursors,
            requests,
            scheduler,
            pollers,
        })
    }
}

fn check_keys(config: &NodeConfig, public: &PublicKeySet, share: &KeyShare) -> Result<(), OracleError> {
    let signing = &config.signing;
    if public.threshold() != signing.threshold || public.participants() != signing.participants {
        return Err(OracleError::FatalConfig(format!(
            "key set is {}-of-{}, config expects {}-of-{}",
            public.threshold(),
            public.participants(),
            signing.threshold,
            signing.participants
        )));
    }
    if share.index() != signing.signer_index {
        return Err(OracleError::FatalConfig(format!(
            "key share index {} does not match signer_index {}",
            share.index(),
            signing.signer_index
        )));
    }
    if public.public_share(share.index()) != Some(&share.public_share()) {
        return Err(OracleError::FatalConfig("key share does not belong to the public key set".into()));
    }
    Ok(())
}

/// An assembled node. Nothing runs until [`start`](Self::start).
pub struct OracleNode<S> {
    config: Arc<NodeConfig>,
    cursors: Arc<ChainCursorTracker>,
    requests: Arc<RequestStateStore>,
    scheduler: Arc<PipelineScheduler>,
    pollers: Vec<Arc<IndexerPoller<S>>>,
}

impl<S: IndexerSource + 'static> OracleNode<S> {
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<PipelineScheduler> {
        &self.scheduler
    }

    pub fn cursors(&self) -> &Arc<ChainCursorTracker> {
        &self.cursors
    }

    pub fn requests(&self) -> &Arc<RequestStateStore> {
        &self.requests
    }

    /// Spawn the six phase checkers and one poller per configured chain.
    pub fn start(&self) -> NodeHandle {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = self.scheduler.spawn_checkers(rx.clone());
        for poller in &self.pollers {
            let poller = poller.clone();
            let rx = rx.clone();
            tasks.push(tokio::spawn(async move { poller.run(rx).await }));
        }
        tracing::info!(
            node = %self.config.node_id,
            chains = self.pollers.len(),
            threshold = self.config.signing.threshold,
            participants = self.config.signing.participants,
            "oracle node started"
        );
        NodeHandle { shutdown, tasks }
    }
}

/// Owns a started node's background tasks.
pub struct NodeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("oracle node stopped");
    }
}
