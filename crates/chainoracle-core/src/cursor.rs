//! Chain cursor tracker — the durable "last consumed height" per chain.
//!
//! The cursor gates re-ingestion: the poller only asks the indexer for events
//! above it, and only moves it after a whole page was handed off.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::OracleError;
use crate::partition::KeyedPartitions;
use crate::persist::CursorStore;

/// The highest height whose events were durably handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCursor {
    /// Chain slug (e.g. `"ethereum"`).
    pub chain_id: String,
    pub consumed_block_height: u64,
    /// Unix millis of the last advance.
    pub updated_at: i64,
}

impl ChainCursor {
    pub fn new(chain_id: impl Into<String>, consumed_block_height: u64, updated_at: i64) -> Self {
        Self {
            chain_id: chain_id.into(),
            consumed_block_height,
            updated_at,
        }
    }

    /// Lower bound of the next poll (cursor + 1).
    pub fn next_height(&self) -> u64 {
        self.consumed_block_height + 1
    }
}

/// Owns every chain's cursor. Advances for one chain are serialized; chains
/// never contend with each other.
pub struct ChainCursorTracker {
    store: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    partitions: KeyedPartitions<String, ChainCursor>,
}

impl ChainCursorTracker {
    pub fn new(store: Arc<dyn CursorStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            partitions: KeyedPartitions::new(),
        }
    }

    /// Current consumed height, `None` if the chain was never advanced.
    pub async fn get(&self, chain_id: &str) -> Result<Option<u64>, OracleError> {
        let slot = self.partitions.slot(&chain_id.to_string());
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.store.load_cursor(chain_id).await?;
        }
        Ok(guard.as_ref().map(|c| c.consumed_block_height))
    }

    /// Compare-and-advance: persists `new_height` only if it is strictly above
    /// the current height, otherwise returns [`OracleError::StaleCursor`] and
    /// leaves state unchanged.
    pub async fn advance(&self, chain_id: &str, new_height: u64) -> Result<ChainCursor, OracleError> {
        let slot = self.partitions.slot(&chain_id.to_string());
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = self.store.load_cursor(chain_id).await?;
        }

        if let Some(current) = guard.as_ref() {
            if new_height <= current.consumed_block_height {
                return Err(OracleError::StaleCursor {
                    chain_id: chain_id.to_string(),
                    current: current.consumed_block_height,
                    attempted: new_height,
                });
            }
        }

        let cursor = ChainCursor::new(chain_id, new_height, self.clock.now_ms());
        // persist first; the cache only reflects committed state
        self.store.save_cursor(&cursor).await?;
        *guard = Some(cursor.clone());

        tracing::debug!(chain = chain_id, height = new_height, "cursor advanced");
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persist::MemoryStore;

    fn tracker() -> (ChainCursorTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tracker = ChainCursorTracker::new(store.clone(), Arc::new(ManualClock::new(42)));
        (tracker, store)
    }

    #[tokio::test]
    async fn advance_moves_forward() {
        let (tracker, store) = tracker();
        assert_eq!(tracker.get("ethereum").await.unwrap(), None);

        let c = tracker.advance("ethereum", 100).await.unwrap();
        assert_eq!(c.next_height(), 101);
        assert_eq!(c.updated_at, 42);
        tracker.advance("ethereum", 105).await.unwrap();
        assert_eq!(tracker.get("ethereum").await.unwrap(), Some(105));

        // durable
        let saved = store.load_cursor("ethereum").await.unwrap().unwrap();
        assert_eq!(saved.consumed_block_height, 105);
    }

    #[tokio::test]
    async fn equal_or_lower_height_is_stale() {
        let (tracker, _) = tracker();
        tracker.advance("ethereum", 100).await.unwrap();

        for h in [100, 99, 0] {
            let err = tracker.advance("ethereum", h).await.unwrap_err();
            assert!(matches!(err, OracleError::StaleCursor { current: 100, .. }));
        }
        assert_eq!(tracker.get("ethereum").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn chains_are_independent() {
        let (tracker, _) = tracker();
        tracker.advance("ethereum", 500).await.unwrap();
        tracker.advance("polygon", 10).await.unwrap();
        assert_eq!(tracker.get("ethereum").await.unwrap(), Some(500));
        assert_eq!(tracker.get("polygon").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn resumes_from_store() {
        let store = Arc::new(MemoryStore::new());
        store.save_cursor(&ChainCursor::new("ethereum", 77, 0)).await.unwrap();
        let tracker = ChainCursorTracker::new(store, Arc::new(ManualClock::new(0)));
        assert_eq!(tracker.get("ethereum").await.unwrap(), Some(77));
        assert!(tracker.advance("ethereum", 77).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_advances_never_decrease() {
        let (tracker, _) = tracker();
        let tracker = Arc::new(tracker);
        let mut handles = vec![];
        for h in 1..=50u64 {
            let t = tracker.clone();
            handles.push(tokio::spawn(async move { t.advance("ethereum", h).await.is_ok() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(tracker.get("ethereum").await.unwrap(), Some(50));
    }
}
