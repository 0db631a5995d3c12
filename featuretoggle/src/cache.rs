use crate::metrics_defs::{
    CACHE_REBUILD_DURATION, CACHE_REBUILD_FAILURE, CACHE_REBUILD_SUCCESS, SNAPSHOT_ENTRIES,
};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::store::{StoreConnector, StoreError};
use shared::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to fetch namespace {namespace}: {source}")]
    Store {
        namespace: String,
        #[source]
        source: StoreError,
    },
    #[error("another rebuild is in progress")]
    ConcurrentLoad,
    #[error("the change listener is not running")]
    ListenerStopped,
}

/// Fetches a whole namespace and installs it as the current snapshot.
pub struct CacheBuilder {
    connector: Arc<dyn StoreConnector>,
    namespace: String,
    snapshots: Arc<SnapshotStore>,
    update_lock: Semaphore,
}

impl CacheBuilder {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        namespace: String,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        CacheBuilder {
            connector,
            namespace,
            snapshots,
            update_lock: Semaphore::new(1),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Performs one full fetch. On success the fetched entries replace the
    /// previous snapshot entirely; on failure the previous snapshot is kept.
    pub async fn rebuild(&self) -> Result<Arc<Snapshot>, FetchError> {
        // Hold permit for the duration of this function
        let _permit = self.get_permit()?;
        let start = Instant::now();

        let entries = match self.connector.fetch_all(&self.namespace).await {
            Ok(entries) => entries,
            Err(source) => {
                counter!(CACHE_REBUILD_FAILURE).increment(1);
                return Err(FetchError::Store {
                    namespace: self.namespace.clone(),
                    source,
                });
            }
        };

        let snapshot = self.snapshots.install(Snapshot::new(entries));

        histogram!(CACHE_REBUILD_DURATION).record(start.elapsed().as_secs_f64());
        gauge!(SNAPSHOT_ENTRIES).set(snapshot.len() as f64);
        counter!(CACHE_REBUILD_SUCCESS).increment(1);
        tracing::debug!(
            namespace = %self.namespace,
            entries = snapshot.len(),
            "Installed snapshot"
        );

        Ok(snapshot)
    }

    /// Guard that ensures only one rebuild is in progress at a time. A
    /// second caller is rejected rather than queued.
    fn get_permit(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        self.update_lock
            .try_acquire()
            .map_err(|_| FetchError::ConcurrentLoad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MemoryStore;

    fn builder(store: Arc<MemoryStore>) -> (CacheBuilder, Arc<SnapshotStore>) {
        let snapshots = Arc::new(SnapshotStore::new());
        let builder = CacheBuilder::new(store, "checkout".into(), snapshots.clone());
        (builder, snapshots)
    }

    #[tokio::test]
    async fn test_rebuild_installs_snapshot() {
        let store = Arc::new(MemoryStore::with_namespace(
            "checkout",
            [("Flag", "1"), ("Flag.type", "boolean")],
        ));
        let (builder, snapshots) = builder(store);

        let snapshot = builder.rebuild().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshots.load().unwrap().get("Flag"), Some("1"));
    }

    #[tokio::test]
    async fn test_rebuild_drops_removed_keys() {
        let store = Arc::new(MemoryStore::with_namespace(
            "checkout",
            [("Old", "x"), ("Kept", "y")],
        ));
        let (builder, snapshots) = builder(store.clone());
        builder.rebuild().await.unwrap();

        store.hdel("checkout", "Old");
        builder.rebuild().await.unwrap();

        let snapshot = snapshots.load().unwrap();
        assert_eq!(snapshot.get("Old"), None);
        assert_eq!(snapshot.get("Kept"), Some("y"));
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_snapshot() {
        let store = Arc::new(MemoryStore::with_namespace("checkout", [("Kept", "y")]));
        let (builder, snapshots) = builder(store.clone());
        builder.rebuild().await.unwrap();

        store.hset_silent("checkout", "Kept", "z");
        store.set_fail_fetch(true);
        let err = builder.rebuild().await.unwrap_err();
        assert!(matches!(err, FetchError::Store { ref namespace, .. } if namespace == "checkout"));

        assert_eq!(snapshots.load().unwrap().get("Kept"), Some("y"));
    }

    #[tokio::test]
    async fn test_failed_first_rebuild_leaves_store_uninitiated() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_fetch(true);
        let (builder, snapshots) = builder(store);

        assert!(builder.rebuild().await.is_err());
        assert!(!snapshots.is_initiated());
    }

    #[tokio::test]
    async fn test_concurrent_rebuild_is_rejected() {
        let store = Arc::new(MemoryStore::with_namespace("checkout", [("Flag", "1")]));
        let (builder, snapshots) = builder(store.clone());
        builder.rebuild().await.unwrap();

        store.hset_silent("checkout", "Flag", "2");
        let permit = builder.get_permit().unwrap();
        assert!(matches!(
            builder.rebuild().await,
            Err(FetchError::ConcurrentLoad)
        ));
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(snapshots.load().unwrap().get("Flag"), Some("1"));

        drop(permit);
        builder.rebuild().await.unwrap();
        assert_eq!(snapshots.load().unwrap().get("Flag"), Some("2"));
    }

    #[tokio::test]
    async fn test_missing_namespace_is_empty_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let (builder, snapshots) = builder(store);

        builder.rebuild().await.unwrap();
        assert!(snapshots.is_initiated());
        assert!(snapshots.load().unwrap().is_empty());
    }
}
