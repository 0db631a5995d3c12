use crate::accessor;
use crate::cache::{CacheBuilder, FetchError};
use crate::config::{Config, ValidationError};
use crate::decode::Decode;
use crate::listener::{ChangeListener, ListenerHandle};
use crate::percentage;
use crate::redis_store::RedisStore;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::store::{StoreConnector, StoreError};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("failed to connect to the feature toggle store: {0}")]
    Connection(#[source] StoreError),

    #[error("failed to enable change notifications: {0}")]
    Notifications(#[source] StoreError),

    #[error("failed to subscribe to change notifications: {0}")]
    Subscription(#[source] StoreError),

    #[error("initial fetch failed: {0}")]
    InitialFetch(#[from] FetchError),
}

struct FeatureToggleInner {
    namespace: String,
    snapshots: Arc<SnapshotStore>,
    // None when built from fixed values
    listener: Option<ListenerHandle>,
}

/// Serves the flags of one namespace from a local snapshot that follows
/// remote changes.
///
/// Reads never touch the network and never fail: when a flag is missing or
/// cannot be read as the requested type the caller's default is returned.
#[derive(Clone)]
pub struct FeatureToggle {
    inner: Arc<FeatureToggleInner>,
}

impl FeatureToggle {
    /// Connects to Redis and starts serving `config.service_name`.
    ///
    /// Fails if the server cannot be reached, notifications cannot be
    /// enabled or subscribed to, or the first fetch fails.
    pub async fn init(config: &Config) -> Result<Self, InitError> {
        config.validate()?;

        let store = RedisStore::connect(&config.host, config.port, config.db)
            .await
            .map_err(InitError::Connection)?;

        Self::with_connector(Arc::new(store), config).await
    }

    /// Like [`FeatureToggle::init`] over an already connected store.
    pub async fn with_connector(
        connector: Arc<dyn StoreConnector>,
        config: &Config,
    ) -> Result<Self, InitError> {
        config.validate()?;

        if config.notifications.configure {
            connector
                .configure_change_notifications(&config.notifications.keyspace_events)
                .await
                .map_err(InitError::Notifications)?;
        }

        // Subscribe before the first fetch so that no change made in between is missed.
        let notifications = connector
            .subscribe(&config.subscription_pattern())
            .await
            .map_err(InitError::Subscription)?;

        let snapshots = Arc::new(SnapshotStore::new());
        let builder = Arc::new(CacheBuilder::new(
            connector,
            config.service_name.clone(),
            snapshots.clone(),
        ));
        let snapshot = builder.rebuild().await?;

        let listener = ChangeListener::new(builder, config.notifications.mutation_markers.clone())
            .spawn(notifications);

        tracing::info!(
            service = %config.service_name,
            entries = snapshot.len(),
            "Feature toggle started"
        );

        Ok(FeatureToggle {
            inner: Arc::new(FeatureToggleInner {
                namespace: config.service_name.clone(),
                snapshots,
                listener: Some(listener),
            }),
        })
    }

    /// Serves a fixed mapping, with no store and no updates.
    pub fn from_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let snapshots = Arc::new(SnapshotStore::new());
        snapshots.install(Snapshot::from_iter(values));

        FeatureToggle {
            inner: Arc::new(FeatureToggleInner {
                namespace: String::new(),
                snapshots,
                listener: None,
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The current snapshot. Use it to make several reads against the same
    /// point in time.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshots.load()
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot().map_or(0, |s| s.len())
    }

    /// True once a snapshot has been installed.
    pub fn is_ready(&self) -> bool {
        self.inner.snapshots.is_initiated()
    }

    /// True while remote changes are being followed.
    pub fn is_listening(&self) -> bool {
        self.inner
            .listener
            .as_ref()
            .is_some_and(ListenerHandle::is_running)
    }

    /// Boolean flag, tagged `boolean`.
    pub fn is_enabled(&self, key: &str, default: bool) -> bool {
        accessor::is_enabled(self.snapshot().as_deref(), key, default)
    }

    /// String flag, tagged `string`. Returned verbatim.
    pub fn get_string(&self, key: &str, default: impl Into<String>) -> String {
        accessor::get_string(self.snapshot().as_deref(), key, default.into())
    }

    /// Number flag, tagged `number`.
    pub fn get_number(&self, key: &str, default: f64) -> f64 {
        accessor::get_number(self.snapshot().as_deref(), key, default)
    }

    /// Untagged flag decoded into `T`. See [`Decode`].
    pub fn get<T: Decode>(&self, key: &str, default: T) -> T {
        accessor::get(self.snapshot().as_deref(), key, default)
    }

    /// Rollout gate over a `number` flag holding a percentage in `0..=100`.
    /// Each call draws independently. `false` whenever the flag is unusable.
    pub fn is_enabled_by_percent(&self, key: &str) -> bool {
        percentage::is_enabled_by_percent(self.snapshot().as_deref(), key)
    }

    /// Rebuilds the snapshot now and waits for the outcome.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        match &self.inner.listener {
            Some(listener) => listener.refresh().await,
            None => Err(FetchError::ListenerStopped),
        }
    }

    /// Stops following remote changes. The last snapshot keeps being served.
    pub async fn shutdown(&self) {
        if let Some(listener) = &self.inner.listener {
            listener.shutdown().await;
        }
    }
}
