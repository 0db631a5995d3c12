use crate::store::{Notification, NotificationStream, StoreConnector, StoreError};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory store connector. Namespaces are hashes of entries; mutations
/// made through `hset`/`hdel` publish keyspace notifications for db 0 to
/// every open subscription.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, HashMap<String, String>>>,
    keys: Mutex<HashMap<String, String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Notification>>>,
    configured_events: Mutex<Option<String>>,
    fail_fetch: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_configure: AtomicBool,
    panic_on_fetch: AtomicBool,
    fetch_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace<K, V>(namespace: &str, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store.replace_namespace(namespace, entries);
        store
    }

    /// Replaces every entry of a namespace at once, without publishing.
    pub fn replace_namespace<K, V>(&self, namespace: &str, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.namespaces.lock().insert(
            namespace.to_string(),
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
    }

    pub fn set_key(&self, key: &str, value: &str) {
        self.keys.lock().insert(key.into(), value.into());
    }

    /// Sets a field without publishing a notification.
    pub fn hset_silent(&self, namespace: &str, field: &str, value: &str) {
        self.namespaces
            .lock()
            .entry(namespace.into())
            .or_default()
            .insert(field.into(), value.into());
    }

    pub fn hset(&self, namespace: &str, field: &str, value: &str) {
        self.hset_silent(namespace, field, value);
        self.publish(Notification::new(
            format!("__keyspace@0__:{namespace}"),
            "hset",
        ));
    }

    pub fn hdel(&self, namespace: &str, field: &str) {
        if let Some(entries) = self.namespaces.lock().get_mut(namespace) {
            entries.remove(field);
        }
        self.publish(Notification::new(
            format!("__keyspace@0__:{namespace}"),
            "hdel",
        ));
    }

    pub fn publish(&self, notification: Notification) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }

    /// Ends every open notification stream.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().retain(|tx| !tx.is_closed());
        self.subscribers.lock().len()
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_configure(&self, fail: bool) {
        self.fail_configure.store(fail, Ordering::SeqCst);
    }

    pub fn set_panic_on_fetch(&self, panic: bool) {
        self.panic_on_fetch.store(panic, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn configured_events(&self) -> Option<String> {
        self.configured_events.lock().clone()
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn configure_change_notifications(
        &self,
        keyspace_events: &str,
    ) -> Result<(), StoreError> {
        if self.fail_configure.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("CONFIG is disabled".into()));
        }
        *self.configured_events.lock() = Some(keyspace_events.into());
        Ok(())
    }

    async fn subscribe(&self, _pattern: &str) -> Result<NotificationStream, StoreError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("subscribe refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|notification| (notification, rx))
        });
        Ok(stream.boxed())
    }

    async fn fetch_all(&self, namespace: &str) -> Result<HashMap<String, String>, StoreError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_fetch.load(Ordering::SeqCst) {
            panic!("fetch_all panicked");
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(self
            .namespaces
            .lock()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_one(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(self.keys.lock().get(key).cloned())
    }
}

/// Polls `condition` until it holds, panicking after one second.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
