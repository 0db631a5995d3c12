use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Stream of change notifications. Ends when the subscription is closed.
pub type NotificationStream = BoxStream<'static, Notification>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The remote key/value store the flags are read from.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Enables push notifications for mutations on the server.
    async fn configure_change_notifications(&self, keyspace_events: &str)
    -> Result<(), StoreError>;

    /// Subscribes to every channel matching `pattern`.
    async fn subscribe(&self, pattern: &str) -> Result<NotificationStream, StoreError>;

    /// Reads every entry of a namespace.
    async fn fetch_all(&self, namespace: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Reads a single top-level key. `None` if the key does not exist.
    async fn get_one(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// A change event published by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

impl Notification {
    pub fn new<C, P>(channel: C, payload: P) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        Notification {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Returns the namespace embedded in the channel name, ie. the part
    /// after the first `:` of `__keyspace@0__:<namespace>`.
    pub fn namespace(&self) -> Result<&str, MalformedChannel> {
        match self.channel.split_once(':') {
            Some((prefix, namespace)) if !prefix.is_empty() && !namespace.is_empty() => {
                Ok(namespace)
            }
            _ => Err(MalformedChannel(self.channel.clone())),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("malformed notification channel: {0:?}")]
pub struct MalformedChannel(pub String);
