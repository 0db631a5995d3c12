use crate::store::{Notification, NotificationStream, StoreConnector, StoreError};
use async_trait::async_trait;
use futures::StreamExt;
use futures::future;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;

/// Store connector backed by a Redis server. Flags for a namespace are the
/// fields of a hash named after the namespace.
pub struct RedisStore {
    client: redis::Client,
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Opens a connection and checks that the server answers.
    pub async fn connect(host: &str, port: u16, db: i64) -> Result<Self, StoreError> {
        let client = redis::Client::open(format!("redis://{host}:{port}/{db}"))?;
        let mut connection = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        tracing::info!(host, port, db, "Connected to redis");

        Ok(RedisStore { client, connection })
    }
}

#[async_trait]
impl StoreConnector for RedisStore {
    async fn configure_change_notifications(
        &self,
        keyspace_events: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(keyspace_events)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<NotificationStream, StoreError> {
        // Pub/sub needs a dedicated connection; it cannot share the multiplexed one.
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        tracing::info!(pattern, "Subscribed to keyspace notifications");

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| future::ready(to_notification(&msg)));

        Ok(stream.boxed())
    }

    async fn fetch_all(&self, namespace: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.connection.clone();
        let entries: HashMap<String, String> = conn.hgetall(namespace).await?;
        Ok(entries)
    }

    async fn get_one(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}

fn to_notification(msg: &redis::Msg) -> Option<Notification> {
    match msg.get_payload::<String>() {
        Ok(payload) => Some(Notification::new(msg.get_channel_name(), payload)),
        Err(e) => {
            tracing::warn!(
                channel = msg.get_channel_name(),
                error = %e,
                "Dropping notification with unreadable payload"
            );
            None
        }
    }
}
