use crate::cache::{CacheBuilder, FetchError};
use crate::metrics_defs::{NOTIFICATION_IGNORED, NOTIFICATION_MALFORMED};
use crate::store::{Notification, NotificationStream};
use futures::StreamExt;
use parking_lot::Mutex;
use shared::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum Command {
    // Rebuild the snapshot now, outside of any notification.
    // The worker replies with the outcome once the attempt finishes.
    Refresh(oneshot::Sender<Result<(), FetchError>>),
    // Stop listening. Dropping the stream closes the subscription.
    Shutdown,
}

/// What the listener did with a single notification.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Rebuilt,
    RebuildFailed,
    Ignored,
    Malformed,
}

/// Consumes change notifications and rebuilds the snapshot when the
/// configured namespace is mutated.
pub struct ChangeListener {
    builder: Arc<CacheBuilder>,
    mutation_markers: Vec<String>,
    running: Arc<AtomicBool>,
}

impl ChangeListener {
    pub fn new(builder: Arc<CacheBuilder>, mutation_markers: Vec<String>) -> Self {
        ChangeListener {
            builder,
            mutation_markers,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the listener on the current runtime.
    pub fn spawn(self, notifications: NotificationStream) -> ListenerHandle {
        let (tx, rx) = mpsc::channel::<Command>(16);
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(self.run(notifications, rx));

        ListenerHandle {
            tx,
            handle: Mutex::new(Some(handle)),
            running,
        }
    }

    /// Runs until the notification stream ends, the Shutdown command is
    /// received, or every command sender is dropped. There is no restart:
    /// once stopped, the last installed snapshot keeps being served.
    async fn run(self, mut notifications: NotificationStream, mut rx: mpsc::Receiver<Command>) {
        let _running = RunningGuard(self.running.clone());
        let namespace = self.builder.namespace().to_string();
        tracing::info!(namespace = %namespace, "Change listener started");

        loop {
            tokio::select! {
                biased;

                cmd = rx.recv() => match cmd {
                    Some(Command::Refresh(reply)) => {
                        let result = self.builder.rebuild().await.map(|_| ());
                        if let Err(e) = &result {
                            tracing::error!(error = %e, "Requested refresh failed");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!(namespace = %namespace, "Change listener shutting down");
                        break;
                    }
                },
                notification = notifications.next() => match notification {
                    Some(notification) => {
                        self.handle(notification).await;
                    }
                    None => {
                        tracing::warn!(
                            namespace = %namespace,
                            "Notification stream closed, no further updates will be received"
                        );
                        break;
                    }
                },
            }
        }
    }

    pub async fn handle(&self, notification: Notification) -> Outcome {
        let namespace = match notification.namespace() {
            Ok(namespace) => namespace,
            Err(e) => {
                // Skip this message only; the listener keeps running
                tracing::warn!(payload = %notification.payload, "{e}");
                counter!(NOTIFICATION_MALFORMED).increment(1);
                return Outcome::Malformed;
            }
        };

        if namespace != self.builder.namespace() || !self.is_mutation(&notification.payload) {
            tracing::trace!(
                channel = %notification.channel,
                payload = %notification.payload,
                "Ignoring notification"
            );
            counter!(NOTIFICATION_IGNORED).increment(1);
            return Outcome::Ignored;
        }

        match self.builder.rebuild().await {
            Ok(snapshot) => {
                tracing::info!(
                    namespace,
                    operation = %notification.payload,
                    entries = snapshot.len(),
                    "Rebuilt snapshot after change notification"
                );
                Outcome::Rebuilt
            }
            Err(e) => {
                tracing::error!(
                    namespace,
                    error = %e,
                    "Failed to rebuild snapshot, serving the previous one"
                );
                Outcome::RebuildFailed
            }
        }
    }

    fn is_mutation(&self, payload: &str) -> bool {
        self.mutation_markers.iter().any(|marker| marker == payload)
    }
}

// Clears the running flag however the listener task ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Control side of a spawned listener. Dropping it stops the listener.
pub struct ListenerHandle {
    tx: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl ListenerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the listener to rebuild and waits for the outcome.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Refresh(reply_tx))
            .await
            .map_err(|_| FetchError::ListenerStopped)?;
        reply_rx.await.map_err(|_| FetchError::ListenerStopped)?
    }

    /// Stops the listener and waits for the task to finish. Calling it
    /// again after the task has been joined does nothing.
    pub async fn shutdown(&self) {
        // The listener may already have stopped on its own
        let _ = self.tx.send(Command::Shutdown).await;

        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!("Change listener task panicked: {e}");
        }
    }
}
