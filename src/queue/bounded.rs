use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::QueueSettings;
use crate::persistence::{ListStore, StoreConnector};
use crate::relay::message::Message;
use crate::utils::error::{QueueError, StoreError};

/// Runtime parameters of a [`BoundedQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    /// Total attempts for `connect` and `push`, not extra retries.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_size: usize,
    /// Default wait used by consumers calling [`BoundedQueue::pop`].
    pub pop_timeout: Duration,
    /// Upper bound on a single store call. A pop may take this long past its own timeout.
    pub command_timeout: Duration,
}

impl QueueConfig {
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            name: settings.name.clone(),
            max_retries: settings.max_retries,
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            max_size: settings.max_queue_size,
            pop_timeout: Duration::from_secs(settings.pop_timeout_secs),
            command_timeout: Duration::from_secs(settings.command_timeout_secs),
        }
    }
}

/// Everything a single pop can end in.
#[derive(Debug)]
pub enum PopOutcome {
    Message(Message),
    /// Nothing arrived within the wait.
    Empty,
    /// The store failed, was not connected, or held an entry that is not a message.
    Failed(StoreError),
    /// The store call itself overran its deadline.
    TimedOut,
}

/// A FIFO queue capped at `max_size` entries, stored under one name in a [`ListStore`].
///
/// Pushing past the cap silently evicts the oldest entries.
pub struct BoundedQueue {
    config: QueueConfig,
    connector: Arc<dyn StoreConnector>,
    store: RwLock<Option<Arc<dyn ListStore>>>,
}

impl BoundedQueue {
    pub fn new(config: QueueConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            store: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub async fn is_connected(&self) -> bool {
        self.store.read().await.is_some()
    }

    /// Open the store connection, trying up to `max_retries` times.
    ///
    /// Returns `false` and leaves the queue disconnected when every attempt fails.
    pub async fn connect(&self) -> bool {
        if self.is_connected().await {
            debug!(queue = %self.config.name, "store already connected");
            return true;
        }

        let max = self.config.max_retries;
        for attempt in 1..=max {
            match self.guarded(self.connector.connect()).await {
                Ok(store) => {
                    *self.store.write().await = Some(store);
                    info!(
                        queue = %self.config.name,
                        target = %self.connector.target(),
                        attempt,
                        "connected to store"
                    );
                    return true;
                }
                Err(e) => {
                    error!(queue = %self.config.name, attempt, "store connection failed: {e}");
                    self.pause_before_retry(attempt).await;
                }
            }
        }

        error!(queue = %self.config.name, "all {max} connection attempts failed");
        *self.store.write().await = None;
        false
    }

    /// Close the store connection. `false` if there was none or closing failed.
    pub async fn disconnect(&self) -> bool {
        let taken = self.store.write().await.take();
        let Some(store) = taken else {
            error!(queue = %self.config.name, "store is not connected");
            return false;
        };

        match self.guarded(store.close()).await {
            Ok(()) => {
                info!(queue = %self.config.name, "disconnected from store");
                true
            }
            Err(e) => {
                error!(queue = %self.config.name, "failed to disconnect from store: {e}");
                false
            }
        }
    }

    /// Append a serialized message and trim the queue to `max_size`.
    ///
    /// Store faults are retried up to `max_retries` attempts in total. Once
    /// the append has gone through, later attempts only retry the trim, so a
    /// retry never queues the same entry twice.
    pub async fn push(&self, serialized: &str) -> bool {
        let max = self.config.max_retries;
        let mut appended = false;

        for attempt in 1..=max {
            match self.try_push(serialized, &mut appended).await {
                Ok(()) => {
                    info!(queue = %self.config.name, attempt, "produced a message: {serialized}");
                    return true;
                }
                Err(e) => {
                    error!(
                        queue = %self.config.name,
                        attempt,
                        appended,
                        "failed to push a message: {e}"
                    );
                    self.pause_before_retry(attempt).await;
                }
            }
        }

        if appended {
            warn!(
                queue = %self.config.name,
                "message was appended but the queue was not trimmed; the bound is restored on the next push"
            );
        }
        error!(queue = %self.config.name, "all {max} push attempts failed");
        false
    }

    async fn try_push(&self, serialized: &str, appended: &mut bool) -> Result<(), StoreError> {
        let store = self.handle().await?;
        if !*appended {
            self.guarded(store.rpush(&self.config.name, serialized)).await?;
            *appended = true;
            debug!(queue = %self.config.name, "appended entry");
        }
        self.guarded(store.ltrim_last(&self.config.name, self.config.max_size))
            .await
    }

    /// Pop the head of the queue, waiting up to `timeout` for an entry.
    ///
    /// An empty queue and a failing store both yield `Ok(None)`. Only a store
    /// call that overruns its deadline is returned as [`QueueError::TimedOut`].
    /// Nothing is retried here; the caller's polling loop is the retry.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<Message>, QueueError> {
        match self.pop_outcome(timeout).await {
            PopOutcome::Message(message) => Ok(Some(message)),
            PopOutcome::Empty | PopOutcome::Failed(_) => Ok(None),
            PopOutcome::TimedOut => Err(QueueError::TimedOut),
        }
    }

    /// Like [`pop`](Self::pop), but keeps every outcome apart.
    pub async fn pop_outcome(&self, timeout: Duration) -> PopOutcome {
        let store = match self.handle().await {
            Ok(store) => store,
            Err(e) => {
                error!(queue = %self.config.name, "failed to pop a message: {e}");
                return PopOutcome::Failed(e);
            }
        };

        let deadline = timeout + self.config.command_timeout;
        let raw = match tokio::time::timeout(deadline, store.blpop(&self.config.name, timeout)).await
        {
            Err(_) => {
                warn!(queue = %self.config.name, ?deadline, "pop overran its deadline");
                return PopOutcome::TimedOut;
            }
            Ok(Err(e)) => {
                error!(queue = %self.config.name, "failed to pop a message: {e}");
                return PopOutcome::Failed(e);
            }
            Ok(Ok(None)) => {
                debug!(queue = %self.config.name, "no message found in queue");
                return PopOutcome::Empty;
            }
            Ok(Ok(Some(raw))) => raw,
        };

        match serde_json::from_str::<Message>(&raw) {
            Ok(message) => {
                info!(queue = %self.config.name, "consumed a message: {raw}");
                PopOutcome::Message(message)
            }
            Err(e) => {
                error!(queue = %self.config.name, "dropping undecodable entry {raw}: {e}");
                PopOutcome::Failed(StoreError::Malformed(e))
            }
        }
    }

    /// Current number of entries; `0` when the store cannot be reached.
    pub async fn size(&self) -> usize {
        let len = match self.handle().await {
            Ok(store) => self.guarded(store.llen(&self.config.name)).await,
            Err(e) => Err(e),
        };
        len.unwrap_or_else(|e| {
            error!(queue = %self.config.name, "failed to get queue size: {e}");
            0
        })
    }

    async fn handle(&self) -> Result<Arc<dyn ListStore>, StoreError> {
        self.store
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.config.command_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Deadline))
    }

    async fn pause_before_retry(&self, attempt: u32) {
        if attempt < self.config.max_retries {
            info!(queue = %self.config.name, "retrying in {:?}", self.config.retry_delay);
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("config", &self.config)
            .field("target", &self.connector.target())
            .finish()
    }
}
