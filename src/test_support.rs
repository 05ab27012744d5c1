//! Scripted doubles for the store and the delivery channel.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::persistence::{ListStore, MemoryListStore, StoreConnector};
use crate::queue::{BoundedQueue, QueueConfig};
use crate::relay::session::DeliveryChannel;
use crate::utils::error::{DeliveryError, StoreError};

pub const QUEUE: &str = "test_queue";

/// Queue settings with millisecond delays.
pub fn queue_config(max_retries: u32, max_size: usize) -> QueueConfig {
    QueueConfig {
        name: QUEUE.to_string(),
        max_retries,
        retry_delay: Duration::from_millis(20),
        max_size,
        pop_timeout: Duration::from_millis(20),
        command_timeout: Duration::from_millis(200),
    }
}

/// A connected queue over a fresh [`ScriptedStore`].
pub async fn connected_queue(max_retries: u32, max_size: usize) -> (Arc<BoundedQueue>, Arc<ScriptedStore>) {
    let connector = ScriptedConnector::new(0);
    let store = connector.store.clone();
    let queue = Arc::new(BoundedQueue::new(
        queue_config(max_retries, max_size),
        Arc::new(connector),
    ));
    assert!(queue.connect().await);
    (queue, store)
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// An in-memory store whose next calls can be made to fail or hang.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    pub inner: MemoryListStore,
    pub failing_pushes: AtomicUsize,
    pub failing_trims: AtomicUsize,
    pub failing_pops: AtomicUsize,
    pub hang_pops: AtomicBool,
    pub fail_llen: AtomicBool,
    pub fail_close: AtomicBool,
    pub push_calls: AtomicUsize,
    pub trim_calls: AtomicUsize,
    pub pop_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn entries(&self) -> Vec<String> {
        self.inner.entries(QUEUE)
    }

    pub fn pushes(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pops(&self) -> usize {
        self.pop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListStore for ScriptedStore {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_pushes) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.rpush(key, value).await
    }

    async fn ltrim_last(&self, key: &str, keep: usize) -> Result<(), StoreError> {
        self.trim_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_trims) {
            return Err(StoreError::Unavailable("broken pipe".to_string()));
        }
        self.inner.ltrim_last(key, keep).await
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        self.pop_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_pops.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if take_failure(&self.failing_pops) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.blpop(key, timeout).await
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        if self.fail_llen.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.llen(key).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("close failed".to_string()));
        }
        self.inner.close().await
    }
}

/// Hands out one shared [`ScriptedStore`] after a number of refused attempts.
#[derive(Debug)]
pub struct ScriptedConnector {
    pub store: Arc<ScriptedStore>,
    pub refusals: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(refusals: usize) -> Self {
        Self {
            store: Arc::new(ScriptedStore::default()),
            refusals: AtomicUsize::new(refusals),
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StoreConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Arc<dyn ListStore>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.refusals) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(self.store.clone())
    }

    fn target(&self) -> String {
        "scripted://".to_string()
    }
}

/// What a [`ScriptedChannel`] observed, shared with the test.
#[derive(Debug, Default)]
pub struct ChannelLog {
    pub frames: Mutex<Vec<String>>,
    pub reconnects: AtomicUsize,
    pub closed: AtomicBool,
}

impl ChannelLog {
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

/// A delivery channel that follows a script of outcomes.
///
/// `deliveries` and `reconnects` are consumed front to back; once empty,
/// every further call succeeds.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    pub handshake_fails: bool,
    pub deliveries: VecDeque<bool>,
    pub reconnect_results: VecDeque<bool>,
    pub log: Arc<ChannelLog>,
}

impl ScriptedChannel {
    pub fn healthy() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    async fn handshake(&mut self) -> Result<(), DeliveryError> {
        if self.handshake_fails {
            return Err(DeliveryError::Handshake("upgrade refused".to_string()));
        }
        Ok(())
    }

    async fn deliver(&mut self, frame: &str) -> Result<(), DeliveryError> {
        if !self.deliveries.pop_front().unwrap_or(true) {
            return Err(DeliveryError::Transport("connection closed".to_string()));
        }
        self.log.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), DeliveryError> {
        self.log.reconnects.fetch_add(1, Ordering::SeqCst);
        if !self.reconnect_results.pop_front().unwrap_or(true) {
            return Err(DeliveryError::NotConnected);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}
