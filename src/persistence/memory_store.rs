use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{ListStore, StoreConnector};
use crate::utils::error::StoreError;

/// The lists themselves, shared by every connection of one connector.
#[derive(Debug, Default)]
struct Lists {
    entries: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl Lists {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        // A poisoned map is still structurally valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A connection to named lists held in process memory.
#[derive(Debug, Default)]
pub struct MemoryListStore {
    lists: Arc<Lists>,
    closed: AtomicBool,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `key` in head-to-tail order.
    pub fn entries(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.lists.pushed.notify_waiters();
        Ok(())
    }

    async fn ltrim_last(&self, key: &str, keep: usize) -> Result<(), StoreError> {
        self.ensure_open()?;
        if let Some(list) = self.lists.lock().get_mut(key) {
            let excess = list.len().saturating_sub(keep);
            list.drain(..excess);
        }
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;

            // Register for wakeups before looking, so a push in between is not missed.
            let notified = self.lists.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let head = self
                .lists
                .lock()
                .get_mut(key)
                .and_then(|list| list.pop_front());
            if head.is_some() {
                return Ok(head);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        self.ensure_open()?;
        Ok(self.lists.lock().get(key).map(VecDeque::len).unwrap_or(0))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        // Wake blocked pops so they observe the close.
        self.lists.pushed.notify_waiters();
        Ok(())
    }
}

/// Connector for `memory://` targets.
///
/// Every connection it opens shares the same lists, so queued entries
/// outlive a reconnect for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    lists: Arc<Lists>,
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn ListStore>, StoreError> {
        Ok(Arc::new(MemoryListStore {
            lists: self.lists.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn target(&self) -> String {
        "memory://".to_string()
    }
}
