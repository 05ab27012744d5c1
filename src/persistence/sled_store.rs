//! List store backed by `sled`
//!
//! Each queue name maps to its own `sled` tree. Entry keys are ids from
//! `Db::generate_id`, stored big-endian, so tree order is push order: the
//! head of the list is the tree minimum and the tail is the maximum.
//!
//! `sled` is embedded, so blocking pops are woken by an in-process
//! `Notify` rather than by the database.

use async_trait::async_trait;
use sled::{Db, Tree};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::{ListStore, StoreConnector};
use crate::utils::error::StoreError;

pub struct SledListStore {
    db: Db,
    pushed: Arc<Notify>,
    closed: AtomicBool,
}

impl SledListStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self::with_db(sled::open(path)?))
    }

    /// A throwaway database, removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        Ok(Self::with_db(sled::Config::new().temporary(true).open()?))
    }

    fn with_db(db: Db) -> Self {
        Self {
            db,
            pushed: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn tree(&self, key: &str) -> Result<Tree, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(self.db.open_tree(key)?)
    }

    fn pop_head(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.tree(key)?.pop_min()? {
            Some((_, value)) => String::from_utf8(value.to_vec())
                .map(Some)
                .map_err(|_| StoreError::Encoding),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ListStore for SledListStore {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let tree = self.tree(key)?;
        let id = self.db.generate_id()?;
        tree.insert(id.to_be_bytes(), value.as_bytes())?;
        self.pushed.notify_waiters();
        Ok(())
    }

    /// Removes every key up to the newest one outside the last `keep`.
    ///
    /// Keys that a concurrent pop or trim already removed are skipped, and
    /// keys pushed after the boundary was read are never touched.
    async fn ltrim_last(&self, key: &str, keep: usize) -> Result<(), StoreError> {
        let tree = self.tree(key)?;
        let Some((boundary, _)) = tree.iter().rev().nth(keep).transpose()? else {
            return Ok(());
        };

        let mut evicted = 0usize;
        for entry in tree.range(..=boundary) {
            let (id, _) = entry?;
            if tree.remove(id)?.is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(queue = key, evicted, "trimmed oldest entries");
        }
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop_head(key)? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.tree(key)?.len())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.pushed.notify_waiters();
        self.db.flush_async().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SledListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledListStore")
            .field("db", &"sled::Db")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Connector for `sled://<path>` targets.
#[derive(Debug, Clone)]
pub struct SledConnector {
    path: String,
}

impl SledConnector {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl StoreConnector for SledConnector {
    async fn connect(&self) -> Result<Arc<dyn ListStore>, StoreError> {
        let path = self.path.clone();
        let store = tokio::task::spawn_blocking(move || SledListStore::open(&path))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))??;
        Ok(Arc::new(store))
    }

    fn target(&self) -> String {
        format!("sled://{}", self.path)
    }
}
