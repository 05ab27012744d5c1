//! The `persistence` module is the ordered-list store behind the relay queue.
//!
//! The queue only ever talks to a [`ListStore`]: append at the tail, trim to
//! the newest entries, blocking pop from the head, and length. Connections
//! are opened through a [`StoreConnector`], chosen from the configured
//! connection target:
//!
//! - `memory://` keeps lists in process memory ([`MemoryListStore`]).
//! - `sled://<path>` or a bare path opens an embedded `sled` database
//!   ([`SledListStore`]), which survives restarts.

pub mod memory_store;
pub mod sled_store;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::utils::error::StoreError;

pub use memory_store::{MemoryConnector, MemoryListStore};
pub use sled_store::{SledConnector, SledListStore};

/// A connection to a store of named FIFO lists.
///
/// Every method is a single store-side operation; concurrent callers are
/// serialized by the backend.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append `value` to the tail of `key`.
    async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Drop entries from the head of `key` until at most `keep` remain.
    async fn ltrim_last(&self, key: &str, keep: usize) -> Result<(), StoreError>;

    /// Remove and return the head of `key`, waiting up to `timeout` for one to arrive.
    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    async fn llen(&self, key: &str) -> Result<usize, StoreError>;

    /// Release the connection. Later calls fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

/// Opens connections to a store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ListStore>, StoreError>;

    /// Human readable target, for logs.
    fn target(&self) -> String;
}

/// A parsed `store_connection_target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Memory,
    Sled(String),
}

impl StoreTarget {
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        if target == "memory://" || target == "memory" {
            StoreTarget::Memory
        } else if let Some(path) = target.strip_prefix("sled://") {
            StoreTarget::Sled(path.to_string())
        } else {
            StoreTarget::Sled(target.to_string())
        }
    }

    pub fn connector(&self) -> Arc<dyn StoreConnector> {
        match self {
            StoreTarget::Memory => Arc::new(MemoryConnector::default()),
            StoreTarget::Sled(path) => Arc::new(SledConnector::new(path)),
        }
    }
}
