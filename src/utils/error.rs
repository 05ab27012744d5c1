//! The `error` module defines the error types shared across `poprelay`.
//!
//! Each layer of the relay pipeline owns one enum. Store faults are absorbed
//! at the queue boundary, so only `QueueError`, `PublishError` and
//! `DeliveryError` ever reach the edges of the system.

use thiserror::Error;

/// Faults raised by a `ListStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not connected")]
    NotConnected,

    #[error("store connection is closed")]
    Closed,

    #[error("store call exceeded its deadline")]
    Deadline,

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("stored entry is not valid UTF-8")]
    Encoding,

    #[error("stored entry is not a valid message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The only queue fault that propagates to callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue operation timed out")]
    TimedOut,
}

/// Reasons the producer gateway refuses or fails to enqueue a message.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("message is empty")]
    EmptyContent,

    #[error("message is too long ({length} > {max})")]
    ContentTooLong { length: usize, max: usize },

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to publish the message")]
    QueueUnavailable,
}

/// Faults on the consumer-facing delivery channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery channel is not connected")]
    NotConnected,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("delivery failed: {0}")]
    Transport(String),
}
