use std::sync::Arc;
use tracing::{debug, error, info};

use crate::queue::BoundedQueue;
use crate::relay::message::Message;
use crate::utils::error::PublishError;

/// Validates inbound messages and commits them to the queue.
#[derive(Debug, Clone)]
pub struct Producer {
    queue: Arc<BoundedQueue>,
    max_content_length: usize,
}

impl Producer {
    pub fn new(queue: Arc<BoundedQueue>, max_content_length: usize) -> Self {
        Self {
            queue,
            max_content_length,
        }
    }

    /// Content must contain something other than whitespace and be at most
    /// `max_content_length` characters long.
    pub fn validate(&self, message: &Message) -> Result<(), PublishError> {
        if message.content.trim().is_empty() {
            return Err(PublishError::EmptyContent);
        }

        let length = message.content.chars().count();
        if length > self.max_content_length {
            return Err(PublishError::ContentTooLong {
                length,
                max: self.max_content_length,
            });
        }

        Ok(())
    }

    /// Validate, serialize and push one message.
    ///
    /// The queue already retried a failed push, so a failure here is final.
    pub async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        self.validate(message)?;

        let serialized = serde_json::to_string(message)?;
        debug!("serialized message: {serialized}");

        if !self.queue.push(&serialized).await {
            error!(queue = %self.queue.name(), "failed to publish a message {serialized}");
            return Err(PublishError::QueueUnavailable);
        }

        let queue_size = self.queue.size().await;
        info!(queue = %self.queue.name(), queue_size, "message queued");
        Ok(())
    }
}
