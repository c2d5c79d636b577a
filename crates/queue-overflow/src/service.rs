//! Capabilities carried by every resolved message.
//!
//! A [`Service`] holds the client factories and identifiers a stream was
//! opened with, so follow-up operations on a message can run after the
//! stream itself is gone. Each operation acquires fresh clients and shuts
//! them down before returning.

use crate::client::QueueServiceFactory;
use crate::config::OverflowMode;
use crate::error::{ConfigurationError, StreamError};
use crate::lease::ClientLease;
use crate::message::{BucketName, ObjectKey, QueueName, ResolvedMessage};
use crate::send::{send_via_store, SendOptions};
use bytes::Bytes;
use tracing::debug;

/// Queue and overflow-store capabilities of one stream configuration
#[derive(Clone)]
pub struct Service {
    queue_name: QueueName,
    queue_factory: QueueServiceFactory,
    overflow: OverflowMode,
}

impl Service {
    pub(crate) fn new(
        queue_name: QueueName,
        queue_factory: QueueServiceFactory,
        overflow: OverflowMode,
    ) -> Self {
        Self {
            queue_name,
            queue_factory,
            overflow,
        }
    }

    /// Queue the stream reads from
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Overflow bucket, when payloads are stored out of band
    pub fn bucket_name(&self) -> Option<&BucketName> {
        match &self.overflow {
            OverflowMode::Inline => None,
            OverflowMode::Overflow { bucket, .. } => Some(bucket),
        }
    }

    /// Delete a message: its overflow object first (if any), then the queue
    /// entry
    pub async fn delete_message(&self, message: &ResolvedMessage) -> Result<(), StreamError> {
        let queue = ClientLease::new((self.queue_factory)()?, "queue");

        if let (Some(key), OverflowMode::Overflow {
            bucket,
            store_factory,
        }) = (message.overflow_key(), &self.overflow)
        {
            let store = ClientLease::new(store_factory()?, "object_store");
            store.delete_object(bucket, key).await?;
            debug!(bucket = %bucket, key = %key, "Deleted overflow object");
        }

        let queue_url = queue.get_queue_url(&self.queue_name).await?;
        queue
            .delete_message(&queue_url, message.receipt_handle())
            .await?;
        debug!(
            queue = %self.queue_name,
            receipt = %message.receipt_handle(),
            "Deleted queue message"
        );
        Ok(())
    }

    /// Upload a payload to the overflow bucket and enqueue a pointer to it
    ///
    /// Only available when the service was configured with an overflow
    /// bucket.
    pub async fn send(&self, payload: Bytes, options: &SendOptions) -> Result<ObjectKey, StreamError> {
        let OverflowMode::Overflow {
            bucket,
            store_factory,
        } = &self.overflow
        else {
            return Err(ConfigurationError::Missing {
                key: "bucket_name".to_string(),
            }
            .into());
        };

        // Declared first so it outlives the store lease and is released last.
        let queue = ClientLease::new((self.queue_factory)()?, "queue");
        let store = ClientLease::new(store_factory()?, "object_store");

        let queue_url = queue.get_queue_url(&self.queue_name).await?;
        send_via_store(&*queue, &queue_url, &*store, bucket, payload, options).await
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("queue_name", &self.queue_name)
            .field("bucket_name", &self.bucket_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
