//! Overflow payload resolution.
//!
//! Turns a [`RawMessage`] into a [`ResolvedMessage`]. In inline mode the body
//! is the payload. In overflow mode the body is the key of an object in the
//! overflow store, and the payload is that object's content.

use crate::client::{ObjectStore, QueueService};
use crate::error::StreamError;
use crate::message::{BucketName, ObjectKey, QueueUrl, RawMessage, ResolvedMessage, Timestamp};
use crate::service::Service;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where message payloads live, with the store client borrowed for one call
pub(crate) enum PayloadSource<'a> {
    Inline,
    Overflow {
        bucket: &'a BucketName,
        store: &'a dyn ObjectStore,
    },
}

/// Resolves raw messages of one stream
pub(crate) struct PayloadResolver<'a> {
    source: PayloadSource<'a>,
    queue: &'a dyn QueueService,
    queue_url: &'a QueueUrl,
    service: &'a Arc<Service>,
}

impl<'a> PayloadResolver<'a> {
    pub(crate) fn new(
        source: PayloadSource<'a>,
        queue: &'a dyn QueueService,
        queue_url: &'a QueueUrl,
        service: &'a Arc<Service>,
    ) -> Self {
        Self {
            source,
            queue,
            queue_url,
            service,
        }
    }

    /// Resolve one message
    ///
    /// Returns `Ok(None)` when the message points at an object that no longer
    /// exists; the message has then been deleted from the queue.
    pub(crate) async fn resolve(
        &self,
        raw: RawMessage,
    ) -> Result<Option<ResolvedMessage>, StreamError> {
        match self.source {
            PayloadSource::Inline => Ok(Some(ResolvedMessage::new(
                raw.receipt_handle,
                Bytes::from(raw.body.into_bytes()),
                Timestamp::now(),
                None,
                Arc::clone(self.service),
            ))),
            PayloadSource::Overflow { bucket, store } => {
                let key = ObjectKey::new(raw.body)?;

                if !store.object_exists(bucket, &key).await? {
                    // Pointer to an object that was already consumed or expired.
                    warn!(
                        bucket = %bucket,
                        key = %key,
                        "Overflow object missing, deleting stale queue message"
                    );
                    self.queue
                        .delete_message(self.queue_url, &raw.receipt_handle)
                        .await?;
                    return Ok(None);
                }

                let object = store.get_object(bucket, &key).await?;
                debug!(
                    bucket = %bucket,
                    key = %key,
                    size = object.body.len(),
                    "Resolved overflow payload"
                );

                Ok(Some(ResolvedMessage::new(
                    raw.receipt_handle,
                    object.body,
                    object.last_modified,
                    Some(key),
                    Arc::clone(self.service),
                )))
            }
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
