//! Sending payloads through the overflow store.
//!
//! The payload is uploaded under a fresh key and the key is enqueued as the
//! message body. If enqueueing fails the upload is removed again.

use crate::client::{ObjectStore, QueueService};
use crate::error::StreamError;
use crate::message::{BucketName, ObjectKey, QueueUrl};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Generator for overflow object keys
pub type KeyFactory = Arc<dyn Fn() -> ObjectKey + Send + Sync>;

/// Options for [`send_via_store`]
#[derive(Clone, Default)]
pub struct SendOptions {
    /// Headers stored with the uploaded object
    pub headers: HashMap<String, String>,
    key_factory: Option<KeyFactory>,
}

impl SendOptions {
    /// Create new send options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to store with the object
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Use a custom object key generator instead of random UUIDs
    pub fn with_key_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ObjectKey + Send + Sync + 'static,
    {
        self.key_factory = Some(Arc::new(factory));
        self
    }

    fn next_key(&self) -> ObjectKey {
        match &self.key_factory {
            Some(factory) => factory(),
            None => ObjectKey::generate(),
        }
    }
}

impl std::fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendOptions")
            .field("headers", &self.headers)
            .field("custom_key_factory", &self.key_factory.is_some())
            .finish()
    }
}

/// Upload `payload` to `bucket` and enqueue its key on `queue_url`
///
/// Returns the key the payload was stored under.
///
/// # Errors
///
/// - `StreamError::Storage` if the upload fails (nothing was enqueued)
/// - `StreamError::Queue` if enqueueing fails and the upload was removed
/// - `StreamError::CleanupFailed` if enqueueing fails and removing the
///   upload fails as well; the object is then orphaned
pub async fn send_via_store(
    queue: &dyn QueueService,
    queue_url: &QueueUrl,
    store: &dyn ObjectStore,
    bucket: &BucketName,
    payload: Bytes,
    options: &SendOptions,
) -> Result<ObjectKey, StreamError> {
    let key = options.next_key();
    let size = payload.len();

    store
        .put_object(bucket, &key, payload, &options.headers)
        .await?;

    if let Err(send) = queue.send_message(queue_url, key.as_str()).await {
        warn!(
            bucket = %bucket,
            key = %key,
            error = %send,
            "Enqueue failed, removing uploaded overflow object"
        );
        return match store.delete_object(bucket, &key).await {
            Ok(()) => Err(send.into()),
            Err(cleanup) => Err(StreamError::CleanupFailed { send, cleanup }),
        };
    }

    debug!(
        queue_url = %queue_url,
        bucket = %bucket,
        key = %key,
        size = size,
        "Sent payload through overflow store"
    );
    Ok(key)
}

#[cfg(test)]
#[path = "send_tests.rs"]
mod tests;
