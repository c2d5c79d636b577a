//! Client traits for the queue service and the overflow object store.
//!
//! The core never constructs clients itself: it receives factories and owns
//! whatever they return for the lifetime of one stream. Concrete clients
//! live in [`crate::providers`].

use crate::error::{QueueError, StorageError};
use crate::message::{
    BucketName, MessageId, ObjectKey, QueueName, QueueUrl, RawMessage, ReceiptHandle, Timestamp,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

/// A client holding resources that must be released exactly once
pub trait ManagedClient: Send + Sync {
    /// Release the client's resources
    ///
    /// Called once by the owner when it is done with the client. Calls made
    /// after shutdown fail with a `ClientClosed` error.
    fn shutdown(&self);
}

/// Operations the core needs from a remote queue service
#[async_trait]
pub trait QueueService: ManagedClient {
    /// Resolve a queue name to its service URL
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError>;

    /// Receive up to `max_messages`, waiting at most `wait_time` for the
    /// first one to arrive
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<RawMessage>, QueueError>;

    /// Acknowledge a received message, removing it from the queue
    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Enqueue a message with a text body
    async fn send_message(&self, queue_url: &QueueUrl, body: &str)
        -> Result<MessageId, QueueError>;
}

/// An object read from the overflow store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub last_modified: Timestamp,
}

/// Operations the core needs from the overflow object store
#[async_trait]
pub trait ObjectStore: ManagedClient {
    /// Check whether an object exists
    async fn object_exists(&self, bucket: &BucketName, key: &ObjectKey)
        -> Result<bool, StorageError>;

    /// Read an object's full content and last-modified time
    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<StoredObject, StorageError>;

    /// Write an object with the given headers
    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Bytes,
        headers: &HashMap<String, String>,
    ) -> Result<(), StorageError>;

    /// Delete an object
    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey)
        -> Result<(), StorageError>;
}

/// Zero-argument constructor for a queue service client
pub type QueueServiceFactory =
    Arc<dyn Fn() -> Result<Box<dyn QueueService>, QueueError> + Send + Sync>;

/// Zero-argument constructor for an overflow object store client
pub type ObjectStoreFactory =
    Arc<dyn Fn() -> Result<Box<dyn ObjectStore>, StorageError> + Send + Sync>;
