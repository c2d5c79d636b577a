//! In-memory queue service and object store for testing and development.
//!
//! Both keep their state in shared storage. Each `client()` call returns a
//! new client handle over that storage, so a factory can hand out fresh
//! clients while every handle sees the same queues and objects:
//!
//! ```no_run
//! use queue_overflow::providers::memory::{InMemoryObjectStore, InMemoryQueueService};
//! use queue_overflow::{ObjectStore, QueueService, StreamBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queues = InMemoryQueueService::new();
//! let objects = InMemoryObjectStore::new();
//!
//! let mut stream = StreamBuilder::new("orders")
//!     .with_queue_factory(move || Ok(Box::new(queues.client()) as Box<dyn QueueService>))
//!     .with_bucket_name("order-payloads")
//!     .with_store_factory(move || Ok(Box::new(objects.client()) as Box<dyn ObjectStore>))
//!     .open()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The queue service supports:
//! - Long-poll waits, woken as soon as a message is sent
//! - Visibility timeouts: received messages reappear unless deleted in time
//! - Order preservation: messages are received in send order

use crate::client::{ManagedClient, ObjectStore, QueueService, StoredObject};
use crate::error::{QueueError, StorageError};
use crate::message::{
    BucketName, MessageId, ObjectKey, QueueName, QueueUrl, RawMessage, ReceiptHandle, Timestamp,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const QUEUE_URL_PREFIX: &str = "memory://queues/";

/// Default time a received message stays hidden before it reappears
pub const DEFAULT_VISIBILITY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    visibility_timeout: std::time::Duration,
}

impl QueueStorage {
    /// Get or create a queue
    fn get_or_create_queue(&mut self, queue_name: &QueueName) -> &mut InMemoryQueue {
        self.queues.entry(queue_name.clone()).or_default()
    }
}

/// Internal state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Visible messages, oldest first
    messages: VecDeque<StoredMessage>,
    /// Received messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    /// Return messages whose visibility timeout ran out to the front of the
    /// queue, oldest first
    fn requeue_expired(&mut self, now: Instant) {
        let mut expired: Vec<InFlightMessage> = Vec::new();
        self.in_flight.retain(|_, in_flight| {
            if in_flight.visible_at <= now {
                expired.push(in_flight.clone());
                false
            } else {
                true
            }
        });

        expired.sort_by_key(|in_flight| in_flight.message.sequence);
        for in_flight in expired.into_iter().rev() {
            self.messages.push_front(in_flight.message);
        }
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    sequence: u64,
}

#[derive(Clone)]
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

// ============================================================================
// InMemoryQueueService
// ============================================================================

/// Shared in-memory queue service
#[derive(Clone)]
pub struct InMemoryQueueService {
    storage: Arc<RwLock<QueueStorage>>,
    notify: Arc<Notify>,
    sequence: Arc<std::sync::atomic::AtomicU64>,
}

impl InMemoryQueueService {
    /// Create new empty queue service
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create new empty queue service with a custom visibility timeout
    pub fn with_visibility_timeout(visibility_timeout: std::time::Duration) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage {
                queues: HashMap::new(),
                visibility_timeout,
            })),
            notify: Arc::new(Notify::new()),
            sequence: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    /// New client handle over this service's storage
    pub fn client(&self) -> InMemoryQueueClient {
        InMemoryQueueClient {
            service: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a queue if it does not exist yet and return its URL
    pub fn create_queue(&self, queue_name: &QueueName) -> Result<QueueUrl, QueueError> {
        let url = queue_url_for(queue_name)?;
        self.storage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_create_queue(queue_name);
        Ok(url)
    }

    /// Number of visible messages in a queue
    pub fn visible_count(&self, queue_name: &QueueName) -> usize {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .queues
            .get(queue_name)
            .map_or(0, |queue| queue.messages.len())
    }

    /// Number of received but not yet deleted messages in a queue
    pub fn in_flight_count(&self, queue_name: &QueueName) -> usize {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .queues
            .get(queue_name)
            .map_or(0, |queue| queue.in_flight.len())
    }

    fn enqueue(&self, queue_name: &QueueName, body: &str) -> MessageId {
        let message_id = MessageId::new();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.storage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_create_queue(queue_name)
            .messages
            .push_back(StoredMessage {
                message_id: message_id.clone(),
                body: body.to_string(),
                sequence,
            });
        self.notify.notify_waiters();
        message_id
    }

    /// Take up to `max_messages` visible messages, making them in flight
    fn take_batch(&self, queue_name: &QueueName, max_messages: usize) -> Vec<RawMessage> {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let visible_at = now + storage.visibility_timeout;
        let queue = storage.get_or_create_queue(queue_name);
        queue.requeue_expired(now);

        let count = max_messages.min(queue.messages.len());
        let taken: Vec<StoredMessage> = queue.messages.drain(..count).collect();

        let mut batch = Vec::with_capacity(taken.len());
        for message in taken {
            let handle = uuid::Uuid::new_v4().to_string();
            batch.push(
                RawMessage::new(message.body.clone(), ReceiptHandle::new(handle.clone()))
                    .with_message_id(message.message_id.clone()),
            );
            queue.in_flight.insert(
                handle,
                InFlightMessage {
                    message,
                    visible_at,
                },
            );
        }
        batch
    }
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

fn queue_url_for(queue_name: &QueueName) -> Result<QueueUrl, QueueError> {
    Ok(QueueUrl::new(format!("{}{}", QUEUE_URL_PREFIX, queue_name))?)
}

fn queue_name_from(queue_url: &QueueUrl) -> Result<QueueName, QueueError> {
    let name = queue_url
        .as_str()
        .strip_prefix(QUEUE_URL_PREFIX)
        .ok_or_else(|| QueueError::QueueNotFound {
            queue_name: queue_url.to_string(),
        })?;
    Ok(QueueName::new(name)?)
}

/// Client handle for [`InMemoryQueueService`]
pub struct InMemoryQueueClient {
    service: InMemoryQueueService,
    closed: AtomicBool,
}

impl InMemoryQueueClient {
    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::ClientClosed);
        }
        Ok(())
    }

    /// Whether this handle has been shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ManagedClient for InMemoryQueueClient {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl QueueService for InMemoryQueueClient {
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        self.ensure_open()?;
        self.service.create_queue(queue)
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        self.ensure_open()?;
        let queue_name = queue_name_from(queue_url)?;
        let max_messages = max_messages.clamp(1, 10) as usize;
        let wait = wait_time.to_std().unwrap_or_default();
        let deadline = Instant::now() + wait;

        loop {
            // Register for wake-ups before looking, so a send in between is not missed.
            let notified = self.service.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.service.take_batch(&queue_name, max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            // Timing out just means the next look may come back empty.
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.ensure_open()?;
        let queue_name = queue_name_from(queue_url)?;
        let mut storage = self
            .service
            .storage
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        storage
            .queues
            .get_mut(&queue_name)
            .and_then(|queue| queue.in_flight.remove(receipt.as_str()))
            .map(|_| ())
            .ok_or_else(|| QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            })
    }

    async fn send_message(&self, queue_url: &QueueUrl, body: &str) -> Result<MessageId, QueueError> {
        self.ensure_open()?;
        let queue_name = queue_name_from(queue_url)?;
        Ok(self.service.enqueue(&queue_name, body))
    }
}

// ============================================================================
// InMemoryObjectStore
// ============================================================================

/// An object held by [`InMemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryObject {
    pub body: Bytes,
    pub headers: HashMap<String, String>,
    pub last_modified: Timestamp,
}

/// Shared in-memory object store
///
/// Buckets spring into existence on first write.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<(BucketName, ObjectKey), InMemoryObject>>>,
}

impl InMemoryObjectStore {
    /// Create new empty object store
    pub fn new() -> Self {
        Self::default()
    }

    /// New client handle over this store's objects
    pub fn client(&self) -> InMemoryObjectStoreClient {
        InMemoryObjectStoreClient {
            store: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Look at a stored object directly
    pub fn object(&self, bucket: &BucketName, key: &ObjectKey) -> Option<InMemoryObject> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(bucket.clone(), key.clone()))
            .cloned()
    }

    /// Number of objects across all buckets
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Client handle for [`InMemoryObjectStore`]
pub struct InMemoryObjectStoreClient {
    store: InMemoryObjectStore,
    closed: AtomicBool,
}

impl InMemoryObjectStoreClient {
    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::ClientClosed);
        }
        Ok(())
    }

    /// Whether this handle has been shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ManagedClient for InMemoryObjectStoreClient {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStoreClient {
    async fn object_exists(&self, bucket: &BucketName, key: &ObjectKey) -> Result<bool, StorageError> {
        self.ensure_open()?;
        Ok(self.store.object(bucket, key).is_some())
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<StoredObject, StorageError> {
        self.ensure_open()?;
        self.store
            .object(bucket, key)
            .map(|object| StoredObject {
                body: object.body,
                last_modified: object.last_modified,
            })
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Bytes,
        headers: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.store
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (bucket.clone(), key.clone()),
                InMemoryObject {
                    body,
                    headers: headers.clone(),
                    last_modified: Timestamp::now(),
                },
            );
        Ok(())
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> Result<(), StorageError> {
        self.ensure_open()?;
        // Deleting a missing object succeeds, as in S3.
        self.store
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(bucket.clone(), key.clone()));
        Ok(())
    }
}
