//! Common test utilities for queue-overflow integration tests
//!
//! This module provides:
//! - Tracked wrappers around the in-memory clients that log calls and shutdowns
//! - A scripted queue that returns batches of fixed sizes
//! - Builders wired to both

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use queue_overflow::providers::memory::{
    InMemoryObjectStore, InMemoryObjectStoreClient, InMemoryQueueClient, InMemoryQueueService,
};
use queue_overflow::{
    BucketName, ManagedClient, MessageId, ObjectKey, ObjectStore, QueueError, QueueName,
    QueueService, QueueUrl, RawMessage, ReceiptHandle, StorageError, StoredObject, StreamBuilder,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Call Tracking
// ============================================================================

/// Shared log of what the clients of one test did
#[derive(Default)]
#[allow(dead_code)]
pub struct Tracker {
    shutdowns: Mutex<Vec<&'static str>>,
    receive_waits: Mutex<Vec<i64>>,
    queue_factory_calls: AtomicUsize,
    in_flight_receives: AtomicUsize,
    max_in_flight_receives: AtomicUsize,
    fail_sends: AtomicBool,
    fail_receives: AtomicBool,
}

#[allow(dead_code)]
impl Tracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Client shutdowns in order, `"queue"` or `"store"`
    pub fn shutdowns(&self) -> Vec<&'static str> {
        self.shutdowns.lock().unwrap().clone()
    }

    /// Wait time, in seconds, of every receive call in order
    pub fn receive_waits(&self) -> Vec<i64> {
        self.receive_waits.lock().unwrap().clone()
    }

    pub fn queue_factory_calls(&self) -> usize {
        self.queue_factory_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_receives(&self) -> usize {
        self.max_in_flight_receives.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn fail_receives(&self) {
        self.fail_receives.store(true, Ordering::SeqCst);
    }

    fn record_shutdown(&self, client: &'static str) {
        self.shutdowns.lock().unwrap().push(client);
    }

    fn start_receive(&self, wait_time: Duration) -> Result<(), QueueError> {
        self.receive_waits
            .lock()
            .unwrap()
            .push(wait_time.num_seconds());
        if self.fail_receives.load(Ordering::SeqCst) {
            return Err(QueueError::ConnectionFailed {
                message: "receive failed".to_string(),
            });
        }
        let in_flight = self.in_flight_receives.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_receives
            .fetch_max(in_flight, Ordering::SeqCst);
        Ok(())
    }

    fn finish_receive(&self) {
        self.in_flight_receives.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Tracked In-Memory Clients
// ============================================================================

pub struct TrackedQueue {
    inner: InMemoryQueueClient,
    tracker: Arc<Tracker>,
}

impl ManagedClient for TrackedQueue {
    fn shutdown(&self) {
        self.tracker.record_shutdown("queue");
        self.inner.shutdown();
    }
}

#[async_trait]
impl QueueService for TrackedQueue {
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        self.inner.get_queue_url(queue).await
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        self.tracker.start_receive(wait_time)?;
        let result = self
            .inner
            .receive_messages(queue_url, max_messages, wait_time)
            .await;
        self.tracker.finish_receive();
        result
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.inner.delete_message(queue_url, receipt).await
    }

    async fn send_message(&self, queue_url: &QueueUrl, body: &str) -> Result<MessageId, QueueError> {
        if self.tracker.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::ConnectionFailed {
                message: "send failed".to_string(),
            });
        }
        self.inner.send_message(queue_url, body).await
    }
}

pub struct TrackedStore {
    inner: InMemoryObjectStoreClient,
    tracker: Arc<Tracker>,
}

impl ManagedClient for TrackedStore {
    fn shutdown(&self) {
        self.tracker.record_shutdown("store");
        self.inner.shutdown();
    }
}

#[async_trait]
impl ObjectStore for TrackedStore {
    async fn object_exists(&self, bucket: &BucketName, key: &ObjectKey) -> Result<bool, StorageError> {
        self.inner.object_exists(bucket, key).await
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<StoredObject, StorageError> {
        self.inner.get_object(bucket, key).await
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Bytes,
        headers: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.inner.put_object(bucket, key, body, headers).await
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> Result<(), StorageError> {
        self.inner.delete_object(bucket, key).await
    }
}

/// In-memory queue and store shared by every client a test creates
#[allow(dead_code)]
pub struct Harness {
    pub queues: InMemoryQueueService,
    pub objects: InMemoryObjectStore,
    pub tracker: Arc<Tracker>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self {
            queues: InMemoryQueueService::new(),
            objects: InMemoryObjectStore::new(),
            tracker: Tracker::new(),
        }
    }

    /// Inline-mode builder over tracked clients
    pub fn builder(&self, queue: &str) -> StreamBuilder {
        let queues = self.queues.clone();
        let tracker = Arc::clone(&self.tracker);
        StreamBuilder::new(queue).with_queue_factory(move || {
            tracker.queue_factory_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TrackedQueue {
                inner: queues.client(),
                tracker: Arc::clone(&tracker),
            }) as Box<dyn QueueService>)
        })
    }

    /// Overflow-mode builder over tracked clients
    pub fn overflow_builder(&self, queue: &str, bucket: &str) -> StreamBuilder {
        let objects = self.objects.clone();
        let tracker = Arc::clone(&self.tracker);
        self.builder(queue)
            .with_bucket_name(bucket)
            .with_store_factory(move || {
                Ok(Box::new(TrackedStore {
                    inner: objects.client(),
                    tracker: Arc::clone(&tracker),
                }) as Box<dyn ObjectStore>)
            })
    }

    /// Enqueue plain-text messages directly
    pub async fn send_inline(&self, queue: &str, bodies: &[&str]) {
        let client = self.queues.client();
        let url = client
            .get_queue_url(&QueueName::new(queue).unwrap())
            .await
            .unwrap();
        for body in bodies {
            client.send_message(&url, body).await.unwrap();
        }
    }
}

// ============================================================================
// Scripted Queue
// ============================================================================

/// Queue whose receive calls return batches of the scripted sizes, then
/// empty batches once the script runs out
pub struct ScriptedQueue {
    batch_sizes: Arc<Mutex<VecDeque<usize>>>,
    sequence: Arc<AtomicUsize>,
    tracker: Arc<Tracker>,
}

impl ManagedClient for ScriptedQueue {
    fn shutdown(&self) {
        self.tracker.record_shutdown("queue");
    }
}

#[async_trait]
impl QueueService for ScriptedQueue {
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        Ok(QueueUrl::new(format!("https://sqs.test.local/000000000000/{}", queue))?)
    }

    async fn receive_messages(
        &self,
        _queue_url: &QueueUrl,
        _max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        self.tracker.start_receive(wait_time)?;
        tokio::task::yield_now().await;
        self.tracker.finish_receive();

        let size = self.batch_sizes.lock().unwrap().pop_front().unwrap_or(0);
        Ok((0..size)
            .map(|_| {
                let n = self.sequence.fetch_add(1, Ordering::SeqCst);
                RawMessage::new(format!("m-{}", n), ReceiptHandle::new(format!("rh-{}", n)))
            })
            .collect())
    }

    async fn delete_message(
        &self,
        _queue_url: &QueueUrl,
        _receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        Ok(())
    }

    async fn send_message(&self, _queue_url: &QueueUrl, _body: &str) -> Result<MessageId, QueueError> {
        Ok(MessageId::new())
    }
}

/// Inline-mode builder whose receives return `batch_sizes` in order
#[allow(dead_code)]
pub fn scripted_builder(queue: &str, batch_sizes: &[usize], tracker: &Arc<Tracker>) -> StreamBuilder {
    let batch_sizes = Arc::new(Mutex::new(batch_sizes.iter().copied().collect::<VecDeque<_>>()));
    let sequence = Arc::new(AtomicUsize::new(0));
    let tracker = Arc::clone(tracker);
    StreamBuilder::new(queue).with_queue_factory(move || {
        tracker.queue_factory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedQueue {
            batch_sizes: Arc::clone(&batch_sizes),
            sequence: Arc::clone(&sequence),
            tracker: Arc::clone(&tracker),
        }) as Box<dyn QueueService>)
    })
}
