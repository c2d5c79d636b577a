//! Scripted queue and store clients shared by the unit tests.

use crate::client::{ManagedClient, ObjectStore, QueueService, StoredObject};
use crate::config::StreamBuilder;
use crate::error::{QueueError, StorageError};
use crate::message::{
    BucketName, MessageId, ObjectKey, QueueName, QueueUrl, RawMessage, ReceiptHandle, Timestamp,
};
use crate::stream::CancelHandle;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One call made against a fake client
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    GetQueueUrl(String),
    Receive { max_messages: u32, wait_seconds: i64 },
    DeleteMessage(String),
    SendMessage(String),
    ObjectExists(String),
    GetObject(String),
    PutObject(String),
    DeleteObject(String),
}

/// Shared script and call log behind the fake clients
#[derive(Default)]
pub(crate) struct FakeState {
    batches: Mutex<VecDeque<Result<Vec<RawMessage>, QueueError>>>,
    objects: Mutex<HashMap<String, (Bytes, Timestamp)>>,
    calls: Mutex<Vec<Call>>,
    shutdowns: Mutex<Vec<&'static str>>,
    cancel_when_exhausted: Mutex<Option<CancelHandle>>,
    queue_url_error: Mutex<Option<QueueError>>,
    send_error: Mutex<Option<QueueError>>,
    delete_message_error: Mutex<Option<QueueError>>,
    get_object_error: Mutex<Option<StorageError>>,
    put_error: Mutex<Option<StorageError>>,
    delete_object_error: Mutex<Option<StorageError>>,
    fail_store_factory: AtomicBool,
    queue_factory_calls: AtomicUsize,
    store_factory_calls: AtomicUsize,
    in_flight_receives: AtomicUsize,
    max_in_flight_receives: AtomicUsize,
    handle_seq: AtomicUsize,
}

impl FakeState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Queue up the result of the next receive call
    pub(crate) fn push_batch(&self, bodies: &[&str]) {
        let batch = bodies
            .iter()
            .map(|body| {
                let n = self.handle_seq.fetch_add(1, Ordering::SeqCst);
                RawMessage::new(*body, ReceiptHandle::new(format!("rh-{}", n)))
                    .with_message_id(MessageId::new())
            })
            .collect();
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    /// Queue up a batch of messages with explicit receipt handles
    pub(crate) fn push_raw_batch(&self, batch: Vec<RawMessage>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub(crate) fn push_receive_error(&self, error: QueueError) {
        self.batches.lock().unwrap().push_back(Err(error));
    }

    /// Cancel `handle` once the scripted batches run out
    pub(crate) fn cancel_when_exhausted(&self, handle: CancelHandle) {
        *self.cancel_when_exhausted.lock().unwrap() = Some(handle);
    }

    pub(crate) fn put_stored_object(&self, key: &str, body: &str, last_modified: Timestamp) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::from(body.to_string()), last_modified));
    }

    pub(crate) fn has_object(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub(crate) fn fail_queue_url(&self, error: QueueError) {
        *self.queue_url_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_send(&self, error: QueueError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_delete_message(&self, error: QueueError) {
        *self.delete_message_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_get_object(&self, error: StorageError) {
        *self.get_object_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_put(&self, error: StorageError) {
        *self.put_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_delete_object(&self, error: StorageError) {
        *self.delete_object_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_store_factory(&self) {
        self.fail_store_factory.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn receive_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Receive { .. }))
            .collect()
    }

    /// Client shutdowns in the order they happened (`"queue"` / `"store"`)
    pub(crate) fn shutdowns(&self) -> Vec<&'static str> {
        self.shutdowns.lock().unwrap().clone()
    }

    pub(crate) fn queue_factory_calls(&self) -> usize {
        self.queue_factory_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn store_factory_calls(&self) -> usize {
        self.store_factory_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight_receives(&self) -> usize {
        self.max_in_flight_receives.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Clients and builders
    // ------------------------------------------------------------------

    pub(crate) fn queue_client(self: &Arc<Self>) -> Box<dyn QueueService> {
        self.queue_factory_calls.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeQueue {
            state: Arc::clone(self),
        })
    }

    pub(crate) fn store_client(self: &Arc<Self>) -> Result<Box<dyn ObjectStore>, StorageError> {
        self.store_factory_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_store_factory.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailed {
                message: "store unavailable".to_string(),
            });
        }
        Ok(Box::new(FakeStore {
            state: Arc::clone(self),
        }))
    }

    /// Builder for an inline-mode stream over these fakes
    pub(crate) fn builder(self: &Arc<Self>, queue: &str) -> StreamBuilder {
        let state = Arc::clone(self);
        StreamBuilder::new(queue).with_queue_factory(move || Ok(state.queue_client()))
    }

    /// Builder for an overflow-mode stream over these fakes
    pub(crate) fn overflow_builder(self: &Arc<Self>, queue: &str, bucket: &str) -> StreamBuilder {
        let state = Arc::clone(self);
        self.builder(queue)
            .with_bucket_name(bucket)
            .with_store_factory(move || state.store_client())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub(crate) fn test_queue_url(queue: &str) -> QueueUrl {
    QueueUrl::new(format!("https://sqs.test.local/000000000000/{}", queue)).unwrap()
}

// ============================================================================
// Fake Clients
// ============================================================================

pub(crate) struct FakeQueue {
    state: Arc<FakeState>,
}

impl ManagedClient for FakeQueue {
    fn shutdown(&self) {
        self.state.shutdowns.lock().unwrap().push("queue");
    }
}

#[async_trait]
impl QueueService for FakeQueue {
    async fn get_queue_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        self.state.record(Call::GetQueueUrl(queue.to_string()));
        if let Some(error) = self.state.queue_url_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(test_queue_url(queue.as_str()))
    }

    async fn receive_messages(
        &self,
        _queue_url: &QueueUrl,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<RawMessage>, QueueError> {
        self.state.record(Call::Receive {
            max_messages,
            wait_seconds: wait_time.num_seconds(),
        });

        let in_flight = self.state.in_flight_receives.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight_receives
            .fetch_max(in_flight, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.state.in_flight_receives.fetch_sub(1, Ordering::SeqCst);

        let next = self.state.batches.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(handle) = self.state.cancel_when_exhausted.lock().unwrap().as_ref() {
                    handle.cancel();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(
        &self,
        _queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.state.record(Call::DeleteMessage(receipt.to_string()));
        match self.state.delete_message_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn send_message(&self, _queue_url: &QueueUrl, body: &str) -> Result<MessageId, QueueError> {
        self.state.record(Call::SendMessage(body.to_string()));
        match self.state.send_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(MessageId::new()),
        }
    }
}

pub(crate) struct FakeStore {
    state: Arc<FakeState>,
}

impl ManagedClient for FakeStore {
    fn shutdown(&self) {
        self.state.shutdowns.lock().unwrap().push("store");
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn object_exists(&self, _bucket: &BucketName, key: &ObjectKey) -> Result<bool, StorageError> {
        self.state.record(Call::ObjectExists(key.to_string()));
        Ok(self.state.has_object(key.as_str()))
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<StoredObject, StorageError> {
        self.state.record(Call::GetObject(key.to_string()));
        if let Some(error) = self.state.get_object_error.lock().unwrap().take() {
            return Err(error);
        }
        self.state
            .objects
            .lock()
            .unwrap()
            .get(key.as_str())
            .map(|(body, last_modified)| StoredObject {
                body: body.clone(),
                last_modified: *last_modified,
            })
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        _bucket: &BucketName,
        key: &ObjectKey,
        body: Bytes,
        _headers: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.state.record(Call::PutObject(key.to_string()));
        if let Some(error) = self.state.put_error.lock().unwrap().take() {
            return Err(error);
        }
        self.state
            .objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, Timestamp::now()));
        Ok(())
    }

    async fn delete_object(&self, _bucket: &BucketName, key: &ObjectKey) -> Result<(), StorageError> {
        self.state.record(Call::DeleteObject(key.to_string()));
        if let Some(error) = self.state.delete_object_error.lock().unwrap().take() {
            return Err(error);
        }
        self.state.objects.lock().unwrap().remove(key.as_str());
        Ok(())
    }
}
