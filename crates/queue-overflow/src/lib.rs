//! # Queue Overflow
//!
//! Consumer adapter that turns a remote message queue into a stream of
//! resolved messages, with optional payload offload to an object store.
//!
//! This library provides:
//! - Continuous long-polling and scheduled (tick-driven) retrieval
//! - Transparent resolution of overflow pointers into stored payloads
//! - Exactly-once shutdown of the queue and object-store clients
//! - A send helper that offloads payloads and enqueues pointers to them
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for queue, store and stream operations
//! - [`message`] - Identifiers, raw and resolved messages
//! - [`client`] - Queue service and object store traits, client factories
//! - [`config`] - Stream builder and immutable configuration
//! - [`stream`] - Open streams, cancellation
//! - [`service`] - Follow-up operations on received messages
//! - [`send`] - Sending payloads through the object store
//! - [`providers`] - AWS and in-memory client implementations
//!
//! ## Example
//!
//! ```no_run
//! use queue_overflow::providers::memory::InMemoryQueueService;
//! use queue_overflow::{QueueService, StreamBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queues = InMemoryQueueService::new();
//!
//! let mut stream = StreamBuilder::new("orders")
//!     .with_queue_factory(move || Ok(Box::new(queues.client()) as Box<dyn QueueService>))
//!     .with_interval(Duration::from_secs(30))
//!     .open()
//!     .await?;
//!
//! while let Some(message) = stream.next().await {
//!     let message = message?;
//!     println!("{}", message.payload_str()?);
//!     message.delete().await?;
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod error;
mod lease;
pub mod message;
mod poll;
pub mod providers;
mod resolver;
mod retrieval;
pub mod send;
pub mod service;
pub mod stream;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use client::{
    ManagedClient, ObjectStore, ObjectStoreFactory, QueueService, QueueServiceFactory,
    StoredObject,
};
pub use config::{OverflowMode, PollingMode, StreamBuilder, StreamConfig, WaitTimeSchedule, WaitTimes};
pub use error::{ConfigurationError, QueueError, StorageError, StreamError, ValidationError};
pub use message::{
    BucketName, MessageId, ObjectKey, QueueName, QueueUrl, RawMessage, ReceiptHandle,
    ResolvedMessage, Timestamp,
};
pub use poll::{MAX_BATCH_SIZE, MAX_WAIT_SECONDS};
pub use send::{send_via_store, KeyFactory, SendOptions};
pub use service::Service;
pub use stream::{CancelHandle, MessageStream};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
