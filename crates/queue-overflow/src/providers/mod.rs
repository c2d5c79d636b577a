//! Queue service and object store implementations.
//!
//! - [`aws`]: AWS SQS over the HTTP query API
//! - [`s3`]: AWS S3 (or any S3-compatible store) over path-style HTTP
//! - [`memory`]: in-process implementations for tests and development

pub mod aws;
mod http;
pub mod memory;
pub mod s3;
mod signing;

pub use aws::{AwsSqsClient, AwsSqsConfig};
pub use memory::{
    InMemoryObjectStore, InMemoryObjectStoreClient, InMemoryQueueClient, InMemoryQueueService,
};
pub use s3::{S3Config, S3ObjectStore};
