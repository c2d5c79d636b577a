//! Message types and the domain identifiers they are addressed by.

use crate::error::{StreamError, ValidationError};
use crate::service::Service;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name
///
/// Follows the SQS naming rules: 1-80 characters of ASCII alphanumerics,
/// hyphens and underscores, with an optional `.fifo` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() || name.len() > 80 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-80 characters".to_string(),
            });
        }

        let base = name.strip_suffix(".fifo").unwrap_or(&name);
        if base.is_empty()
            || !base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this names a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(".fifo")
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Service URL of a queue, as returned by the queue service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Create queue URL, checking that it parses as an absolute URL
    pub fn new(url: impl Into<String>) -> Result<Self, ValidationError> {
        let url = url.into();
        url::Url::parse(&url).map_err(|e| ValidationError::InvalidFormat {
            field: "queue_url".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self(url))
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated overflow-store bucket name
///
/// Up to 63 lowercase ASCII letters, digits, dots and hyphens, starting and
/// ending with a letter or digit. Stricter provider rules (such as S3's
/// three-character minimum) are left to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketName(String);

impl BucketName {
    /// Create new bucket name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() || name.len() > 63 {
            return Err(ValidationError::OutOfRange {
                field: "bucket_name".to_string(),
                message: "must be 1-63 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(ValidationError::InvalidFormat {
                field: "bucket_name".to_string(),
                message: "only lowercase ASCII letters, digits, dots, and hyphens allowed"
                    .to_string(),
            });
        }

        let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
        if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
            return Err(ValidationError::InvalidFormat {
                field: "bucket_name".to_string(),
                message: "must start and end with a letter or digit".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get bucket name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Key of an object in the overflow store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create object key; keys are 1-1024 bytes of UTF-8
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::Required {
                field: "object_key".to_string(),
            });
        }

        if key.len() > 1024 {
            return Err(ValidationError::OutOfRange {
                field: "object_key".to_string(),
                message: "maximum 1024 bytes".to_string(),
            });
        }

        Ok(Self(key))
    }

    /// Generate a random key: a v4 UUID without hyphens
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get object key as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier assigned to a message by the queue service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token used to acknowledge (delete) a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message as returned by the queue service, before payload resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: Option<MessageId>,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
}

impl RawMessage {
    /// Create raw message from body and receipt handle
    pub fn new(body: impl Into<String>, receipt_handle: ReceiptHandle) -> Self {
        Self {
            message_id: None,
            body: body.into(),
            receipt_handle,
        }
    }

    /// Attach the service-assigned message ID
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

/// A message with its payload materialized, either inline or from the
/// overflow store
///
/// Carries the [`Service`] it was received through so the consumer can
/// acknowledge it after the stream that produced it has been closed.
#[derive(Clone)]
pub struct ResolvedMessage {
    receipt_handle: ReceiptHandle,
    payload: Bytes,
    timestamp: Timestamp,
    overflow_key: Option<ObjectKey>,
    service: Arc<Service>,
}

impl ResolvedMessage {
    pub(crate) fn new(
        receipt_handle: ReceiptHandle,
        payload: Bytes,
        timestamp: Timestamp,
        overflow_key: Option<ObjectKey>,
        service: Arc<Service>,
    ) -> Self {
        Self {
            receipt_handle,
            payload,
            timestamp,
            overflow_key,
            service,
        }
    }

    /// Receipt handle needed to delete the message from the queue
    pub fn receipt_handle(&self) -> &ReceiptHandle {
        &self.receipt_handle
    }

    /// Payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload as UTF-8 text
    pub fn payload_str(&self) -> Result<&str, ValidationError> {
        std::str::from_utf8(&self.payload).map_err(|e| ValidationError::InvalidFormat {
            field: "payload".to_string(),
            message: e.to_string(),
        })
    }

    /// Last-modified time of the overflow object, or time of receipt for
    /// inline messages
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Overflow-store key the payload was read from, if any
    pub fn overflow_key(&self) -> Option<&ObjectKey> {
        self.overflow_key.as_ref()
    }

    /// Service capabilities this message was received through
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Delete the overflow object (if any) and then the queue message
    pub async fn delete(&self) -> Result<(), StreamError> {
        self.service.delete_message(self).await
    }
}

impl std::fmt::Debug for ResolvedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedMessage")
            .field("receipt_handle", &self.receipt_handle)
            .field("payload_len", &self.payload.len())
            .field("timestamp", &self.timestamp)
            .field("overflow_key", &self.overflow_key)
            .field("queue", self.service.queue_name())
            .finish()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
