//! Error types for queue, overflow-store and stream operations.

use thiserror::Error;

/// Errors raised by a queue service client
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Queue client has been shut down")]
    ClientClosed,

    #[error("Invalid response from queue service: {message}")]
    InvalidResponse { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the operation may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::ProviderError { .. } => true,
            Self::ClientClosed => false,
            Self::InvalidResponse { .. } => false,
            Self::Validation(_) => false,
        }
    }
}

/// Errors raised by an overflow object store client
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Object store client has been shut down")]
    ClientClosed,

    #[error("Invalid response from object store: {message}")]
    InvalidResponse { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl StorageError {
    /// Check if error is transient and the operation may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::BucketNotFound { .. } => false,
            Self::ObjectNotFound { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::ProviderError { .. } => true,
            Self::ClientClosed => false,
            Self::InvalidResponse { .. } => false,
            Self::Validation(_) => false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Terminal error of a message stream or of a send through the overflow store
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Enqueueing the pointer failed and removing the uploaded object failed too
    #[error("Send failed ({send}) and cleanup of the uploaded object failed ({cleanup})")]
    CleanupFailed {
        send: QueueError,
        cleanup: StorageError,
    },
}

impl StreamError {
    /// Check if the underlying failure is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
            Self::Queue(e) => e.is_transient(),
            Self::Storage(e) => e.is_transient(),
            Self::CleanupFailed { .. } => false,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
