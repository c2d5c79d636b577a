//! AWS S3 object store client using path-style HTTP requests.
//!
//! Objects are addressed as `{endpoint}/{bucket}/{key}`, which works with
//! AWS, LocalStack and MinIO alike. Every request is signed with AWS
//! Signature V4, including the payload hash header S3 requires.

use super::http::{build_http_client, parse_endpoint, ErrorBody};
use super::signing::{AwsV4Signer, SigningRequest};
use crate::client::{ManagedClient, ObjectStore, StoredObject};
use crate::error::{StorageError, ValidationError};
use crate::message::{BucketName, ObjectKey, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use url::Url;

#[cfg(test)]
#[path = "s3_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for [`S3ObjectStore`]
#[derive(Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Overrides `https://s3.{region}.amazonaws.com`
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// ============================================================================
// S3 Object Store
// ============================================================================

/// AWS S3 overflow store client
pub struct S3ObjectStore {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    config: S3Config,
    endpoint: Url,
    host: String,
    closed: AtomicBool,
}

impl S3ObjectStore {
    /// Create new S3 client
    ///
    /// # Errors
    ///
    /// Returns error if the region is empty, the endpoint is not a valid URL
    /// or the HTTP client cannot be created.
    pub fn new(config: S3Config) -> Result<Self, StorageError> {
        if config.region.is_empty() {
            return Err(ValidationError::Required {
                field: "region".to_string(),
            }
            .into());
        }

        let signer = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => Some(AwsV4Signer::new(
                access_key.clone(),
                secret_key.clone(),
                config.region.clone(),
                "s3",
            )),
            _ => None,
        };

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let (endpoint, host) =
            parse_endpoint(&endpoint).map_err(|message| ValidationError::InvalidFormat {
                field: "endpoint".to_string(),
                message,
            })?;

        let http_client = build_http_client().map_err(|e| StorageError::ConnectionFailed {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
            host,
            closed: AtomicBool::new(false),
        })
    }

    /// URI-encoded `/{bucket}/{key}` below the endpoint's own path
    fn object_path(&self, bucket: &BucketName, key: &ObjectKey) -> String {
        let encoded_key = key
            .as_str()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            bucket.as_str(),
            encoded_key
        )
    }

    /// Send a signed request for one object
    async fn send(
        &self,
        method: Method,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Option<Bytes>,
        headers: &HashMap<String, String>,
    ) -> Result<Response, StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::ClientClosed);
        }

        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| StorageError::AuthenticationFailed {
                message: "No credentials configured".to_string(),
            })?;

        let path = self.object_path(bucket, key);
        let payload = body.clone().unwrap_or_default();
        let auth_headers = signer.sign_request(
            &SigningRequest {
                method: method.as_str(),
                host: &self.host,
                path: &path,
                query: &[],
                payload: &payload,
            },
            &Utc::now(),
        );

        let mut url = self.endpoint.clone();
        url.set_path(&path);

        let mut request = self.http_client.request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in auth_headers {
            request = request.header(&name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("HTTP request failed: {}", e),
            })?;

        debug!(
            method = %method,
            bucket = %bucket,
            key = %key,
            status = response.status().as_u16(),
            "S3 request completed"
        );
        Ok(response)
    }

    /// Turn an unsuccessful response into a [`StorageError`]
    async fn error_from(
        &self,
        response: Response,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> StorageError {
        let status = response.status();
        // HEAD responses carry no body; fall back to the status code alone.
        let xml = response.text().await.unwrap_or_default();
        map_error_response(status, &ErrorBody::parse(&xml), bucket, key)
    }
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint.as_str())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl ManagedClient for S3ObjectStore {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn object_exists(&self, bucket: &BucketName, key: &ObjectKey) -> Result<bool, StorageError> {
        let response = self
            .send(Method::HEAD, bucket, key, None, &HashMap::new())
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.error_from(response, bucket, key).await),
        }
    }

    async fn get_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<StoredObject, StorageError> {
        let response = self
            .send(Method::GET, bucket, key, None, &HashMap::new())
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from(response, bucket, key).await);
        }

        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| StorageError::InvalidResponse {
                message: "Missing Last-Modified header".to_string(),
            })
            .and_then(parse_last_modified)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to read response body: {}", e),
            })?;

        Ok(StoredObject {
            body,
            last_modified,
        })
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Bytes,
        headers: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let response = self
            .send(Method::PUT, bucket, key, Some(body), headers)
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from(response, bucket, key).await);
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &BucketName, key: &ObjectKey) -> Result<(), StorageError> {
        let response = self
            .send(Method::DELETE, bucket, key, None, &HashMap::new())
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from(response, bucket, key).await);
        }
        Ok(())
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parse an HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT`
fn parse_last_modified(value: &str) -> Result<Timestamp, StorageError> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
        .map_err(|e| StorageError::InvalidResponse {
            message: format!("Invalid Last-Modified header '{}': {}", value, e),
        })
}

fn map_error_response(
    status: StatusCode,
    body: &ErrorBody,
    bucket: &BucketName,
    key: &ObjectKey,
) -> StorageError {
    match body.code.as_deref() {
        Some("NoSuchBucket") => StorageError::BucketNotFound {
            bucket: bucket.to_string(),
        },
        Some("NoSuchKey") => StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            StorageError::AuthenticationFailed {
                message: format!("{}: {}", body.code_or_unknown(), body.message_or_unknown()),
            }
        }
        Some("AccessDenied") => StorageError::PermissionDenied {
            operation: body.message_or_unknown(),
        },
        None if status == StatusCode::NOT_FOUND => StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        None if status == StatusCode::FORBIDDEN => StorageError::PermissionDenied {
            operation: format!("{}/{}", bucket, key),
        },
        _ if status == StatusCode::UNAUTHORIZED => StorageError::AuthenticationFailed {
            message: body.message_or_unknown(),
        },
        _ => StorageError::ProviderError {
            provider: "AwsS3".to_string(),
            code: body
                .code
                .clone()
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: body.message_or_unknown(),
        },
    }
}
