//! AWS Signature Version 4 request signing.
//!
//! Shared by the SQS and S3 clients. The signing process:
//! 1. Create canonical request (method, URI, query, headers, payload hash)
//! 2. Create string to sign (algorithm, timestamp, scope, request hash)
//! 3. Derive signing key (4-level HMAC chain)
//! 4. Calculate signature and build Authorization header
//!
//! ## References
//!
//! - [AWS Signature V4](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Header carrying the hex SHA-256 of the request payload
pub(crate) const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// One request to be signed
pub(crate) struct SigningRequest<'a> {
    pub method: &'a str,
    /// `host[:port]` exactly as sent in the Host header
    pub host: &'a str,
    /// Already URI-encoded path
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub payload: &'a [u8],
}

/// AWS Signature Version 4 signer for one service in one region
#[derive(Clone)]
pub(crate) struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: &'static str,
}

impl AwsV4Signer {
    /// Create signer for `service` (e.g. `"sqs"`, `"s3"`)
    pub(crate) fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: &'static str,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service,
        }
    }

    /// Sign a request
    ///
    /// Returns the headers to add: `Authorization`, `x-amz-date`,
    /// `x-amz-content-sha256` and `host`.
    pub(crate) fn sign_request(
        &self,
        request: &SigningRequest<'_>,
        timestamp: &DateTime<Utc>,
    ) -> HashMap<String, String> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex::encode(Sha256::digest(request.payload));

        let canonical_query_string = canonical_query(request.query);

        // Canonical headers (must be sorted)
        let canonical_headers = format!(
            "host:{}\n{}:{}\nx-amz-date:{}\n",
            request.host, CONTENT_SHA256_HEADER, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            request.path,
            canonical_query_string,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), authorization_header);
        headers.insert("x-amz-date".to_string(), amz_date);
        headers.insert(CONTENT_SHA256_HEADER.to_string(), payload_hash);
        headers.insert("host".to_string(), request.host.to_string());
        headers
    }

    /// kSecret -> kDate -> kRegion -> kService -> kSigning -> signature
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
    }
}

impl std::fmt::Debug for AwsV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsV4Signer")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

/// Sorted, URI-encoded `k=v&...` query string
pub(crate) fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs = query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs.join("&")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
