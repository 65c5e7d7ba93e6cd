//! Error types for request authentication.
//!
//! Variants are deliberately fine-grained so the reason can be logged; the
//! HTTP layer collapses them into a small set of client-facing codes.

use chrono::{DateTime, Utc};

/// Errors that can occur during AWS Signature Version 4 authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The signing algorithm is not supported (only AWS4-HMAC-SHA256 is supported).
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A required HTTP header referenced in `SignedHeaders` is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The `Credential` component does not match
    /// `AKID/date/region/service/aws4_request`.
    #[error("Invalid credential format")]
    InvalidCredential,

    /// The request timestamp is not in `YYYYMMDDTHHMMSSZ` form, or its date
    /// disagrees with the credential scope.
    #[error("Invalid request date: {0}")]
    InvalidDate(String),

    /// The access key ID was not found in the credential store.
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,

    /// The request timestamp is too far from the server clock.
    #[error("Request time {request_time} too skewed from server time {server_time}")]
    RequestTimeTooSkewed {
        /// Time the client signed the request.
        request_time: DateTime<Utc>,
        /// Server time when the request was checked.
        server_time: DateTime<Utc>,
    },

    /// The presigned URL has expired (current time exceeds `X-Amz-Date` + `X-Amz-Expires`).
    #[error("Request has expired")]
    RequestExpired,

    /// `X-Amz-Expires` is not an integer in `1..=604800`.
    #[error("Invalid X-Amz-Expires: {0}")]
    InvalidExpires(String),

    /// A required query parameter for presigned URL authentication is missing.
    #[error("Missing required query parameter: {0}")]
    MissingQueryParam(String),
}

impl AuthError {
    /// Whether the failure came from the credential/signature comparison
    /// itself, as opposed to a malformed request or a clock problem.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::AccessKeyNotFound(_) | Self::SignatureDoesNotMatch)
    }
}
