//! Backend error type.
//!
//! [`BackendError`] is what every [`crate::backend::Backend`] returns. It
//! names storage-level conditions only; converting it into the protocol
//! [`S3Error`] happens once, at the gateway boundary, through [`From`].
//!
//! # Usage
//!
//! ```
//! use s3gw_core::error::BackendError;
//! use s3gw_model::{ErrorKind, S3Error, S3ErrorCode};
//!
//! let err = BackendError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! let s3_err: S3Error = err.into();
//! assert_eq!(s3_err.code, S3ErrorCode::NoSuchBucket);
//! assert_eq!(s3_err.kind, ErrorKind::NotFound);
//! ```

use s3gw_model::{ErrorKind, S3Error, S3ErrorCode};

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    // -----------------------------------------------------------------------
    // Not found
    // -----------------------------------------------------------------------
    /// The bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The upload does not exist, or was already completed or aborted.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------
    /// A bucket with this name already exists.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket still holds objects or uploads.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    /// A referenced part is missing or its entity tag does not match.
    #[error("One or more of the specified parts could not be found: part {part_number}")]
    InvalidPart {
        /// The offending part number.
        part_number: u32,
    },

    /// The part list was not strictly ascending.
    #[error("The list of parts was not in ascending order")]
    InvalidPartOrder,

    /// The key names an existing directory on the substrate.
    #[error("Existing object is a directory: {key}")]
    ExistingObjectIsDirectory {
        /// The conflicting key.
        key: String,
    },

    /// A parent segment of the key names an existing object.
    #[error("Object parent already exists as a file: {key}")]
    ObjectParentIsFile {
        /// The conflicting key.
        key: String,
    },

    // -----------------------------------------------------------------------
    // Client input
    // -----------------------------------------------------------------------
    /// The requested range is not satisfiable.
    #[error("The requested range is not satisfiable")]
    InvalidRange,

    /// The argument cannot be represented by this backend.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Storage faults
    // -----------------------------------------------------------------------
    /// A filesystem or other I/O failure.
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be decoded.
    #[error("corrupt metadata record: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Anything else.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BackendError {
    /// Convert this error into an [`S3Error`].
    #[must_use]
    pub fn into_s3_error(self) -> S3Error {
        S3Error::from(self)
    }

    /// Whether this error reports an absent bucket.
    #[must_use]
    pub fn is_no_such_bucket(&self) -> bool {
        matches!(self, Self::NoSuchBucket { .. })
    }

    /// Whether this error reports an absent key.
    #[must_use]
    pub fn is_no_such_key(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. })
    }
}

impl From<BackendError> for S3Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NoSuchBucket { bucket } => S3Error::no_such_bucket(bucket),
            BackendError::NoSuchKey { key } => S3Error::no_such_key(key),
            BackendError::NoSuchUpload { upload_id } => S3Error::no_such_upload(upload_id),
            BackendError::BucketAlreadyExists { bucket } => {
                S3Error::new(S3ErrorCode::BucketAlreadyExists).with_resource(bucket)
            }
            BackendError::BucketNotEmpty { bucket } => {
                S3Error::new(S3ErrorCode::BucketNotEmpty).with_resource(bucket)
            }
            BackendError::InvalidPart { part_number } => S3Error::with_message(
                S3ErrorCode::InvalidPart,
                format!(
                    "One or more of the specified parts could not be found. \
                     The part may not have been uploaded, or the specified entity tag may not \
                     match the part's entity tag (part {part_number})."
                ),
            ),
            BackendError::InvalidPartOrder => S3Error::new(S3ErrorCode::InvalidPartOrder),
            BackendError::ExistingObjectIsDirectory { key } => {
                S3Error::new(S3ErrorCode::ExistingObjectIsDirectory).with_resource(key)
            }
            BackendError::ObjectParentIsFile { key } => {
                S3Error::new(S3ErrorCode::ObjectParentIsFile).with_resource(key)
            }
            BackendError::InvalidRange => S3Error::new(S3ErrorCode::InvalidRange),
            BackendError::InvalidArgument { message } => S3Error::invalid_argument(message),
            BackendError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                S3Error::new(S3ErrorCode::AccessDenied).with_source(e)
            }
            BackendError::Io(e) => S3Error::internal_error(e.to_string())
                .with_kind(ErrorKind::IoFailure)
                .with_source(e),
            BackendError::Metadata(e) => S3Error::internal_error(e.to_string())
                .with_kind(ErrorKind::IoFailure)
                .with_source(e),
            BackendError::Internal(e) => {
                let message = format!("{e:#}");
                S3Error::internal_error(message).with_source(InternalSource(e))
            }
        }
    }
}

/// Adapter so an [`anyhow::Error`] can sit in `S3Error::source`.
#[derive(Debug)]
struct InternalSource(anyhow::Error);

impl std::fmt::Display for InternalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for InternalSource {}

/// Convenience result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_convert_no_such_key_to_s3_error() {
        let err = BackendError::NoSuchKey {
            key: "path/to/obj".to_owned(),
        };
        let s3_err: S3Error = err.into();
        assert_eq!(s3_err.code, S3ErrorCode::NoSuchKey);
        assert_eq!(s3_err.resource.as_deref(), Some("path/to/obj"));
    }

    #[test]
    fn test_should_classify_io_failure() {
        let err = BackendError::Io(std::io::Error::other("disk on fire at /srv/data"));
        let s3_err = err.into_s3_error();
        assert_eq!(s3_err.code, S3ErrorCode::InternalError);
        assert_eq!(s3_err.kind, ErrorKind::IoFailure);
        assert!(!s3_err.public_message().contains("/srv/data"));
    }

    #[test]
    fn test_should_map_storage_permission_denied_to_access_denied() {
        let err = BackendError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(err.into_s3_error().code, S3ErrorCode::AccessDenied);
    }

    #[test]
    fn test_should_map_conflicts() {
        let cases = vec![
            (
                BackendError::BucketNotEmpty {
                    bucket: "full".to_owned(),
                },
                S3ErrorCode::BucketNotEmpty,
            ),
            (
                BackendError::InvalidPart { part_number: 2 },
                S3ErrorCode::InvalidPart,
            ),
            (BackendError::InvalidPartOrder, S3ErrorCode::InvalidPartOrder),
            (
                BackendError::ObjectParentIsFile {
                    key: "a/b".to_owned(),
                },
                S3ErrorCode::ObjectParentIsFile,
            ),
        ];
        for (err, code) in cases {
            let s3_err = err.into_s3_error();
            assert_eq!(s3_err.code, code);
            assert_eq!(s3_err.kind, ErrorKind::Conflict);
        }
    }

    #[test]
    fn test_should_keep_internal_source_chain() {
        let err = BackendError::Internal(anyhow::anyhow!("lock poisoned").context("publishing"));
        let s3_err = err.into_s3_error();
        assert_eq!(s3_err.kind, ErrorKind::InternalFault);
        assert!(s3_err.message.contains("lock poisoned"));
        assert!(std::error::Error::source(&s3_err).is_some());
    }
}
