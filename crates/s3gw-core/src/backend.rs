//! The storage backend contract.
//!
//! The gateway talks to storage only through [`Backend`]. Every call arrives
//! already validated and authorized, so implementations deal with storage
//! concerns alone: existence, atomic publication, persistence of metadata and
//! ACLs, multipart staging. Implementations are selected at process start and
//! shared as `Arc<dyn Backend>`.
//!
//! # Contract notes
//!
//! - A successful `put_object`, `copy_object` or `complete_multipart_upload`
//!   replaces the previous object atomically: concurrent readers observe the
//!   old object or the new one, never a mix.
//! - Once `delete_object` returns, `get_object` and `head_object` answer
//!   [`BackendError::NoSuchKey`].
//! - `complete_multipart_upload` and `abort_multipart_upload` on the same
//!   upload are mutually exclusive; whichever loses observes
//!   [`BackendError::NoSuchUpload`].
//! - Nothing is promised across calls beyond the above.
//!
//! [`BackendError::NoSuchKey`]: crate::error::BackendError::NoSuchKey
//! [`BackendError::NoSuchUpload`]: crate::error::BackendError::NoSuchUpload

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use s3gw_model::types::{
    AccessControlPolicy, BucketInfo, CompletedPart, ListPage, ListQuery, ObjectInfo, PartInfo,
    UploadInfo,
};

use crate::error::BackendResult;
use crate::utils::ByteRange;

/// Attributes stamped on a newly written object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttrs {
    /// Content type served back on GET/HEAD.
    pub content_type: String,
    /// User metadata, without the `x-amz-meta-` prefix.
    pub metadata: HashMap<String, String>,
    /// Owner and grants.
    pub acl: AccessControlPolicy,
}

/// An object read, possibly restricted to a byte range.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Metadata of the whole object.
    pub info: ObjectInfo,
    /// The payload, or only the requested range of it.
    pub body: Bytes,
    /// Inclusive `(start, end)` when a range was served.
    pub range: Option<(u64, u64)>,
}

/// An in-flight upload with its staged parts, sorted by part number.
#[derive(Debug, Clone)]
pub struct UploadParts {
    /// The upload record.
    pub upload: UploadInfo,
    /// Staged parts.
    pub parts: Vec<PartInfo>,
}

/// Storage capability set that the gateway is written against.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Every bucket, sorted by name.
    async fn list_buckets(&self) -> BackendResult<Vec<BucketInfo>>;

    /// Create a bucket owned by `acl.owner`.
    async fn create_bucket(&self, bucket: &str, acl: AccessControlPolicy)
    -> BackendResult<BucketInfo>;

    /// Bucket record.
    async fn head_bucket(&self, bucket: &str) -> BackendResult<BucketInfo>;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> BackendResult<()>;

    /// Bucket ACL.
    async fn get_bucket_acl(&self, bucket: &str) -> BackendResult<AccessControlPolicy>;

    /// Replace the bucket ACL.
    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlPolicy) -> BackendResult<()>;

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// One page of keys and common prefixes.
    async fn list_objects(&self, bucket: &str, query: &ListQuery) -> BackendResult<ListPage>;

    /// Store an object, replacing any previous one.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo>;

    /// Read an object, or a byte range of it.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BackendResult<ObjectData>;

    /// Object metadata.
    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectInfo>;

    /// Remove an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()>;

    /// Copy the payload of one object to another key with the given attributes.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo>;

    /// Object ACL.
    async fn get_object_acl(&self, bucket: &str, key: &str) -> BackendResult<AccessControlPolicy>;

    /// Replace the object ACL.
    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: AccessControlPolicy,
    ) -> BackendResult<()>;

    // -----------------------------------------------------------------------
    // Multipart uploads
    // -----------------------------------------------------------------------

    /// Start an upload; the attributes apply to the completed object.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<UploadInfo>;

    /// Stage a part, replacing any earlier part with the same number.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> BackendResult<PartInfo>;

    /// The upload and all of its staged parts.
    async fn list_parts(&self, bucket: &str, key: &str, upload_id: &str)
    -> BackendResult<UploadParts>;

    /// Assemble the listed parts, in the given (ascending) order, into the
    /// object and discard the staging state.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BackendResult<ObjectInfo>;

    /// Discard an upload and every staged part.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<()>;

    /// In-flight uploads whose key starts with `prefix`, sorted by key then
    /// upload id.
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> BackendResult<Vec<UploadInfo>>;
}
