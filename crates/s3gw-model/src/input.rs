//! Typed operation inputs, one per [`crate::S3Operation`].
//!
//! Inputs carry only what the request said. Ownership and the effective ACL
//! are decided by the gateway from the verified identity.

// Field names mirror the S3 request parameters they come from.
#![allow(missing_docs)]

use std::collections::HashMap;

use bytes::Bytes;

use crate::types::{AccessControlPolicy, CannedAcl, CompletedPart, MetadataDirective};

/// ListBuckets input (no parameters).
#[derive(Debug, Clone, Default)]
pub struct ListBucketsInput;

/// CreateBucket input.
#[derive(Debug, Clone, Default)]
pub struct CreateBucketInput {
    pub bucket: String,
    pub acl: Option<CannedAcl>,
}

/// DeleteBucket input.
#[derive(Debug, Clone, Default)]
pub struct DeleteBucketInput {
    pub bucket: String,
}

/// HeadBucket input.
#[derive(Debug, Clone, Default)]
pub struct HeadBucketInput {
    pub bucket: String,
}

/// GetBucketLocation input.
#[derive(Debug, Clone, Default)]
pub struct GetBucketLocationInput {
    pub bucket: String,
}

/// GetBucketAcl input.
#[derive(Debug, Clone, Default)]
pub struct GetBucketAclInput {
    pub bucket: String,
}

/// PutBucketAcl input. Exactly one of `acl` and `policy` is set.
#[derive(Debug, Clone, Default)]
pub struct PutBucketAclInput {
    pub bucket: String,
    pub acl: Option<CannedAcl>,
    pub policy: Option<AccessControlPolicy>,
}

/// ListObjects (v1) input.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsInput {
    pub bucket: String,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: Option<i32>,
}

/// ListObjectsV2 input.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Input {
    pub bucket: String,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
    pub max_keys: Option<i32>,
    pub fetch_owner: bool,
}

/// ListMultipartUploads input.
#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsInput {
    pub bucket: String,
    pub prefix: Option<String>,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub max_uploads: Option<i32>,
}

/// PutObject input.
#[derive(Debug, Clone, Default)]
pub struct PutObjectInput {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub content_md5: Option<String>,
    pub metadata: HashMap<String, String>,
    pub acl: Option<CannedAcl>,
}

/// GetObject input.
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    pub bucket: String,
    pub key: String,
    pub range: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

/// HeadObject input.
#[derive(Debug, Clone, Default)]
pub struct HeadObjectInput {
    pub bucket: String,
    pub key: String,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

/// DeleteObject input.
#[derive(Debug, Clone, Default)]
pub struct DeleteObjectInput {
    pub bucket: String,
    pub key: String,
}

/// CopyObject input.
#[derive(Debug, Clone, Default)]
pub struct CopyObjectInput {
    pub bucket: String,
    pub key: String,
    pub source_bucket: String,
    pub source_key: String,
    pub metadata_directive: MetadataDirective,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub acl: Option<CannedAcl>,
}

/// GetObjectAcl input.
#[derive(Debug, Clone, Default)]
pub struct GetObjectAclInput {
    pub bucket: String,
    pub key: String,
}

/// PutObjectAcl input. Exactly one of `acl` and `policy` is set.
#[derive(Debug, Clone, Default)]
pub struct PutObjectAclInput {
    pub bucket: String,
    pub key: String,
    pub acl: Option<CannedAcl>,
    pub policy: Option<AccessControlPolicy>,
}

/// CreateMultipartUpload input.
#[derive(Debug, Clone, Default)]
pub struct CreateMultipartUploadInput {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub acl: Option<CannedAcl>,
}

/// UploadPart input.
#[derive(Debug, Clone, Default)]
pub struct UploadPartInput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number: u32,
    pub body: Bytes,
    pub content_md5: Option<String>,
}

/// ListParts input.
#[derive(Debug, Clone, Default)]
pub struct ListPartsInput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub max_parts: Option<i32>,
    pub part_number_marker: Option<u32>,
}

/// CompleteMultipartUpload input.
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadInput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
}

/// AbortMultipartUpload input.
#[derive(Debug, Clone, Default)]
pub struct AbortMultipartUploadInput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}
