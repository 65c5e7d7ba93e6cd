//! Typed operation outputs consumed by the response encoder.

// Field names mirror the S3 response elements they encode to.
#![allow(missing_docs)]

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::types::{BucketInfo, ObjectInfo, ObjectSummary, Owner, PartInfo, UploadInfo};

#[derive(Debug, Clone)]
pub struct ListBucketsOutput {
    pub owner: Owner,
    pub buckets: Vec<BucketInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateBucketOutput {
    pub location: String,
}

#[derive(Debug, Clone, Default)]
pub struct HeadBucketOutput {
    pub region: String,
}

#[derive(Debug, Clone, Default)]
pub struct GetBucketLocationOutput {
    /// Empty for `us-east-1`, as S3 does.
    pub location_constraint: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsOutput {
    pub name: String,
    pub prefix: String,
    pub marker: String,
    pub delimiter: Option<String>,
    pub max_keys: i32,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Output {
    pub name: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: i32,
    pub key_count: i32,
    pub is_truncated: bool,
    pub continuation_token: Option<String>,
    pub next_continuation_token: Option<String>,
    pub start_after: Option<String>,
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsOutput {
    pub bucket: String,
    pub prefix: String,
    pub key_marker: String,
    pub upload_id_marker: String,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
    pub max_uploads: i32,
    pub is_truncated: bool,
    pub uploads: Vec<UploadInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct PutObjectOutput {
    pub etag: String,
}

/// GetObject result. `content_range` is `(start, end, total)` for ranged
/// reads; `body` then holds only the requested bytes.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    pub info: ObjectInfo,
    pub body: Bytes,
    pub content_range: Option<(u64, u64, u64)>,
}

#[derive(Debug, Clone)]
pub struct HeadObjectOutput {
    pub info: ObjectInfo,
}

#[derive(Debug, Clone)]
pub struct CopyObjectOutput {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMultipartUploadOutput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct UploadPartOutput {
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct ListPartsOutput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub owner: Owner,
    pub part_number_marker: u32,
    pub next_part_number_marker: Option<u32>,
    pub max_parts: i32,
    pub is_truncated: bool,
    pub parts: Vec<PartInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadOutput {
    pub location: String,
    pub bucket: String,
    pub key: String,
    pub etag: String,
}
