//! The fixed set of S3 operations the gateway understands.

/// An S3 operation, identified from method, path and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    /// `GET /`: buckets visible to the caller.
    ListBuckets,
    /// `PUT /{bucket}`.
    CreateBucket,
    /// `DELETE /{bucket}`; the bucket must be empty.
    DeleteBucket,
    /// `HEAD /{bucket}`.
    HeadBucket,
    /// `GET /{bucket}?location`.
    GetBucketLocation,
    /// `GET /{bucket}?acl`.
    GetBucketAcl,
    /// `PUT /{bucket}?acl`, canned header or policy body.
    PutBucketAcl,
    /// `GET /{bucket}`, marker pagination.
    ListObjects,
    /// `GET /{bucket}?list-type=2`, continuation-token pagination.
    ListObjectsV2,
    /// `GET /{bucket}?uploads`.
    ListMultipartUploads,
    /// `PUT /{bucket}/{key}`.
    PutObject,
    /// `GET /{bucket}/{key}`, optionally ranged.
    GetObject,
    /// `HEAD /{bucket}/{key}`.
    HeadObject,
    /// `DELETE /{bucket}/{key}`; idempotent.
    DeleteObject,
    /// `PUT /{bucket}/{key}` with `x-amz-copy-source`.
    CopyObject,
    /// `GET /{bucket}/{key}?acl`.
    GetObjectAcl,
    /// `PUT /{bucket}/{key}?acl`.
    PutObjectAcl,
    /// `POST /{bucket}/{key}?uploads`.
    CreateMultipartUpload,
    /// `PUT /{bucket}/{key}?partNumber&uploadId`.
    UploadPart,
    /// `GET /{bucket}/{key}?uploadId`.
    ListParts,
    /// `POST /{bucket}/{key}?uploadId`.
    CompleteMultipartUpload,
    /// `DELETE /{bucket}/{key}?uploadId`.
    AbortMultipartUpload,
}

impl S3Operation {
    /// The operation name as S3 spells it.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListBuckets => "ListBuckets",
            Self::CreateBucket => "CreateBucket",
            Self::DeleteBucket => "DeleteBucket",
            Self::HeadBucket => "HeadBucket",
            Self::GetBucketLocation => "GetBucketLocation",
            Self::GetBucketAcl => "GetBucketAcl",
            Self::PutBucketAcl => "PutBucketAcl",
            Self::ListObjects => "ListObjects",
            Self::ListObjectsV2 => "ListObjectsV2",
            Self::ListMultipartUploads => "ListMultipartUploads",
            Self::PutObject => "PutObject",
            Self::GetObject => "GetObject",
            Self::HeadObject => "HeadObject",
            Self::DeleteObject => "DeleteObject",
            Self::CopyObject => "CopyObject",
            Self::GetObjectAcl => "GetObjectAcl",
            Self::PutObjectAcl => "PutObjectAcl",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::ListParts => "ListParts",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
        }
    }

    /// Whether the operation addresses an object key rather than a bucket.
    #[must_use]
    pub fn is_object_operation(&self) -> bool {
        matches!(
            self,
            Self::PutObject
                | Self::GetObject
                | Self::HeadObject
                | Self::DeleteObject
                | Self::CopyObject
                | Self::GetObjectAcl
                | Self::PutObjectAcl
                | Self::CreateMultipartUpload
                | Self::UploadPart
                | Self::ListParts
                | Self::CompleteMultipartUpload
                | Self::AbortMultipartUpload
        )
    }

    /// Whether the request body carries object payload bytes.
    #[must_use]
    pub fn requires_content_length(&self) -> bool {
        matches!(self, Self::PutObject | Self::UploadPart)
    }
}

impl std::fmt::Display for S3Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
