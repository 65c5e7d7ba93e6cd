//! HTTP request to typed operation input.
//!
//! [`FromS3Request`] turns the request head, the routed bucket and key, the
//! decoded query and the collected body into one of the input structs in
//! [`s3gw_model::input`]. Decoding is strict: a numeric parameter that does
//! not parse, an unknown canned ACL or a malformed XML body is rejected here
//! rather than defaulted.

use std::collections::HashMap;

use bytes::Bytes;
use s3gw_core::utils::parse_copy_source;
use s3gw_model::input::{
    AbortMultipartUploadInput, CompleteMultipartUploadInput, CopyObjectInput,
    CreateBucketInput, CreateMultipartUploadInput, DeleteBucketInput, DeleteObjectInput,
    GetBucketAclInput, GetBucketLocationInput, GetObjectAclInput, GetObjectInput,
    HeadBucketInput, HeadObjectInput, ListBucketsInput, ListMultipartUploadsInput,
    ListObjectsInput, ListObjectsV2Input, ListPartsInput, PutBucketAclInput, PutObjectAclInput,
    PutObjectInput, UploadPartInput,
};
use s3gw_model::types::MetadataDirective;
use s3gw_model::{AccessControlPolicy, CannedAcl, S3Error};
use s3gw_xml::{CompleteMultipartUploadRequest, S3Deserialize, from_xml};

/// Header prefix for user metadata.
const META_PREFIX: &str = "x-amz-meta-";

/// Explicit grant headers; only canned ACLs are supported.
const GRANT_HEADERS: &[&str] = &[
    "x-amz-grant-read",
    "x-amz-grant-write",
    "x-amz-grant-read-acp",
    "x-amz-grant-write-acp",
    "x-amz-grant-full-control",
];

/// Build an operation input from request components.
pub trait FromS3Request: Sized {
    /// Decode the input.
    ///
    /// # Errors
    ///
    /// Returns an `S3Error` if a required part is missing or a value cannot
    /// be parsed.
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        query_params: &[(String, String)],
        body: Bytes,
    ) -> Result<Self, S3Error>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A header value as a string. Non-ASCII values are treated as absent.
pub fn header_str(parts: &http::request::Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

/// A query parameter value by name.
#[must_use]
pub fn query_param(params: &[(String, String)], name: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// A numeric query parameter. Present but unparsable is an error.
fn query_int<T: std::str::FromStr>(
    params: &[(String, String)],
    name: &str,
) -> Result<Option<T>, S3Error> {
    query_param(params, name)
        .map(|raw| {
            raw.parse().map_err(|_| {
                S3Error::invalid_argument(format!("{name} must be an integer, got '{raw}'"))
            })
        })
        .transpose()
}

/// `x-amz-meta-*` headers, keyed by the lowercase suffix.
#[must_use]
pub fn collect_metadata(parts: &http::request::Parts) -> HashMap<String, String> {
    parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            let suffix = name.as_str().strip_prefix(META_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((suffix.to_owned(), value.to_owned()))
        })
        .collect()
}

/// The canned ACL named by `x-amz-acl`, rejecting explicit grant headers.
fn canned_acl(parts: &http::request::Parts) -> Result<Option<CannedAcl>, S3Error> {
    if let Some(header) = GRANT_HEADERS
        .iter()
        .find(|h| parts.headers.contains_key(**h))
    {
        return Err(S3Error::not_implemented(*header));
    }
    header_str(parts, "x-amz-acl")
        .map(|raw| {
            CannedAcl::parse(&raw)
                .ok_or_else(|| S3Error::invalid_argument(format!("Unknown canned ACL '{raw}'")))
        })
        .transpose()
}

fn require_bucket(bucket: Option<&str>) -> Result<String, S3Error> {
    bucket
        .map(ToOwned::to_owned)
        .ok_or_else(|| S3Error::invalid_argument("Bucket name is required"))
}

fn require_key(key: Option<&str>) -> Result<String, S3Error> {
    key.map(ToOwned::to_owned)
        .ok_or_else(|| S3Error::invalid_argument("Object key is required"))
}

fn require_upload_id(params: &[(String, String)]) -> Result<String, S3Error> {
    query_param(params, "uploadId")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| S3Error::invalid_argument("uploadId is required"))
}

fn parse_xml_body<T: S3Deserialize>(body: &[u8]) -> Result<T, S3Error> {
    from_xml(body).map_err(|e| S3Error::malformed_xml(e.to_string()))
}

/// An ACL document body, if one was sent.
fn acl_policy_body(body: &Bytes) -> Result<Option<AccessControlPolicy>, S3Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    parse_xml_body(body).map(Some)
}

fn metadata_directive(parts: &http::request::Parts) -> Result<MetadataDirective, S3Error> {
    match header_str(parts, "x-amz-metadata-directive").as_deref() {
        None | Some("COPY") => Ok(MetadataDirective::Copy),
        Some("REPLACE") => Ok(MetadataDirective::Replace),
        Some(other) => Err(S3Error::invalid_argument(format!(
            "Unknown metadata directive '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

impl FromS3Request for ListBucketsInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        _bucket: Option<&str>,
        _key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self)
    }
}

impl FromS3Request for CreateBucketInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        _key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        // A CreateBucketConfiguration body only names the location
        // constraint, which is fixed by the gateway region.
        Ok(Self {
            bucket: require_bucket(bucket)?,
            acl: canned_acl(parts)?,
        })
    }
}

/// Inputs that carry nothing but the bucket name.
macro_rules! bucket_only_input {
    ($($input:ty),+ $(,)?) => {
        $(
            impl FromS3Request for $input {
                fn from_s3_request(
                    _parts: &http::request::Parts,
                    bucket: Option<&str>,
                    _key: Option<&str>,
                    _query_params: &[(String, String)],
                    _body: Bytes,
                ) -> Result<Self, S3Error> {
                    Ok(Self {
                        bucket: require_bucket(bucket)?,
                    })
                }
            }
        )+
    };
}

bucket_only_input!(
    DeleteBucketInput,
    HeadBucketInput,
    GetBucketLocationInput,
    GetBucketAclInput,
);

impl FromS3Request for PutBucketAclInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        _key: Option<&str>,
        _query_params: &[(String, String)],
        body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            acl: canned_acl(parts)?,
            policy: acl_policy_body(&body)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

impl FromS3Request for ListObjectsInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        _key: Option<&str>,
        query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            prefix: query_param(query_params, "prefix"),
            delimiter: query_param(query_params, "delimiter"),
            marker: query_param(query_params, "marker"),
            max_keys: query_int(query_params, "max-keys")?,
        })
    }
}

impl FromS3Request for ListObjectsV2Input {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        _key: Option<&str>,
        query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            prefix: query_param(query_params, "prefix"),
            delimiter: query_param(query_params, "delimiter"),
            continuation_token: query_param(query_params, "continuation-token"),
            start_after: query_param(query_params, "start-after"),
            max_keys: query_int(query_params, "max-keys")?,
            fetch_owner: query_param(query_params, "fetch-owner")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

impl FromS3Request for ListMultipartUploadsInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        _key: Option<&str>,
        query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            prefix: query_param(query_params, "prefix"),
            key_marker: query_param(query_params, "key-marker"),
            upload_id_marker: query_param(query_params, "upload-id-marker"),
            max_uploads: query_int(query_params, "max-uploads")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

impl FromS3Request for PutObjectInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            body,
            content_type: header_str(parts, "content-type"),
            content_md5: header_str(parts, "content-md5"),
            metadata: collect_metadata(parts),
            acl: canned_acl(parts)?,
        })
    }
}

impl FromS3Request for GetObjectInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            range: header_str(parts, "range"),
            if_match: header_str(parts, "if-match"),
            if_none_match: header_str(parts, "if-none-match"),
        })
    }
}

impl FromS3Request for HeadObjectInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            if_match: header_str(parts, "if-match"),
            if_none_match: header_str(parts, "if-none-match"),
        })
    }
}

impl FromS3Request for DeleteObjectInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
        })
    }
}

impl FromS3Request for CopyObjectInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        let source = header_str(parts, "x-amz-copy-source")
            .ok_or_else(|| S3Error::invalid_argument("x-amz-copy-source is required"))?;
        let (source_bucket, source_key) = parse_copy_source(&source)?;
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            source_bucket,
            source_key,
            metadata_directive: metadata_directive(parts)?,
            content_type: header_str(parts, "content-type"),
            metadata: collect_metadata(parts),
            acl: canned_acl(parts)?,
        })
    }
}

impl FromS3Request for GetObjectAclInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
        })
    }
}

impl FromS3Request for PutObjectAclInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            acl: canned_acl(parts)?,
            policy: acl_policy_body(&body)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

impl FromS3Request for CreateMultipartUploadInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        _query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            content_type: header_str(parts, "content-type"),
            metadata: collect_metadata(parts),
            acl: canned_acl(parts)?,
        })
    }
}

impl FromS3Request for UploadPartInput {
    fn from_s3_request(
        parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        query_params: &[(String, String)],
        body: Bytes,
    ) -> Result<Self, S3Error> {
        let part_number = query_int(query_params, "partNumber")?
            .ok_or_else(|| S3Error::invalid_argument("partNumber is required"))?;
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            upload_id: require_upload_id(query_params)?,
            part_number,
            body,
            content_md5: header_str(parts, "content-md5"),
        })
    }
}

impl FromS3Request for ListPartsInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            upload_id: require_upload_id(query_params)?,
            max_parts: query_int(query_params, "max-parts")?,
            part_number_marker: query_int(query_params, "part-number-marker")?,
        })
    }
}

impl FromS3Request for CompleteMultipartUploadInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        query_params: &[(String, String)],
        body: Bytes,
    ) -> Result<Self, S3Error> {
        if body.is_empty() {
            return Err(S3Error::malformed_xml("empty CompleteMultipartUpload body"));
        }
        let request: CompleteMultipartUploadRequest = parse_xml_body(&body)?;
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            upload_id: require_upload_id(query_params)?,
            parts: request.parts,
        })
    }
}

impl FromS3Request for AbortMultipartUploadInput {
    fn from_s3_request(
        _parts: &http::request::Parts,
        bucket: Option<&str>,
        key: Option<&str>,
        query_params: &[(String, String)],
        _body: Bytes,
    ) -> Result<Self, S3Error> {
        Ok(Self {
            bucket: require_bucket(bucket)?,
            key: require_key(key)?,
            upload_id: require_upload_id(query_params)?,
        })
    }
}
