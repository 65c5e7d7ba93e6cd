//! Typed operation output to HTTP response.
//!
//! Responses fall into three shapes:
//! - **XML body**: listings, ACL documents, multipart results and copy.
//! - **Header only**: writes that report an ETag, HEAD requests, deletes.
//! - **Payload**: GetObject passes the object bytes through with its metadata
//!   mirrored into headers.
//!
//! Errors always go through [`error_to_response`], which renders the
//! `<Error>` document and never exposes internal error detail.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use http::header::HeaderValue;
use s3gw_model::output::{
    CompleteMultipartUploadOutput, CopyObjectOutput, CreateBucketOutput,
    CreateMultipartUploadOutput, GetBucketLocationOutput, GetObjectOutput, HeadBucketOutput,
    HeadObjectOutput, ListBucketsOutput, ListMultipartUploadsOutput, ListObjectsOutput,
    ListObjectsV2Output, ListPartsOutput, PutObjectOutput, UploadPartOutput,
};
use s3gw_model::types::ObjectInfo;
use s3gw_model::{AccessControlPolicy, S3Error, S3ErrorCode};
use s3gw_xml::{S3Serialize, error_to_xml, to_xml};

use crate::body::S3ResponseBody;

/// Content type of every XML document the gateway returns.
const XML_CONTENT_TYPE: &str = "application/xml";

/// Convert an operation output into an HTTP response.
pub trait IntoS3Response {
    /// Build the response.
    ///
    /// # Errors
    ///
    /// Returns an `S3Error` if the body cannot be rendered or a header value
    /// is not representable.
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Set a header when a value is present and representable.
fn set_optional_header(
    builder: http::response::Builder,
    name: &str,
    value: Option<&str>,
) -> http::response::Builder {
    match value.and_then(|v| HeaderValue::from_str(v).ok()) {
        Some(hv) => builder.header(name, hv),
        None => builder,
    }
}

/// Mirror user metadata into `x-amz-meta-*` headers.
fn set_metadata_headers(
    mut builder: http::response::Builder,
    info: &ObjectInfo,
) -> http::response::Builder {
    for (key, value) in &info.metadata {
        builder = set_optional_header(builder, &format!("x-amz-meta-{key}"), Some(value));
    }
    builder
}

/// RFC 7231 date, as S3 sends in `Last-Modified`.
fn http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn build_response(
    builder: http::response::Builder,
    body: S3ResponseBody,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    builder
        .body(body)
        .map_err(|e| S3Error::internal_error(format!("failed to build response: {e}")))
}

/// 200 with an XML document rendered under `root`.
fn xml_response<T: S3Serialize>(
    root: &str,
    value: &T,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let xml = to_xml(root, value)
        .map_err(|e| S3Error::internal_error(format!("failed to render {root}: {e}")))?;
    build_response(
        http::Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", XML_CONTENT_TYPE)
            .header("Content-Length", xml.len()),
        S3ResponseBody::from_xml(xml),
    )
}

/// Headers shared by GetObject and HeadObject.
fn object_headers(
    builder: http::response::Builder,
    info: &ObjectInfo,
    content_length: u64,
) -> http::response::Builder {
    let builder = set_optional_header(builder, "Content-Type", Some(&info.content_type))
        .header("Content-Length", content_length)
        .header("Accept-Ranges", "bytes");
    let builder = set_optional_header(builder, "ETag", Some(&info.etag))
        .header("Last-Modified", http_date(&info.last_modified));
    set_metadata_headers(builder, info)
}

/// An empty response with `status`, for operations without output.
#[must_use]
pub fn empty_response(status: StatusCode) -> http::Response<S3ResponseBody> {
    let mut response = http::Response::new(S3ResponseBody::empty());
    *response.status_mut() = status;
    response
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

impl IntoS3Response for ListBucketsOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("ListAllMyBucketsResult", &self)
    }
}

impl IntoS3Response for CreateBucketOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        let builder = set_optional_header(
            http::Response::builder().status(StatusCode::OK),
            "Location",
            Some(&self.location),
        );
        build_response(builder, S3ResponseBody::empty())
    }
}

impl IntoS3Response for HeadBucketOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        let builder = set_optional_header(
            http::Response::builder().status(StatusCode::OK),
            "x-amz-bucket-region",
            Some(&self.region),
        );
        build_response(builder, S3ResponseBody::empty())
    }
}

impl IntoS3Response for GetBucketLocationOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("LocationConstraint", &self)
    }
}

impl IntoS3Response for AccessControlPolicy {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("AccessControlPolicy", &self)
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

impl IntoS3Response for ListObjectsOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("ListBucketResult", &self)
    }
}

impl IntoS3Response for ListObjectsV2Output {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("ListBucketResult", &self)
    }
}

impl IntoS3Response for ListMultipartUploadsOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("ListMultipartUploadsResult", &self)
    }
}

impl IntoS3Response for ListPartsOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("ListPartsResult", &self)
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

impl IntoS3Response for PutObjectOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        let builder = set_optional_header(
            http::Response::builder().status(StatusCode::OK),
            "ETag",
            Some(&self.etag),
        );
        build_response(builder, S3ResponseBody::empty())
    }
}

impl IntoS3Response for GetObjectOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        let length = self.body.len() as u64;
        let mut builder = object_headers(http::Response::builder(), &self.info, length);
        builder = match self.content_range {
            Some((start, end, total)) => builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header("Content-Range", format!("bytes {start}-{end}/{total}")),
            None => builder.status(StatusCode::OK),
        };
        build_response(builder, S3ResponseBody::from_bytes(self.body))
    }
}

impl IntoS3Response for HeadObjectOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        let builder = object_headers(
            http::Response::builder().status(StatusCode::OK),
            &self.info,
            self.info.size,
        );
        build_response(builder, S3ResponseBody::empty())
    }
}

impl IntoS3Response for CopyObjectOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("CopyObjectResult", &self)
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

impl IntoS3Response for CreateMultipartUploadOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("InitiateMultipartUploadResult", &self)
    }
}

impl IntoS3Response for UploadPartOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        let builder = set_optional_header(
            http::Response::builder().status(StatusCode::OK),
            "ETag",
            Some(&self.etag),
        );
        build_response(builder, S3ResponseBody::empty())
    }
}

impl IntoS3Response for CompleteMultipartUploadOutput {
    fn into_s3_response(self) -> Result<http::Response<S3ResponseBody>, S3Error> {
        xml_response("CompleteMultipartUploadResult", &self)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Render an error as an S3 `<Error>` response.
///
/// `InternalError` carries only the generic message; whatever detail the
/// error holds stays in the logs. `NotModified` is a 304 with no body.
#[must_use]
pub fn error_to_response(err: &S3Error, request_id: &str) -> http::Response<S3ResponseBody> {
    if err.code == S3ErrorCode::NotModified {
        return empty_response(StatusCode::NOT_MODIFIED);
    }
    let resource = if err.code == S3ErrorCode::InternalError {
        None
    } else {
        err.resource.as_deref()
    };
    let xml = error_to_xml(err.code.as_str(), err.public_message(), resource, request_id);
    let length = xml.len();
    http::Response::builder()
        .status(err.status_code)
        .header("Content-Type", XML_CONTENT_TYPE)
        .header("Content-Length", length)
        .body(S3ResponseBody::from_bytes(Bytes::from(xml)))
        .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR))
}
