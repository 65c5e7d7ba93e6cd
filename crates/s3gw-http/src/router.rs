//! Operation Router: (method, path, query, headers) to [`S3Operation`].
//!
//! The bucket comes from the first path segment, or from the `Host` header
//! when virtual-hosted-style addressing is enabled and the host is
//! `<bucket>.<domain>`. Everything after the bucket is the key.
//!
//! Besides classification the router checks what can be checked without
//! touching storage: bucket name syntax, key length and the presence of
//! `Content-Length` on payload uploads. Sub-resources S3 defines but the
//! gateway does not implement (`?versioning`, `?tagging`, ...) are answered
//! with `NotImplemented` instead of silently falling through to a plain
//! object or bucket operation.

use http::Method;
use percent_encoding::percent_decode_str;
use s3gw_core::validation::{validate_bucket_name, validate_object_key};
use s3gw_model::{S3Error, S3ErrorCode, S3Operation};

/// Sub-resources that select an operation this gateway does not implement.
const UNSUPPORTED_SUBRESOURCES: &[&str] = &[
    "accelerate",
    "analytics",
    "attributes",
    "cors",
    "delete",
    "encryption",
    "intelligent-tiering",
    "inventory",
    "legal-hold",
    "lifecycle",
    "logging",
    "metrics",
    "notification",
    "object-lock",
    "ownershipControls",
    "policy",
    "policyStatus",
    "publicAccessBlock",
    "replication",
    "requestPayment",
    "restore",
    "retention",
    "select",
    "tagging",
    "torrent",
    "versioning",
    "versions",
    "website",
];

/// Request router.
#[derive(Debug, Clone)]
pub struct S3Router {
    /// Base domain for virtual-hosted-style requests.
    pub domain: String,
    /// Whether `<bucket>.<domain>` hosts are recognized.
    pub virtual_hosting: bool,
}

/// A classified request.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// Bucket name, if any.
    pub bucket: Option<String>,
    /// Object key, if any.
    pub key: Option<String>,
    /// The operation.
    pub operation: S3Operation,
    /// Decoded query parameters in request order.
    pub query_params: Vec<(String, String)>,
}

impl S3Router {
    /// Create a router.
    #[must_use]
    pub fn new(domain: impl Into<String>, virtual_hosting: bool) -> Self {
        Self {
            domain: domain.into(),
            virtual_hosting,
        }
    }

    /// Classify a request and check its structural preconditions.
    ///
    /// # Errors
    ///
    /// `MethodNotAllowed` or `NotImplemented` for requests that name no
    /// supported operation, `InvalidURI`, `InvalidBucketName`,
    /// `KeyTooLongError` and `MissingContentLength` for malformed ones.
    pub fn resolve<B>(&self, req: &http::Request<B>) -> Result<RoutingContext, S3Error> {
        let uri = req.uri();
        let headers = req.headers();
        let query_params = parse_query_params(uri.query().unwrap_or(""))?;

        let virtual_bucket = if self.virtual_hosting {
            extract_virtual_host_bucket(headers, &self.domain)
        } else {
            None
        };
        let (bucket, key) = match virtual_bucket {
            Some(bucket) => (Some(bucket), parse_key(uri.path())?),
            None => parse_path(uri.path())?,
        };

        if let Some(name) = query_params
            .iter()
            .map(|(k, _)| k.as_str())
            .find(|k| UNSUPPORTED_SUBRESOURCES.contains(k))
        {
            return Err(S3Error::not_implemented(format!("?{name}")));
        }

        let operation = identify_operation(
            req.method(),
            bucket.as_deref(),
            key.as_deref(),
            &query_params,
            headers,
        )?;

        if let Some(bucket) = &bucket {
            validate_bucket_name(bucket)?;
        }
        if let Some(key) = &key {
            validate_object_key(key)?;
        }
        if operation.requires_content_length()
            && !headers.contains_key(http::header::CONTENT_LENGTH)
        {
            return Err(S3Error::new(S3ErrorCode::MissingContentLength));
        }

        Ok(RoutingContext {
            bucket,
            key,
            operation,
            query_params,
        })
    }
}

/// `mybucket.s3.local:7070` with domain `s3.local` is bucket `mybucket`.
fn extract_virtual_host_bucket(headers: &http::HeaderMap, domain: &str) -> Option<String> {
    let host = headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())?;
    let host = host.split(':').next().unwrap_or(host);
    host.strip_suffix(domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|bucket| !bucket.is_empty())
        .map(ToOwned::to_owned)
}

type BucketAndKey = (Option<String>, Option<String>);

/// `/{bucket}` or `/{bucket}/{key...}`.
fn parse_path(path: &str) -> Result<BucketAndKey, S3Error> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok((None, None));
    }
    match trimmed.split_once('/') {
        Some((bucket, key)) => Ok((
            Some(decode_uri_component(bucket)?),
            parse_key(key)?,
        )),
        None => Ok((Some(decode_uri_component(trimmed)?), None)),
    }
}

/// The whole path as a key, for virtual-hosted requests.
fn parse_key(path: &str) -> Result<Option<String>, S3Error> {
    let raw = path.strip_prefix('/').unwrap_or(path);
    if raw.is_empty() {
        return Ok(None);
    }
    decode_uri_component(raw).map(Some)
}

/// Percent-decode one component. Sequences that do not decode to UTF-8 are
/// refused: replacing them would fold distinct raw keys onto one name.
fn decode_uri_component(s: &str) -> Result<String, S3Error> {
    percent_decode_str(s)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| S3Error::invalid_uri(format!("'{s}' does not decode to UTF-8")))
}

/// Split and percent-decode a query string. `+` is a literal plus in S3
/// requests, not a space.
pub(crate) fn parse_query_params(query: &str) -> Result<Vec<(String, String)>, S3Error> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => Ok((decode_uri_component(k)?, decode_uri_component(v)?)),
            None => Ok((decode_uri_component(pair)?, String::new())),
        })
        .collect()
}

fn has_param(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

fn identify_operation(
    method: &Method,
    bucket: Option<&str>,
    key: Option<&str>,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    match (bucket, key) {
        (None, _) if *method == Method::GET => Ok(S3Operation::ListBuckets),
        (None, _) => Err(S3Error::with_message(
            S3ErrorCode::MethodNotAllowed,
            "Only GET is allowed at the service level",
        )),
        (Some(_), None) => identify_bucket_operation(method, params),
        (Some(_), Some(_)) => identify_object_operation(method, params, headers),
    }
}

fn identify_bucket_operation(
    method: &Method,
    params: &[(String, String)],
) -> Result<S3Operation, S3Error> {
    let op = match *method {
        Method::GET => {
            if params.iter().any(|(k, v)| k == "list-type" && v == "2") {
                S3Operation::ListObjectsV2
            } else if has_param(params, "location") {
                S3Operation::GetBucketLocation
            } else if has_param(params, "acl") {
                S3Operation::GetBucketAcl
            } else if has_param(params, "uploads") {
                S3Operation::ListMultipartUploads
            } else {
                S3Operation::ListObjects
            }
        }
        Method::PUT if has_param(params, "acl") => S3Operation::PutBucketAcl,
        Method::PUT => S3Operation::CreateBucket,
        Method::DELETE => S3Operation::DeleteBucket,
        Method::HEAD => S3Operation::HeadBucket,
        _ => return Err(S3Error::method_not_allowed(method.as_str())),
    };
    Ok(op)
}

fn identify_object_operation(
    method: &Method,
    params: &[(String, String)],
    headers: &http::HeaderMap,
) -> Result<S3Operation, S3Error> {
    let has_upload_id = has_param(params, "uploadId");
    let op = match *method {
        Method::GET if has_param(params, "acl") => S3Operation::GetObjectAcl,
        Method::GET if has_upload_id => S3Operation::ListParts,
        Method::GET => S3Operation::GetObject,
        Method::HEAD => S3Operation::HeadObject,
        Method::PUT => {
            let has_copy_source = headers.contains_key("x-amz-copy-source");
            if has_param(params, "acl") {
                S3Operation::PutObjectAcl
            } else if has_param(params, "partNumber") && has_upload_id {
                if has_copy_source {
                    return Err(S3Error::not_implemented("UploadPartCopy"));
                }
                S3Operation::UploadPart
            } else if has_copy_source {
                S3Operation::CopyObject
            } else {
                S3Operation::PutObject
            }
        }
        Method::DELETE if has_upload_id => S3Operation::AbortMultipartUpload,
        Method::DELETE => S3Operation::DeleteObject,
        Method::POST if has_param(params, "uploads") => S3Operation::CreateMultipartUpload,
        Method::POST if has_upload_id => S3Operation::CompleteMultipartUpload,
        _ => return Err(S3Error::method_not_allowed(method.as_str())),
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn path_router() -> S3Router {
        S3Router::new("s3.local", false)
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if matches!(method, Method::PUT) {
            builder = builder.header("content-length", "0");
        }
        builder.body(()).unwrap()
    }

    fn op(method: Method, uri: &str) -> S3Operation {
        path_router()
            .resolve(&request(method, uri))
            .unwrap()
            .operation
    }

    #[test]
    fn test_should_route_bucket_operations() {
        assert_eq!(op(Method::GET, "/"), S3Operation::ListBuckets);
        assert_eq!(op(Method::PUT, "/bucket"), S3Operation::CreateBucket);
        assert_eq!(op(Method::DELETE, "/bucket"), S3Operation::DeleteBucket);
        assert_eq!(op(Method::HEAD, "/bucket"), S3Operation::HeadBucket);
        assert_eq!(op(Method::GET, "/bucket"), S3Operation::ListObjects);
        assert_eq!(op(Method::GET, "/bucket/"), S3Operation::ListObjects);
        assert_eq!(
            op(Method::GET, "/bucket?list-type=2&prefix=a"),
            S3Operation::ListObjectsV2
        );
        assert_eq!(
            op(Method::GET, "/bucket?location"),
            S3Operation::GetBucketLocation
        );
        assert_eq!(op(Method::GET, "/bucket?acl"), S3Operation::GetBucketAcl);
        assert_eq!(op(Method::PUT, "/bucket?acl"), S3Operation::PutBucketAcl);
        assert_eq!(
            op(Method::GET, "/bucket?uploads"),
            S3Operation::ListMultipartUploads
        );
    }

    #[test]
    fn test_should_route_object_operations() {
        assert_eq!(op(Method::PUT, "/bucket/key"), S3Operation::PutObject);
        assert_eq!(op(Method::GET, "/bucket/key"), S3Operation::GetObject);
        assert_eq!(op(Method::HEAD, "/bucket/key"), S3Operation::HeadObject);
        assert_eq!(op(Method::DELETE, "/bucket/key"), S3Operation::DeleteObject);
        assert_eq!(op(Method::GET, "/bucket/key?acl"), S3Operation::GetObjectAcl);
        assert_eq!(op(Method::PUT, "/bucket/key?acl"), S3Operation::PutObjectAcl);
    }

    #[test]
    fn test_should_route_multipart_operations() {
        assert_eq!(
            op(Method::POST, "/bucket/key?uploads"),
            S3Operation::CreateMultipartUpload
        );
        assert_eq!(
            op(Method::PUT, "/bucket/key?partNumber=2&uploadId=u"),
            S3Operation::UploadPart
        );
        assert_eq!(op(Method::GET, "/bucket/key?uploadId=u"), S3Operation::ListParts);
        assert_eq!(
            op(Method::POST, "/bucket/key?uploadId=u"),
            S3Operation::CompleteMultipartUpload
        );
        assert_eq!(
            op(Method::DELETE, "/bucket/key?uploadId=u"),
            S3Operation::AbortMultipartUpload
        );
    }

    #[test]
    fn test_should_route_copy_by_header() {
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/bucket/dst")
            .header("x-amz-copy-source", "/bucket/src")
            .header("content-length", "0")
            .body(())
            .unwrap();
        let ctx = path_router().resolve(&req).unwrap();
        assert_eq!(ctx.operation, S3Operation::CopyObject);
    }

    #[test]
    fn test_should_decode_nested_key() {
        let ctx = path_router()
            .resolve(&request(Method::GET, "/bucket/dir/a%20b%2Bc.txt"))
            .unwrap();
        assert_eq!(ctx.bucket.as_deref(), Some("bucket"));
        assert_eq!(ctx.key.as_deref(), Some("dir/a b+c.txt"));
    }

    #[test]
    fn test_should_take_bucket_from_virtual_host() {
        let router = S3Router::new("s3.local", true);
        let req = Request::builder()
            .uri("/photos/2024/a.jpg")
            .header("host", "media.s3.local:7070")
            .body(())
            .unwrap();
        let ctx = router.resolve(&req).unwrap();
        assert_eq!(ctx.bucket.as_deref(), Some("media"));
        assert_eq!(ctx.key.as_deref(), Some("photos/2024/a.jpg"));
        assert_eq!(ctx.operation, S3Operation::GetObject);

        // The bare domain is path-style.
        let req = Request::builder()
            .uri("/media/a.jpg")
            .header("host", "s3.local")
            .body(())
            .unwrap();
        let ctx = router.resolve(&req).unwrap();
        assert_eq!(ctx.bucket.as_deref(), Some("media"));
        assert_eq!(ctx.key.as_deref(), Some("a.jpg"));
    }

    #[test]
    fn test_should_reject_unsupported_subresources() {
        for uri in ["/bucket?versioning", "/bucket/key?tagging", "/bucket?delete"] {
            let method = if uri.ends_with("delete") {
                Method::POST
            } else {
                Method::GET
            };
            let err = path_router().resolve(&request(method, uri)).unwrap_err();
            assert_eq!(err.code, S3ErrorCode::NotImplemented, "{uri}");
        }
    }

    #[test]
    fn test_should_reject_structurally_invalid_requests() {
        let err = path_router()
            .resolve(&request(Method::GET, "/Invalid_Bucket"))
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidBucketName);

        let long_key = format!("/bucket/{}", "k".repeat(1025));
        let err = path_router()
            .resolve(&request(Method::GET, &long_key))
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::KeyTooLongError);

        let req = Request::builder()
            .method(Method::PUT)
            .uri("/bucket/key")
            .body(())
            .unwrap();
        let err = path_router().resolve(&req).unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MissingContentLength);
    }

    #[test]
    fn test_should_reject_unroutable_methods() {
        let err = path_router()
            .resolve(&request(Method::PATCH, "/bucket"))
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);
        let err = path_router()
            .resolve(&request(Method::DELETE, "/"))
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);
        let err = path_router()
            .resolve(&request(Method::POST, "/bucket/key"))
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MethodNotAllowed);
    }

    #[test]
    fn test_should_parse_query_params() {
        let params = parse_query_params("prefix=a%2Fb&delimiter=%2F&acl&max-keys=10").unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0], ("prefix".to_owned(), "a/b".to_owned()));
        assert_eq!(params[2], ("acl".to_owned(), String::new()));
        assert!(parse_query_params("").unwrap().is_empty());
    }

    #[test]
    fn test_should_decode_multibyte_key() {
        let ctx = path_router()
            .resolve(&request(Method::GET, "/bucket/caf%C3%A9"))
            .unwrap();
        assert_eq!(ctx.key.as_deref(), Some("caf\u{e9}"));
    }

    #[test]
    fn test_should_reject_keys_that_are_not_utf8() {
        // %FF and %FE would both collapse onto U+FFFD under lossy decoding.
        for uri in ["/bucket/a%FF", "/bucket/a%FE", "/bucket/a%C3"] {
            let err = path_router()
                .resolve(&request(Method::GET, uri))
                .unwrap_err();
            assert_eq!(err.code, S3ErrorCode::InvalidURI, "{uri}");
            assert_eq!(err.status_code, http::StatusCode::BAD_REQUEST);
        }

        let router = S3Router::new("s3.local", true);
        let req = Request::builder()
            .uri("/a%FF")
            .header("host", "media.s3.local")
            .body(())
            .unwrap();
        let err = router.resolve(&req).unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidURI);

        let err = path_router()
            .resolve(&request(Method::GET, "/bucket?prefix=%FF"))
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidURI);
    }
}
