//! Operation dispatch: routed request to handler to response.
//!
//! [`S3Handler`] is the seam between the HTTP layer and the operation layer.
//! The implementation for [`S3Gateway`] decodes the typed input
//! ([`FromS3Request`]), runs the matching `handle_*` method with the verified
//! [`Identity`], and encodes the output ([`IntoS3Response`]).

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::StatusCode;
use s3gw_core::S3Gateway;
use s3gw_model::{Identity, S3Error, S3Operation};

use crate::body::S3ResponseBody;
use crate::request::FromS3Request;
use crate::response::{IntoS3Response, empty_response};
use crate::router::RoutingContext;

/// Boxed future returned by [`S3Handler::handle_operation`].
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<S3ResponseBody>, S3Error>> + Send>>;

/// Executes routed operations on behalf of a verified identity.
///
/// Boxed futures keep the trait object safe so the service can hold an
/// `Arc<dyn S3Handler>` when needed.
pub trait S3Handler: Send + Sync + 'static {
    /// Execute `op` and produce the full HTTP response.
    fn handle_operation(
        &self,
        identity: Identity,
        op: S3Operation,
        parts: http::request::Parts,
        body: Bytes,
        ctx: RoutingContext,
    ) -> HandlerFuture;
}

/// Hand a routed request to `handler`.
pub async fn dispatch_operation<H: S3Handler + ?Sized>(
    handler: &H,
    identity: Identity,
    parts: http::request::Parts,
    body: Bytes,
    ctx: RoutingContext,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let op = ctx.operation;
    tracing::debug!(
        operation = %op,
        identity = %identity,
        bucket = ?ctx.bucket,
        key = ?ctx.key,
        "dispatching S3 operation"
    );
    handler
        .handle_operation(identity, op, parts, body, ctx)
        .await
}

/// Decode, execute, encode.
///
/// `call!(gateway.handle_x)` for operations with a typed output;
/// `call!(gateway.handle_x, STATUS)` for operations that answer with an
/// empty response.
macro_rules! call {
    ($gw:ident . $handler:ident, $identity:expr, $parts:expr, $body:expr, $ctx:expr) => {{
        let input = FromS3Request::from_s3_request(
            &$parts,
            $ctx.bucket.as_deref(),
            $ctx.key.as_deref(),
            &$ctx.query_params,
            $body,
        )?;
        $gw.$handler(&$identity, input).await?.into_s3_response()
    }};
    ($gw:ident . $handler:ident, $status:expr, $identity:expr, $parts:expr, $body:expr, $ctx:expr) => {{
        let input = FromS3Request::from_s3_request(
            &$parts,
            $ctx.bucket.as_deref(),
            $ctx.key.as_deref(),
            &$ctx.query_params,
            $body,
        )?;
        $gw.$handler(&$identity, input).await?;
        Ok(empty_response($status))
    }};
}

impl S3Handler for S3Gateway {
    fn handle_operation(
        &self,
        identity: Identity,
        op: S3Operation,
        parts: http::request::Parts,
        body: Bytes,
        ctx: RoutingContext,
    ) -> HandlerFuture {
        let gw = self.clone();
        Box::pin(async move {
            let (i, p, b, c) = (identity, parts, body, ctx);
            match op {
                S3Operation::ListBuckets => call!(gw.handle_list_buckets, i, p, b, c),
                S3Operation::CreateBucket => call!(gw.handle_create_bucket, i, p, b, c),
                S3Operation::DeleteBucket => {
                    call!(gw.handle_delete_bucket, StatusCode::NO_CONTENT, i, p, b, c)
                }
                S3Operation::HeadBucket => call!(gw.handle_head_bucket, i, p, b, c),
                S3Operation::GetBucketLocation => {
                    call!(gw.handle_get_bucket_location, i, p, b, c)
                }
                S3Operation::GetBucketAcl => call!(gw.handle_get_bucket_acl, i, p, b, c),
                S3Operation::PutBucketAcl => {
                    call!(gw.handle_put_bucket_acl, StatusCode::OK, i, p, b, c)
                }
                S3Operation::ListObjects => call!(gw.handle_list_objects, i, p, b, c),
                S3Operation::ListObjectsV2 => call!(gw.handle_list_objects_v2, i, p, b, c),
                S3Operation::ListMultipartUploads => {
                    call!(gw.handle_list_multipart_uploads, i, p, b, c)
                }
                S3Operation::PutObject => call!(gw.handle_put_object, i, p, b, c),
                S3Operation::GetObject => call!(gw.handle_get_object, i, p, b, c),
                S3Operation::HeadObject => call!(gw.handle_head_object, i, p, b, c),
                S3Operation::DeleteObject => {
                    call!(gw.handle_delete_object, StatusCode::NO_CONTENT, i, p, b, c)
                }
                S3Operation::CopyObject => call!(gw.handle_copy_object, i, p, b, c),
                S3Operation::GetObjectAcl => call!(gw.handle_get_object_acl, i, p, b, c),
                S3Operation::PutObjectAcl => {
                    call!(gw.handle_put_object_acl, StatusCode::OK, i, p, b, c)
                }
                S3Operation::CreateMultipartUpload => {
                    call!(gw.handle_create_multipart_upload, i, p, b, c)
                }
                S3Operation::UploadPart => call!(gw.handle_upload_part, i, p, b, c),
                S3Operation::ListParts => call!(gw.handle_list_parts, i, p, b, c),
                S3Operation::CompleteMultipartUpload => {
                    call!(gw.handle_complete_multipart_upload, i, p, b, c)
                }
                S3Operation::AbortMultipartUpload => call!(
                    gw.handle_abort_multipart_upload,
                    StatusCode::NO_CONTENT,
                    i,
                    p,
                    b,
                    c
                ),
            }
        })
    }
}

/// Answers every operation with `NotImplemented`.
///
/// Lets the routing and authentication layers be exercised without a
/// backend.
#[derive(Debug, Clone, Default)]
pub struct NotImplementedHandler;

impl S3Handler for NotImplementedHandler {
    fn handle_operation(
        &self,
        _identity: Identity,
        op: S3Operation,
        _parts: http::request::Parts,
        _body: Bytes,
        _ctx: RoutingContext,
    ) -> HandlerFuture {
        Box::pin(async move { Err(S3Error::not_implemented(op.as_str())) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use s3gw_core::PosixBackend;
    use s3gw_model::S3ErrorCode;

    use super::*;

    fn ctx(op: S3Operation, bucket: &str, key: Option<&str>) -> RoutingContext {
        RoutingContext {
            bucket: Some(bucket.to_owned()),
            key: key.map(ToOwned::to_owned),
            operation: op,
            query_params: vec![],
        }
    }

    fn parts() -> http::request::Parts {
        http::Request::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_should_return_not_implemented_for_default_handler() {
        let err = dispatch_operation(
            &NotImplementedHandler,
            Identity::Anonymous,
            parts(),
            Bytes::new(),
            ctx(S3Operation::ListObjects, "bucket", None),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NotImplemented);
    }

    #[tokio::test]
    async fn test_should_run_gateway_operations() {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::open(dir.path()).await.unwrap();
        let gateway = S3Gateway::new(Arc::new(backend), "us-east-1");
        let alice = Identity::account("alice");

        let resp = dispatch_operation(
            &gateway,
            alice.clone(),
            parts(),
            Bytes::new(),
            ctx(S3Operation::CreateBucket, "bucket", None),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = dispatch_operation(
            &gateway,
            alice.clone(),
            parts(),
            Bytes::from_static(b"hello"),
            ctx(S3Operation::PutObject, "bucket", Some("k")),
        )
        .await
        .unwrap();
        assert!(resp.headers().contains_key("etag"));

        let resp = dispatch_operation(
            &gateway,
            alice.clone(),
            parts(),
            Bytes::new(),
            ctx(S3Operation::DeleteObject, "bucket", Some("k")),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        // Another account sees neither the bucket nor its absence.
        let err = dispatch_operation(
            &gateway,
            Identity::account("bob"),
            parts(),
            Bytes::new(),
            ctx(S3Operation::GetObject, "bucket", Some("k")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
    }
}
