//! The hyper `Service` that runs the full request pipeline.
//!
//! [`S3HttpService`] ties routing, authentication, dispatch and encoding
//! together:
//!
//! 1. Health check interception (`GET /_s3gw/health`)
//! 2. Routing and structural validation via [`S3Router`]
//! 3. Body collection
//! 4. Payload checks (`x-amz-content-sha256`, no `aws-chunked`)
//! 5. Authentication: header SigV4, presigned URL, or anonymous
//! 6. Dispatch to the [`S3Handler`]
//! 7. Error encoding and common headers (`x-amz-request-id`, `Server`)
//!
//! Malformed requests are rejected before any credential is looked at, and
//! nothing reaches the handler unless authentication succeeded.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::Service;
use s3gw_auth::sigv4::signed_payload_hash;
use s3gw_auth::{AuthError, CredentialProvider, is_presigned, verify_presigned, verify_sigv4};
use s3gw_model::{ErrorKind, Identity, S3Error, S3ErrorCode};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::body::S3ResponseBody;
use crate::dispatch::{S3Handler, dispatch_operation};
use crate::response::error_to_response;
use crate::router::S3Router;

/// Path answered by the liveness probe.
pub const HEALTH_PATH: &str = "/_s3gw/health";

/// Value of the `Server` response header.
const SERVER_NAME: &str = "s3gw";

/// HTTP-facing settings.
#[derive(Clone)]
pub struct S3HttpConfig {
    /// Base domain for virtual-hosted-style requests.
    pub domain: String,
    /// Whether `<bucket>.<domain>` hosts are recognized.
    pub virtual_hosting: bool,
    /// Region credential scopes must name.
    pub region: String,
    /// Largest accepted distance between a signed timestamp and now.
    pub max_clock_skew_secs: u64,
    /// The credential store.
    pub credential_provider: Arc<dyn CredentialProvider>,
}

impl S3HttpConfig {
    /// Path-style addressing on `localhost` with the default skew window.
    #[must_use]
    pub fn new(region: impl Into<String>, credential_provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            domain: "localhost".to_owned(),
            virtual_hosting: false,
            region: region.into(),
            max_clock_skew_secs: s3gw_auth::DEFAULT_MAX_SKEW_SECS.unsigned_abs(),
            credential_provider,
        }
    }

    fn max_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.max_clock_skew_secs).unwrap_or(i64::MAX))
    }
}

impl std::fmt::Debug for S3HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3HttpConfig")
            .field("domain", &self.domain)
            .field("virtual_hosting", &self.virtual_hosting)
            .field("region", &self.region)
            .field("max_clock_skew_secs", &self.max_clock_skew_secs)
            .field("credential_provider", &"...")
            .finish()
    }
}

/// The gateway as a hyper service.
#[derive(Debug)]
pub struct S3HttpService<H: S3Handler> {
    handler: Arc<H>,
    router: S3Router,
    config: Arc<S3HttpConfig>,
}

impl<H: S3Handler> S3HttpService<H> {
    /// Serve `handler` with `config`.
    #[must_use]
    pub fn new(handler: H, config: S3HttpConfig) -> Self {
        Self::from_shared(Arc::new(handler), config)
    }

    /// Serve a shared handler.
    #[must_use]
    pub fn from_shared(handler: Arc<H>, config: S3HttpConfig) -> Self {
        let router = S3Router::new(config.domain.clone(), config.virtual_hosting);
        Self {
            handler,
            router,
            config: Arc::new(config),
        }
    }
}

impl<H: S3Handler> Clone for S3HttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            router: self.router.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<H: S3Handler> Service<http::Request<Incoming>> for S3HttpService<H> {
    type Response = http::Response<S3ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.serve(req).await) })
    }
}

impl<H: S3Handler> S3HttpService<H> {
    /// Run one request through the pipeline. Never fails: every error is
    /// encoded as a response.
    pub async fn serve<B>(&self, req: http::Request<B>) -> http::Response<S3ResponseBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let request_id = Uuid::new_v4().simple().to_string().to_uppercase();
        let response = process_request(
            req,
            self.handler.as_ref(),
            &self.router,
            &self.config,
            &request_id,
        )
        .await;
        add_common_headers(response, &request_id)
    }
}

async fn process_request<H, B>(
    req: http::Request<B>,
    handler: &H,
    router: &S3Router,
    config: &S3HttpConfig,
    request_id: &str,
) -> http::Response<S3ResponseBody>
where
    H: S3Handler + ?Sized,
    B: http_body::Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let uri = req.uri().clone();
    debug!(%method, %uri, request_id, "processing S3 request");

    if is_health_check(&method, uri.path()) {
        return health_check_response();
    }

    let ctx = match router.resolve(&req) {
        Ok(ctx) => ctx,
        Err(err) => {
            debug!(%method, %uri, error = %err, request_id, "request rejected by router");
            return encode_error(&err, request_id);
        }
    };

    let (parts, incoming) = req.into_parts();
    let body = match incoming.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, request_id, "failed to read request body");
            return encode_error(
                &S3Error::with_message(
                    S3ErrorCode::InvalidRequest,
                    "The request body could not be read",
                ),
                request_id,
            );
        }
    };

    if let Err(err) = validate_payload(&parts, &body) {
        debug!(error = %err, request_id, "payload check failed");
        return encode_error(&err, request_id);
    }

    let identity = match authenticate(&parts, &body, config, Utc::now()) {
        Ok(identity) => identity,
        Err(err) => return encode_error(&err, request_id),
    };

    info!(
        operation = %ctx.operation,
        identity = %identity,
        bucket = ?ctx.bucket,
        key = ?ctx.key,
        request_id,
        "routed S3 request"
    );

    match dispatch_operation(handler, identity, parts, body, ctx).await {
        Ok(response) => response,
        Err(err) => encode_error(&err, request_id),
    }
}

/// Log an error at the level its kind deserves, then encode it.
fn encode_error(err: &S3Error, request_id: &str) -> http::Response<S3ResponseBody> {
    match err.kind {
        ErrorKind::InternalFault | ErrorKind::IoFailure => {
            error!(error = ?err, request_id, "request failed with a server fault");
        }
        _ => debug!(code = %err.code, message = %err.message, request_id, "request failed"),
    }
    error_to_response(err, request_id)
}

/// Reject payload encodings the gateway does not support and bodies that
/// do not match the hash the client declared.
fn validate_payload(parts: &http::request::Parts, body: &[u8]) -> Result<(), S3Error> {
    let chunked = parts
        .headers
        .get_all(http::header::CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|enc| enc.trim() == "aws-chunked"));
    if chunked {
        return Err(S3Error::not_implemented("aws-chunked"));
    }

    let Some(value) = parts.headers.get("x-amz-content-sha256") else {
        return Ok(());
    };
    let declared = value.to_str().map_err(|_| {
        S3Error::with_message(
            S3ErrorCode::XAmzContentSHA256Mismatch,
            "Invalid x-amz-content-sha256 header encoding",
        )
    })?;

    if declared == s3gw_auth::sigv4::UNSIGNED_PAYLOAD {
        return Ok(());
    }
    if declared.starts_with("STREAMING-") {
        return Err(S3Error::not_implemented(declared));
    }
    if declared.len() != 64 || !declared.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(S3Error::with_message(
            S3ErrorCode::XAmzContentSHA256Mismatch,
            format!("The provided 'x-amz-content-sha256' header is not valid: {declared}"),
        ));
    }
    if !hex::encode(Sha256::digest(body)).eq_ignore_ascii_case(declared) {
        return Err(S3Error::with_message(
            S3ErrorCode::XAmzContentSHA256Mismatch,
            "The provided 'x-amz-content-sha256' header does not match what was computed",
        ));
    }
    Ok(())
}

/// Establish the caller: a presigned URL, a signed `Authorization` header,
/// or nobody at all.
fn authenticate(
    parts: &http::request::Parts,
    body: &[u8],
    config: &S3HttpConfig,
    now: DateTime<Utc>,
) -> Result<Identity, S3Error> {
    let provider = config.credential_provider.as_ref();
    let result = if is_presigned(parts.uri.query()) {
        verify_presigned(parts, provider, now, config.max_skew())
    } else if parts.headers.contains_key(http::header::AUTHORIZATION) {
        let payload_hash = signed_payload_hash(parts, body);
        verify_sigv4(parts, &payload_hash, provider, now, config.max_skew())
    } else {
        return Ok(Identity::Anonymous);
    };

    let auth = result.map_err(auth_error_to_s3)?;
    if auth.region != config.region {
        warn!(
            access_key = %auth.access_key_id,
            region = %auth.region,
            expected = %config.region,
            "credential scope names the wrong region"
        );
        return Err(S3Error::with_message(
            S3ErrorCode::AuthorizationHeaderMalformed,
            format!(
                "The authorization header is malformed; the region '{}' is wrong; expecting '{}'",
                auth.region, config.region
            ),
        ));
    }

    Ok(Identity::Account {
        access_key: auth.access_key_id,
        admin: auth.is_admin,
    })
}

/// Collapse an authentication failure to its client-facing error. The
/// precise reason is logged here and nowhere else.
fn auth_error_to_s3(err: AuthError) -> S3Error {
    if err.is_credential_failure() {
        warn!(reason = %err, "signature verification failed");
        return S3Error::signature_does_not_match();
    }
    warn!(reason = %err, "authentication rejected");
    match err {
        AuthError::RequestTimeTooSkewed { .. } => S3Error::new(S3ErrorCode::RequestTimeTooSkewed),
        AuthError::RequestExpired => {
            S3Error::with_message(S3ErrorCode::AccessDenied, "Request has expired")
                .with_kind(ErrorKind::AuthenticationFailed)
        }
        AuthError::MissingQueryParam(_) | AuthError::InvalidExpires(_) => {
            S3Error::invalid_argument(err.to_string()).with_kind(ErrorKind::AuthenticationFailed)
        }
        _ => S3Error::with_message(S3ErrorCode::AuthorizationHeaderMalformed, err.to_string()),
    }
}

fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && path == HEALTH_PATH
}

fn health_check_response() -> http::Response<S3ResponseBody> {
    let mut response = http::Response::new(S3ResponseBody::from_bytes(Bytes::from_static(
        br#"{"status":"ok","service":"s3gw"}"#,
    )));
    if let Ok(hv) = http::header::HeaderValue::from_str(mime::APPLICATION_JSON.as_ref()) {
        response.headers_mut().insert(http::header::CONTENT_TYPE, hv);
    }
    response
}

fn add_common_headers(
    mut response: http::Response<S3ResponseBody>,
    request_id: &str,
) -> http::Response<S3ResponseBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv.clone());
        headers.insert("x-amz-id-2", hv);
    }
    headers.insert(
        http::header::SERVER,
        http::header::HeaderValue::from_static(SERVER_NAME),
    );
    response
}
