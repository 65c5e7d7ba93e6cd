//! The HTTP face of the s3gw gateway.
//!
//! - **Routing** ([`router`]): method, path, query and headers to an
//!   [`S3Operation`](s3gw_model::S3Operation), path-style or
//!   virtual-hosted-style, with structural validation.
//! - **Request decoding** ([`request`]): typed operation inputs.
//! - **Response encoding** ([`response`]): typed outputs and errors to S3
//!   responses.
//! - **Dispatch** ([`dispatch`]): the [`S3Handler`] seam, implemented for
//!   [`S3Gateway`](s3gw_core::S3Gateway).
//! - **Service** ([`service`]): the hyper service running the pipeline.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> S3HttpService (hyper Service)
//!     -> health check
//!     -> S3Router (operation + structural validation)
//!     -> body collection, payload hash check
//!     -> SigV4 / presigned / anonymous identity
//!     -> dispatch_operation (S3Handler)
//!     -> error encoding, common headers
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use s3gw_auth::StaticCredentialProvider;
//! use s3gw_core::{NoopBackend, S3Gateway};
//! use s3gw_http::service::{S3HttpConfig, S3HttpService};
//!
//! let credentials = StaticCredentialProvider::default().with_admin("root", "rootsecret");
//! let config = S3HttpConfig::new("us-east-1", Arc::new(credentials));
//! let gateway = S3Gateway::new(Arc::new(NoopBackend), "us-east-1");
//! let service = S3HttpService::new(gateway, config);
//! // Hand `service` to a hyper connection builder.
//! ```

// S3Error is returned by value on every request path; boxing it buys nothing.
#![allow(clippy::result_large_err)]

pub mod body;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod router;
pub mod service;

pub use body::S3ResponseBody;
pub use dispatch::{NotImplementedHandler, S3Handler};
pub use request::FromS3Request;
pub use response::IntoS3Response;
pub use router::{RoutingContext, S3Router};
pub use service::{S3HttpConfig, S3HttpService};
