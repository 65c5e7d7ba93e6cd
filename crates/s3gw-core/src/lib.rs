//! Operation semantics and storage for the s3gw gateway.
//!
//! This crate holds everything between a verified request and the bytes on
//! disk: the access rules, the [`Backend`] contract, and the two backends
//! that implement it.
//!
//! # Architecture
//!
//! ```text
//! s3gw-http (routing, auth, XML)
//!        |
//!        v
//!   S3Gateway (authorization + operation semantics)
//!        |
//!        v
//!   dyn Backend
//!     |        \
//!     v         v
//! PosixBackend  NoopBackend
//! ```

// S3Error is returned by value on every request path; boxing it buys nothing.
#![allow(clippy::result_large_err)]

pub mod authz;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod noop;
mod ops;
pub mod posix;
pub mod utils;
pub mod validation;

pub use backend::Backend;
pub use config::GatewayConfig;
pub use error::BackendError;
pub use gateway::S3Gateway;
pub use noop::NoopBackend;
pub use ops::DEFAULT_CONTENT_TYPE;
pub use posix::PosixBackend;
