//! Operations, protocol errors, and domain types shared by every s3gw crate.
//!
//! The model crate has no behavior of its own beyond small conversions: it
//! defines the vocabulary that the router, the authorizer, the backends and
//! the response encoder use to talk to each other.

// S3Error is returned by value on every request path; boxing it buys nothing.
#![allow(clippy::result_large_err)]

pub mod error;
pub mod input;
pub mod operations;
pub mod output;
pub mod types;

pub use error::{ErrorKind, S3Error, S3ErrorCode};
pub use operations::S3Operation;
pub use types::{AccessControlPolicy, CannedAcl, Grant, Grantee, Identity, Owner, Permission};
