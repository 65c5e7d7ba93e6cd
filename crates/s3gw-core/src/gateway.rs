//! The gateway: authorization plus operation semantics over a [`Backend`].
//!
//! [`S3Gateway`] owns the selected backend and exposes one `handle_*` method
//! per operation. Each handler takes the verified
//! [`Identity`] and a typed input, runs the access checks, and only then
//! calls the backend.
//!
//! # Existence versus access
//!
//! A missing bucket is reported as `NoSuchBucket` to the admin identity only;
//! every other caller receives `AccessDenied`, exactly as if the bucket
//! existed and denied them. A missing object is reported as `NoSuchKey` only
//! to callers allowed to read the bucket, who could list it anyway.

use std::sync::Arc;

use tracing::debug;

use s3gw_model::{AccessControlPolicy, Identity, Permission, S3Error};

use crate::authz::authorize;
use crate::backend::Backend;
use crate::error::BackendError;

/// Operation layer shared by every request task.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use s3gw_core::S3Gateway;
/// use s3gw_core::noop::NoopBackend;
///
/// let gateway = S3Gateway::new(Arc::new(NoopBackend), "us-east-1");
/// assert_eq!(gateway.region(), "us-east-1");
/// ```
#[derive(Debug, Clone)]
pub struct S3Gateway {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) region: String,
}

impl S3Gateway {
    /// Serve `backend`, reporting `region` as every bucket's location.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, region: impl Into<String>) -> Self {
        Self {
            backend,
            region: region.into(),
        }
    }

    /// The configured region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The storage backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Load a bucket's ACL for an access check.
    pub(crate) async fn bucket_acl(
        &self,
        identity: &Identity,
        bucket: &str,
    ) -> Result<AccessControlPolicy, S3Error> {
        self.backend
            .get_bucket_acl(bucket)
            .await
            .map_err(|e| hide_missing_bucket(e, identity, bucket))
    }

    /// Require `permission` on a bucket; returns its ACL.
    pub(crate) async fn authorize_bucket(
        &self,
        identity: &Identity,
        bucket: &str,
        permission: Permission,
    ) -> Result<AccessControlPolicy, S3Error> {
        let acl = self.bucket_acl(identity, bucket).await?;
        require(identity, &acl, permission, bucket)?;
        Ok(acl)
    }

    /// Require `permission` on an object; returns the bucket and object ACLs.
    pub(crate) async fn authorize_object(
        &self,
        identity: &Identity,
        bucket: &str,
        key: &str,
        permission: Permission,
    ) -> Result<(AccessControlPolicy, AccessControlPolicy), S3Error> {
        let bucket_acl = self.bucket_acl(identity, bucket).await?;
        let resource = format!("{bucket}/{key}");
        let object_acl = match self.backend.get_object_acl(bucket, key).await {
            Ok(acl) => acl,
            Err(e) if e.is_no_such_key() => {
                return Err(
                    if authorize(identity, &bucket_acl, Permission::Read).is_allowed() {
                        S3Error::no_such_key(key)
                    } else {
                        debug!(%identity, resource = %resource, "hiding missing object");
                        S3Error::access_denied(resource)
                    },
                );
            }
            Err(e) => return Err(hide_missing_bucket(e, identity, bucket)),
        };
        require(identity, &object_acl, permission, &resource)?;
        Ok((bucket_acl, object_acl))
    }
}

/// Deny unless the rules allow `permission`.
pub(crate) fn require(
    identity: &Identity,
    acl: &AccessControlPolicy,
    permission: Permission,
    resource: &str,
) -> Result<(), S3Error> {
    if authorize(identity, acl, permission).is_allowed() {
        Ok(())
    } else {
        debug!(%identity, %permission, resource, "access denied");
        Err(S3Error::access_denied(resource))
    }
}

fn hide_missing_bucket(e: BackendError, identity: &Identity, bucket: &str) -> S3Error {
    if e.is_no_such_bucket() && !identity.is_admin() {
        debug!(%identity, bucket, "hiding missing bucket");
        return S3Error::access_denied(bucket);
    }
    e.into()
}

#[cfg(test)]
mod tests {
    use s3gw_model::{CannedAcl, Owner, S3ErrorCode};

    use super::*;
    use crate::noop::NoopBackend;

    #[test]
    fn test_should_require_grant_or_ownership() {
        let acl = AccessControlPolicy::from_canned(CannedAcl::PublicRead, Owner::new("alice"), None);
        assert!(require(&Identity::Anonymous, &acl, Permission::Read, "b").is_ok());
        let err = require(&Identity::account("bob"), &acl, Permission::Write, "b").unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
    }

    #[test]
    fn test_should_debug_format_gateway() {
        let gateway = S3Gateway::new(Arc::new(NoopBackend), "eu-west-1");
        assert!(format!("{gateway:?}").contains("eu-west-1"));
    }
}
