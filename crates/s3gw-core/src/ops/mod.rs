//! Operation handlers.
//!
//! Each submodule adds `handle_*` methods to [`crate::S3Gateway`], grouped
//! by category. The HTTP layer calls them with a verified identity and a
//! typed input and encodes whatever they return.

mod acl;
mod bucket;
mod list;
mod multipart;
mod object;

use std::collections::HashMap;

use s3gw_model::{AccessControlPolicy, CannedAcl, Identity, Owner};

use crate::backend::ObjectAttrs;

/// Content type stored when a request names none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Attributes for an object created by `identity` in a bucket owned by
/// `bucket_owner`.
pub(crate) fn new_object_attrs(
    identity: &Identity,
    bucket_owner: &Owner,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
    acl: Option<CannedAcl>,
) -> ObjectAttrs {
    ObjectAttrs {
        content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
        metadata,
        acl: AccessControlPolicy::from_canned(
            acl.unwrap_or_default(),
            identity.owner(),
            Some(bucket_owner),
        ),
    }
}

/// Clamp a resolved page size into the `i32` echoed back to clients.
pub(crate) fn echo_limit(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use bytes::Bytes;
    use s3gw_model::input::{CreateBucketInput, PutObjectInput};
    use s3gw_model::{CannedAcl, Identity};

    use crate::S3Gateway;
    use crate::posix::PosixBackend;

    pub(crate) fn alice() -> Identity {
        Identity::account("alice")
    }

    pub(crate) fn bob() -> Identity {
        Identity::account("bob")
    }

    pub(crate) fn admin() -> Identity {
        Identity::admin("root")
    }

    /// A gateway over a fresh POSIX root holding `bucket`, owned by alice.
    pub(crate) async fn gateway_with_bucket(
        acl: Option<CannedAcl>,
    ) -> (tempfile::TempDir, S3Gateway) {
        let dir = tempfile::tempdir().unwrap();
        let backend = PosixBackend::open(dir.path()).await.unwrap();
        let gateway = S3Gateway::new(Arc::new(backend), "us-east-1");
        gateway
            .handle_create_bucket(
                &alice(),
                CreateBucketInput {
                    bucket: "bucket".to_owned(),
                    acl,
                },
            )
            .await
            .unwrap();
        (dir, gateway)
    }

    pub(crate) async fn put(
        gateway: &S3Gateway,
        identity: &Identity,
        key: &str,
        body: &'static [u8],
    ) {
        gateway
            .handle_put_object(
                identity,
                PutObjectInput {
                    bucket: "bucket".to_owned(),
                    key: key.to_owned(),
                    body: Bytes::from_static(body),
                    ..PutObjectInput::default()
                },
            )
            .await
            .unwrap();
    }
}
