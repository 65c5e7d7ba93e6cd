//! ACL handlers for buckets and objects.
//!
//! A put takes either a canned ACL (`x-amz-acl`) or a full
//! `AccessControlPolicy` document. Ownership never changes through these
//! calls: a document naming a different owner is refused.

use s3gw_model::input::{GetBucketAclInput, GetObjectAclInput, PutBucketAclInput, PutObjectAclInput};
use s3gw_model::{
    AccessControlPolicy, CannedAcl, Identity, Owner, Permission, S3Error, S3ErrorCode,
};
use tracing::debug;

use crate::gateway::S3Gateway;

impl S3Gateway {
    /// Bucket ACL. Needs READ_ACP on the bucket.
    pub async fn handle_get_bucket_acl(
        &self,
        identity: &Identity,
        input: GetBucketAclInput,
    ) -> Result<AccessControlPolicy, S3Error> {
        self.authorize_bucket(identity, &input.bucket, Permission::ReadAcp)
            .await
    }

    /// Replace the bucket ACL. Needs WRITE_ACP on the bucket.
    pub async fn handle_put_bucket_acl(
        &self,
        identity: &Identity,
        input: PutBucketAclInput,
    ) -> Result<(), S3Error> {
        let current = self
            .authorize_bucket(identity, &input.bucket, Permission::WriteAcp)
            .await?;
        let acl = resolve_policy(input.acl, input.policy, current.owner, None)?;
        self.backend.put_bucket_acl(&input.bucket, acl).await?;
        debug!(bucket = %input.bucket, "put_bucket_acl completed");
        Ok(())
    }

    /// Object ACL. Needs READ_ACP on the object.
    pub async fn handle_get_object_acl(
        &self,
        identity: &Identity,
        input: GetObjectAclInput,
    ) -> Result<AccessControlPolicy, S3Error> {
        let (_, acl) = self
            .authorize_object(identity, &input.bucket, &input.key, Permission::ReadAcp)
            .await?;
        Ok(acl)
    }

    /// Replace the object ACL. Needs WRITE_ACP on the object.
    pub async fn handle_put_object_acl(
        &self,
        identity: &Identity,
        input: PutObjectAclInput,
    ) -> Result<(), S3Error> {
        let (bucket_acl, current) = self
            .authorize_object(identity, &input.bucket, &input.key, Permission::WriteAcp)
            .await?;
        let acl = resolve_policy(
            input.acl,
            input.policy,
            current.owner,
            Some(&bucket_acl.owner),
        )?;
        self.backend
            .put_object_acl(&input.bucket, &input.key, acl)
            .await?;
        debug!(bucket = %input.bucket, key = %input.key, "put_object_acl completed");
        Ok(())
    }
}

/// The policy a put installs, keeping `owner`.
fn resolve_policy(
    canned: Option<CannedAcl>,
    policy: Option<AccessControlPolicy>,
    owner: Owner,
    bucket_owner: Option<&Owner>,
) -> Result<AccessControlPolicy, S3Error> {
    match (canned, policy) {
        (Some(canned), None) => Ok(AccessControlPolicy::from_canned(canned, owner, bucket_owner)),
        (None, Some(policy)) => {
            if policy.owner.id != owner.id {
                return Err(S3Error::access_denied(
                    "The owner of an ACL cannot be changed",
                ));
            }
            Ok(AccessControlPolicy {
                owner,
                grants: policy.grants,
            })
        }
        (Some(_), Some(_)) => Err(S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            "Specifying both Canned ACLs and Header Grants is not allowed",
        )),
        (None, None) => Err(S3Error::malformed_xml(
            "An ACL must be supplied as x-amz-acl or an AccessControlPolicy body",
        )),
    }
}
