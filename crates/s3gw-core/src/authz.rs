//! Access decisions.
//!
//! Rules, first match wins:
//!
//! 1. the admin identity is always allowed;
//! 2. the resource owner is allowed any permission;
//! 3. an explicit grant to the identity, or to a group it belongs to, is
//!    allowed if the granted permission covers the requested one;
//! 4. everything else is denied.
//!
//! [`requirement`] says which permission each operation needs and on which
//! resource.

use s3gw_model::{AccessControlPolicy, Identity, Permission, S3Operation};
use tracing::trace;

/// Why a request was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// Rule 1.
    Admin,
    /// Rule 2.
    Owner,
    /// Rule 3.
    Grant,
}

/// The outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The caller may proceed.
    Allow(AllowReason),
    /// The caller may not.
    Deny,
}

impl Decision {
    /// Whether the decision allows the request.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// What an operation needs before it may touch the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any caller; results are filtered by ownership.
    Anyone,
    /// Any signed-in caller.
    Authenticated,
    /// A permission on the bucket.
    Bucket(Permission),
    /// A permission on the object.
    Object(Permission),
}

/// The permission each operation requires.
#[must_use]
pub fn requirement(operation: S3Operation) -> Requirement {
    use S3Operation as Op;
    match operation {
        Op::ListBuckets => Requirement::Anyone,
        Op::CreateBucket => Requirement::Authenticated,
        Op::DeleteBucket => Requirement::Bucket(Permission::FullControl),
        Op::HeadBucket
        | Op::GetBucketLocation
        | Op::ListObjects
        | Op::ListObjectsV2
        | Op::ListMultipartUploads
        | Op::ListParts => Requirement::Bucket(Permission::Read),
        Op::GetBucketAcl => Requirement::Bucket(Permission::ReadAcp),
        Op::PutBucketAcl => Requirement::Bucket(Permission::WriteAcp),
        Op::PutObject
        | Op::DeleteObject
        | Op::CopyObject
        | Op::CreateMultipartUpload
        | Op::UploadPart
        | Op::CompleteMultipartUpload
        | Op::AbortMultipartUpload => Requirement::Bucket(Permission::Write),
        Op::GetObject | Op::HeadObject => Requirement::Object(Permission::Read),
        Op::GetObjectAcl => Requirement::Object(Permission::ReadAcp),
        Op::PutObjectAcl => Requirement::Object(Permission::WriteAcp),
    }
}

/// Evaluate the access rules for `identity` against a resource's policy.
///
/// # Examples
///
/// ```
/// use s3gw_core::authz::{AllowReason, Decision, authorize};
/// use s3gw_model::{AccessControlPolicy, Identity, Owner, Permission};
///
/// let acl = AccessControlPolicy::private(Owner::new("alice"));
/// assert_eq!(
///     authorize(&Identity::account("alice"), &acl, Permission::Write),
///     Decision::Allow(AllowReason::Owner)
/// );
/// assert_eq!(
///     authorize(&Identity::account("bob"), &acl, Permission::Read),
///     Decision::Deny
/// );
/// ```
#[must_use]
pub fn authorize(
    identity: &Identity,
    acl: &AccessControlPolicy,
    permission: Permission,
) -> Decision {
    let decision = if identity.is_admin() {
        Decision::Allow(AllowReason::Admin)
    } else if identity.owns(&acl.owner) {
        Decision::Allow(AllowReason::Owner)
    } else if acl.grants(identity, permission) {
        Decision::Allow(AllowReason::Grant)
    } else {
        Decision::Deny
    };
    trace!(%identity, owner = %acl.owner.id, %permission, ?decision, "access check");
    decision
}

#[cfg(test)]
mod tests {
    use s3gw_model::{CannedAcl, Grant, Grantee, Owner};

    use super::*;

    fn policy(canned: CannedAcl) -> AccessControlPolicy {
        AccessControlPolicy::from_canned(canned, Owner::new("alice"), None)
    }

    #[test]
    fn test_should_allow_admin_regardless_of_acl() {
        let acl = policy(CannedAcl::Private);
        let decision = authorize(&Identity::admin("root"), &acl, Permission::WriteAcp);
        assert_eq!(decision, Decision::Allow(AllowReason::Admin));
    }

    #[test]
    fn test_should_allow_owner_even_without_explicit_grant() {
        let acl = AccessControlPolicy {
            owner: Owner::new("alice"),
            grants: Vec::new(),
        };
        let decision = authorize(&Identity::account("alice"), &acl, Permission::Write);
        assert_eq!(decision, Decision::Allow(AllowReason::Owner));
    }

    #[test]
    fn test_should_deny_non_owner_without_grant() {
        let acl = policy(CannedAcl::Private);
        for permission in [
            Permission::Read,
            Permission::Write,
            Permission::ReadAcp,
            Permission::WriteAcp,
        ] {
            assert_eq!(
                authorize(&Identity::account("bob"), &acl, permission),
                Decision::Deny
            );
        }
    }

    #[test]
    fn test_should_allow_group_grants() {
        let acl = policy(CannedAcl::PublicRead);
        assert!(authorize(&Identity::Anonymous, &acl, Permission::Read).is_allowed());
        assert!(!authorize(&Identity::Anonymous, &acl, Permission::Write).is_allowed());

        let acl = policy(CannedAcl::AuthenticatedRead);
        assert!(authorize(&Identity::account("bob"), &acl, Permission::Read).is_allowed());
        assert!(!authorize(&Identity::Anonymous, &acl, Permission::Read).is_allowed());
    }

    #[test]
    fn test_should_treat_full_control_grant_as_covering() {
        let mut acl = policy(CannedAcl::Private);
        acl.grants.push(Grant {
            grantee: Grantee::CanonicalUser {
                id: "bob".to_owned(),
                display_name: None,
            },
            permission: Permission::FullControl,
        });
        assert_eq!(
            authorize(&Identity::account("bob"), &acl, Permission::WriteAcp),
            Decision::Allow(AllowReason::Grant)
        );
    }

    #[test]
    fn test_should_map_operations_to_requirements() {
        assert_eq!(requirement(S3Operation::ListBuckets), Requirement::Anyone);
        assert_eq!(
            requirement(S3Operation::CreateBucket),
            Requirement::Authenticated
        );
        assert_eq!(
            requirement(S3Operation::PutObject),
            Requirement::Bucket(Permission::Write)
        );
        assert_eq!(
            requirement(S3Operation::ListParts),
            Requirement::Bucket(Permission::Read)
        );
        assert_eq!(
            requirement(S3Operation::GetObject),
            Requirement::Object(Permission::Read)
        );
        assert_eq!(
            requirement(S3Operation::PutObjectAcl),
            Requirement::Object(Permission::WriteAcp)
        );
    }
}
