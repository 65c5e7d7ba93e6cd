//! Domain types: identities, ownership, access control, and the records that
//! flow between the gateway and its backends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group URI granting access to everyone, including anonymous callers.
pub const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Group URI granting access to every signed-in account.
pub const AUTHENTICATED_USERS_GROUP: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No credentials were presented.
    Anonymous,
    /// A caller whose signature was verified against the credential store.
    Account {
        /// The access key that signed the request.
        access_key: String,
        /// Whether this is the root/admin identity.
        admin: bool,
    },
}

impl Identity {
    /// A regular (non-admin) account.
    #[must_use]
    pub fn account(access_key: impl Into<String>) -> Self {
        Self::Account {
            access_key: access_key.into(),
            admin: false,
        }
    }

    /// The admin account.
    #[must_use]
    pub fn admin(access_key: impl Into<String>) -> Self {
        Self::Account {
            access_key: access_key.into(),
            admin: true,
        }
    }

    /// Whether this identity bypasses every ACL check.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Account { admin: true, .. })
    }

    /// Whether no credentials were presented.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The access key, if any.
    #[must_use]
    pub fn access_key(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Account { access_key, .. } => Some(access_key),
        }
    }

    /// The owner record stamped on resources this identity creates.
    #[must_use]
    pub fn owner(&self) -> Owner {
        match self {
            Self::Anonymous => Owner::new("anonymous"),
            Self::Account { access_key, .. } => Owner::new(access_key.clone()),
        }
    }

    /// Whether the identity is a member of the given predefined group.
    #[must_use]
    pub fn in_group(&self, uri: &str) -> bool {
        match uri {
            ALL_USERS_GROUP => true,
            AUTHENTICATED_USERS_GROUP => !self.is_anonymous(),
            _ => false,
        }
    }

    /// Whether this identity owns a resource tagged with `owner`.
    #[must_use]
    pub fn owns(&self, owner: &Owner) -> bool {
        self.access_key().is_some_and(|ak| ak == owner.id)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Account { access_key, .. } => f.write_str(access_key),
        }
    }
}

/// The owning identity of a bucket or object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// Canonical id; the owner's access key.
    pub id: String,
    /// Display name.
    pub display_name: String,
}

impl Owner {
    /// Owner whose display name equals its id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
        }
    }
}

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// A permission that can be granted on a bucket or object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Read the object, or list the bucket.
    #[serde(rename = "READ")]
    Read,
    /// Create, overwrite and delete objects in the bucket.
    #[serde(rename = "WRITE")]
    Write,
    /// Read the ACL.
    #[serde(rename = "READ_ACP")]
    ReadAcp,
    /// Write the ACL.
    #[serde(rename = "WRITE_ACP")]
    WriteAcp,
    /// All of the above.
    #[serde(rename = "FULL_CONTROL")]
    FullControl,
}

impl Permission {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::ReadAcp => "READ_ACP",
            Self::WriteAcp => "WRITE_ACP",
            Self::FullControl => "FULL_CONTROL",
        }
    }

    /// Parse a wire value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READ" => Some(Self::Read),
            "WRITE" => Some(Self::Write),
            "READ_ACP" => Some(Self::ReadAcp),
            "WRITE_ACP" => Some(Self::WriteAcp),
            "FULL_CONTROL" => Some(Self::FullControl),
            _ => None,
        }
    }

    /// Whether holding `self` satisfies a request for `requested`.
    #[must_use]
    pub fn covers(self, requested: Self) -> bool {
        self == Self::FullControl || self == requested
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recipient of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Grantee {
    /// A specific account.
    #[serde(rename_all = "camelCase")]
    CanonicalUser {
        /// Access key of the account.
        id: String,
        /// Optional display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// A predefined group.
    Group {
        /// Group URI.
        uri: String,
    },
}

impl Grantee {
    /// Grantee for a specific owner.
    #[must_use]
    pub fn user(owner: &Owner) -> Self {
        Self::CanonicalUser {
            id: owner.id.clone(),
            display_name: Some(owner.display_name.clone()),
        }
    }

    /// Grantee for a predefined group.
    #[must_use]
    pub fn group(uri: &str) -> Self {
        Self::Group {
            uri: uri.to_owned(),
        }
    }

    /// Whether `identity` is, or belongs to, this grantee.
    #[must_use]
    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            Self::CanonicalUser { id, .. } => identity.access_key() == Some(id.as_str()),
            Self::Group { uri } => identity.in_group(uri),
        }
    }
}

/// A single ACL entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Who receives the permission.
    pub grantee: Grantee,
    /// What is granted.
    pub permission: Permission,
}

/// Owner plus grant list, persisted with every bucket and object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlPolicy {
    /// The resource owner.
    pub owner: Owner,
    /// Explicit grants.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// The `private` policy: owner full control, nothing else.
    #[must_use]
    pub fn private(owner: Owner) -> Self {
        Self::from_canned(CannedAcl::Private, owner, None)
    }

    /// Expand a canned ACL. `bucket_owner` only matters for the
    /// `bucket-owner-*` variants on objects.
    #[must_use]
    pub fn from_canned(canned: CannedAcl, owner: Owner, bucket_owner: Option<&Owner>) -> Self {
        let mut grants = vec![Grant {
            grantee: Grantee::user(&owner),
            permission: Permission::FullControl,
        }];
        let extra: Vec<(Grantee, Permission)> = match canned {
            CannedAcl::Private => Vec::new(),
            CannedAcl::PublicRead => vec![(Grantee::group(ALL_USERS_GROUP), Permission::Read)],
            CannedAcl::PublicReadWrite => vec![
                (Grantee::group(ALL_USERS_GROUP), Permission::Read),
                (Grantee::group(ALL_USERS_GROUP), Permission::Write),
            ],
            CannedAcl::AuthenticatedRead => {
                vec![(Grantee::group(AUTHENTICATED_USERS_GROUP), Permission::Read)]
            }
            CannedAcl::BucketOwnerRead => bucket_owner
                .filter(|b| b.id != owner.id)
                .map(|b| (Grantee::user(b), Permission::Read))
                .into_iter()
                .collect(),
            CannedAcl::BucketOwnerFullControl => bucket_owner
                .filter(|b| b.id != owner.id)
                .map(|b| (Grantee::user(b), Permission::FullControl))
                .into_iter()
                .collect(),
        };
        grants.extend(
            extra
                .into_iter()
                .map(|(grantee, permission)| Grant { grantee, permission }),
        );
        Self { owner, grants }
    }

    /// Whether an explicit grant gives `identity` the `requested` permission.
    ///
    /// Ownership is not considered here.
    #[must_use]
    pub fn grants(&self, identity: &Identity, requested: Permission) -> bool {
        self.grants
            .iter()
            .any(|g| g.permission.covers(requested) && g.grantee.matches(identity))
    }
}

/// Predefined ACLs selectable with the `x-amz-acl` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CannedAcl {
    /// Owner only.
    #[default]
    Private,
    /// Everyone may read.
    PublicRead,
    /// Everyone may read and write.
    PublicReadWrite,
    /// Signed-in accounts may read.
    AuthenticatedRead,
    /// The bucket owner may read the object.
    BucketOwnerRead,
    /// The bucket owner has full control of the object.
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Parse an `x-amz-acl` header value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "public-read" => Some(Self::PublicRead),
            "public-read-write" => Some(Self::PublicReadWrite),
            "authenticated-read" => Some(Self::AuthenticatedRead),
            "bucket-owner-read" => Some(Self::BucketOwnerRead),
            "bucket-owner-full-control" => Some(Self::BucketOwnerFullControl),
            _ => None,
        }
    }

    /// Returns the header value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

// ---------------------------------------------------------------------------
// Records returned by backends
// ---------------------------------------------------------------------------

/// A bucket as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Creation time.
    pub creation_date: DateTime<Utc>,
    /// Owning identity.
    pub owner: Owner,
}

/// Full object metadata (HEAD/GET).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Payload length in bytes.
    pub size: u64,
    /// Quoted entity tag.
    pub etag: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Content type.
    pub content_type: String,
    /// User metadata (`x-amz-meta-*` without the prefix).
    pub metadata: HashMap<String, String>,
    /// Owning identity.
    pub owner: Owner,
}

/// An object entry in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Payload length in bytes.
    pub size: u64,
    /// Quoted entity tag.
    pub etag: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Owner, when known.
    pub owner: Option<Owner>,
}

/// A staged part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Part number (1..=10000).
    pub part_number: u32,
    /// Quoted entity tag of the part payload.
    pub etag: String,
    /// Part length in bytes.
    pub size: u64,
    /// Upload time.
    pub last_modified: DateTime<Utc>,
}

/// An in-flight multipart upload, with enough metadata for a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    /// Target key.
    pub key: String,
    /// Upload id.
    pub upload_id: String,
    /// Creation time.
    pub initiated: DateTime<Utc>,
    /// Initiating identity.
    pub owner: Owner,
}

/// A part reference in a CompleteMultipartUpload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number.
    pub part_number: u32,
    /// Entity tag the client received from UploadPart.
    pub etag: String,
}

/// Whether CopyObject keeps or replaces the source metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataDirective {
    /// Keep the source metadata.
    #[default]
    Copy,
    /// Use the metadata supplied with the request.
    Replace,
}

/// Backend-level listing query. Pagination is expressed as an exclusive
/// lower bound (`start_after`); token encoding happens above the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Roll keys up to common prefixes at the first occurrence after `prefix`.
    pub delimiter: String,
    /// Skip every entry that sorts at or before this value.
    pub start_after: String,
    /// Upper bound on keys plus common prefixes returned.
    pub max_keys: usize,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects, sorted by key.
    pub objects: Vec<ObjectSummary>,
    /// Common prefixes, sorted.
    pub common_prefixes: Vec<String>,
    /// Whether more entries exist past this page.
    pub is_truncated: bool,
    /// The last key or prefix returned when truncated.
    pub next_marker: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_grant_owner_full_control_in_private_policy() {
        let policy = AccessControlPolicy::private(Owner::new("alice"));
        let alice = Identity::account("alice");
        let bob = Identity::account("bob");
        assert!(policy.grants(&alice, Permission::Write));
        assert!(policy.grants(&alice, Permission::WriteAcp));
        assert!(!policy.grants(&bob, Permission::Read));
    }

    #[test]
    fn test_should_expand_public_read() {
        let policy =
            AccessControlPolicy::from_canned(CannedAcl::PublicRead, Owner::new("alice"), None);
        assert!(policy.grants(&Identity::Anonymous, Permission::Read));
        assert!(!policy.grants(&Identity::Anonymous, Permission::Write));
    }

    #[test]
    fn test_should_limit_authenticated_read_to_accounts() {
        let policy = AccessControlPolicy::from_canned(
            CannedAcl::AuthenticatedRead,
            Owner::new("alice"),
            None,
        );
        assert!(policy.grants(&Identity::account("bob"), Permission::Read));
        assert!(!policy.grants(&Identity::Anonymous, Permission::Read));
    }

    #[test]
    fn test_should_grant_bucket_owner_full_control() {
        let bucket_owner = Owner::new("carol");
        let policy = AccessControlPolicy::from_canned(
            CannedAcl::BucketOwnerFullControl,
            Owner::new("alice"),
            Some(&bucket_owner),
        );
        assert!(policy.grants(&Identity::account("carol"), Permission::WriteAcp));
        assert_eq!(policy.grants.len(), 2);
    }

    #[test]
    fn test_should_parse_canned_acl_values() {
        assert_eq!(CannedAcl::parse("public-read"), Some(CannedAcl::PublicRead));
        assert_eq!(CannedAcl::parse("world-writable"), None);
        assert_eq!(CannedAcl::PublicReadWrite.as_str(), "public-read-write");
    }

    #[test]
    fn test_should_treat_full_control_as_superset() {
        assert!(Permission::FullControl.covers(Permission::ReadAcp));
        assert!(!Permission::Read.covers(Permission::Write));
    }

    #[test]
    fn test_should_roundtrip_policy_through_json() {
        let policy =
            AccessControlPolicy::from_canned(CannedAcl::PublicRead, Owner::new("alice"), None);
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"FULL_CONTROL\""));
        let back: AccessControlPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_should_report_anonymous_identity() {
        let anon = Identity::Anonymous;
        assert!(anon.is_anonymous());
        assert!(!anon.is_admin());
        assert!(!anon.owns(&Owner::new("anonymous")));
        assert!(Identity::admin("root").is_admin());
    }
}
