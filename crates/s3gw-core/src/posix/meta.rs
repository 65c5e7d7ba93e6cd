//! Sidecar records and the JSON file helpers that persist them.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use s3gw_model::types::{AccessControlPolicy, ObjectInfo, ObjectSummary, PartInfo, UploadInfo};

use crate::backend::ObjectAttrs;
use crate::error::BackendResult;

/// `.s3gw/bucket.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketRecord {
    pub created: DateTime<Utc>,
    pub acl: AccessControlPolicy,
}

/// `.s3gw/meta/<key>.json`, written before the payload is published.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObjectRecord {
    pub etag: String,
    pub size: u64,
    pub content_type: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_modified: DateTime<Utc>,
    pub acl: AccessControlPolicy,
}

impl ObjectRecord {
    pub(crate) fn new(etag: String, size: u64, attrs: ObjectAttrs) -> Self {
        Self {
            etag,
            size,
            content_type: attrs.content_type,
            metadata: attrs.metadata,
            last_modified: Utc::now(),
            acl: attrs.acl,
        }
    }

    pub(crate) fn to_info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_owned(),
            size: self.size,
            etag: self.etag.clone(),
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
            metadata: self.metadata.clone(),
            owner: self.acl.owner.clone(),
        }
    }

    pub(crate) fn into_summary(self, key: String) -> ObjectSummary {
        ObjectSummary {
            key,
            size: self.size,
            etag: self.etag,
            last_modified: self.last_modified,
            owner: Some(self.acl.owner),
        }
    }
}

/// `multipart/<upload>/info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadRecord {
    pub key: String,
    pub upload_id: String,
    pub initiated: DateTime<Utc>,
    pub content_type: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub acl: AccessControlPolicy,
}

impl UploadRecord {
    pub(crate) fn to_info(&self) -> UploadInfo {
        UploadInfo {
            key: self.key.clone(),
            upload_id: self.upload_id.clone(),
            initiated: self.initiated,
            owner: self.acl.owner.clone(),
        }
    }

    pub(crate) fn attrs(&self) -> ObjectAttrs {
        ObjectAttrs {
            content_type: self.content_type.clone(),
            metadata: self.metadata.clone(),
            acl: self.acl.clone(),
        }
    }
}

/// `multipart/<upload>/part-N.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartRecord {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl From<PartRecord> for PartInfo {
    fn from(record: PartRecord) -> Self {
        Self {
            part_number: record.part_number,
            etag: record.etag,
            size: record.size,
            last_modified: record.last_modified,
        }
    }
}

/// Read a JSON record; a missing file is `Ok(None)`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> BackendResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Blocking twin of [`read_json`] for directory walks.
pub(crate) fn read_json_blocking<T: DeserializeOwned>(path: &Path) -> BackendResult<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` into `scratch`. The caller renames it into place.
pub(crate) async fn write_json<T: Serialize>(scratch: &Path, value: &T) -> BackendResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(scratch, bytes).await?;
    Ok(())
}

/// Whether an I/O error means "nothing there". A path component that is a
/// file rather than a directory counts as missing.
pub(crate) fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

#[cfg(test)]
mod tests {
    use s3gw_model::Owner;

    use super::*;

    #[tokio::test]
    async fn test_should_roundtrip_object_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");
        let attrs = ObjectAttrs {
            content_type: "text/plain".to_owned(),
            metadata: HashMap::from([("color".to_owned(), "blue".to_owned())]),
            acl: AccessControlPolicy::private(Owner::new("alice")),
        };
        let record = ObjectRecord::new("\"abc\"".to_owned(), 3, attrs);
        write_json(&path, &record).await.unwrap();

        let back: ObjectRecord = read_json(&path).await.unwrap().unwrap();
        let info = back.to_info("k");
        assert_eq!(info.etag, "\"abc\"");
        assert_eq!(info.owner.id, "alice");
        assert_eq!(info.metadata["color"], "blue");
    }

    #[tokio::test]
    async fn test_should_read_missing_record_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<ObjectRecord> =
            read_json(&dir.path().join("nope.json")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_should_report_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let result: BackendResult<Option<ObjectRecord>> = read_json(&path).await;
        assert!(matches!(
            result,
            Err(crate::error::BackendError::Metadata(_))
        ));
    }
}
