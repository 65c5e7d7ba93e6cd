//! Filesystem-backed storage.
//!
//! Each bucket is a directory under the root and each object a regular file
//! at the path its key names, so the tree stays browsable with ordinary
//! tools. Gateway state (bucket record, object sidecars, multipart staging,
//! scratch space) lives under the bucket's `.s3gw` directory; see
//! [`paths`] for the layout.
//!
//! Writes go to a scratch file in the bucket's own tmp directory and are
//! published with `rename(2)`, which is atomic on one volume. The sidecar is
//! published first and the payload second, both under the key's write lock,
//! while readers hold the read lock while they open the payload and read the
//! sidecar. A reader therefore sees either the old pair or the new one.

mod list;
mod lock;
mod meta;
mod multipart;
mod paths;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use s3gw_model::types::{
    AccessControlPolicy, BucketInfo, CompletedPart, ListPage, ListQuery, ObjectInfo, PartInfo,
    UploadInfo,
};

use crate::backend::{Backend, ObjectAttrs, ObjectData, UploadParts};
use crate::error::{BackendError, BackendResult};
use crate::utils::{ByteRange, compute_etag};

use self::lock::KeyLocks;
use self::meta::{BucketRecord, ObjectRecord, is_missing, read_json, write_json};
use self::paths::{BucketLayout, ObjectKey, TRASH_DIR};

/// How often a rename is retried after a concurrent delete pruned its
/// destination directory.
const PUBLISH_ATTEMPTS: usize = 3;

/// Objects as files under a root directory.
#[derive(Debug)]
pub struct PosixBackend {
    root: PathBuf,
    /// Per-key stripes pairing a payload with its sidecar.
    locks: KeyLocks,
    /// Per-bucket stripes: shared by publishers, exclusive for bucket deletion.
    buckets: KeyLocks,
    /// Per-upload stripes: shared by part uploads, exclusive for complete and abort.
    uploads: KeyLocks,
}

impl PosixBackend {
    /// Serve buckets from the directories under `root`.
    ///
    /// # Errors
    ///
    /// Fails when `root` does not exist or is not a directory.
    pub async fn open(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        let metadata = tokio::fs::metadata(&root).await?;
        if !metadata.is_dir() {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            )));
        }
        info!(root = %root.display(), "posix backend ready");
        Ok(Self {
            root,
            locks: KeyLocks::default(),
            buckets: KeyLocks::default(),
            uploads: KeyLocks::default(),
        })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layout(&self, bucket: &str) -> BucketLayout {
        BucketLayout::new(&self.root, bucket)
    }

    async fn bucket_record(&self, bucket: &str) -> BackendResult<(BucketLayout, BucketRecord)> {
        let layout = self.layout(bucket);
        match read_json::<BucketRecord>(&layout.record()).await? {
            Some(record) => Ok((layout, record)),
            None => Err(BackendError::NoSuchBucket {
                bucket: bucket.to_owned(),
            }),
        }
    }

    async fn require_bucket(&self, bucket: &str) -> BackendResult<BucketLayout> {
        self.bucket_record(bucket).await.map(|(layout, _)| layout)
    }

    /// Publish a staged payload and its record at `key`. The scratch file is
    /// consumed on success and removed on failure.
    async fn publish(
        &self,
        bucket: &str,
        layout: &BucketLayout,
        key: &ObjectKey<'_>,
        payload: &Path,
        record: &ObjectRecord,
    ) -> BackendResult<()> {
        let sidecar = layout.scratch(".json");
        let result = self
            .publish_staged(bucket, layout, key, payload, &sidecar, record)
            .await;
        if result.is_err() {
            discard(payload).await;
            discard(&sidecar).await;
        }
        result
    }

    async fn publish_staged(
        &self,
        bucket: &str,
        layout: &BucketLayout,
        key: &ObjectKey<'_>,
        payload: &Path,
        sidecar: &Path,
        record: &ObjectRecord,
    ) -> BackendResult<()> {
        if key.is_dir_marker() && record.size > 0 {
            return Err(BackendError::InvalidArgument {
                message: format!("Directory object '{}' cannot hold data", key.as_str()),
            });
        }
        write_json(sidecar, record).await?;

        let _bucket = self.buckets.read(bucket, "").await;
        // A bucket deleted while the payload was staged must stay deleted.
        self.require_bucket(bucket).await?;
        let _guard = self.locks.write(bucket, key.as_str()).await;
        check_placement(layout, key).await?;
        let meta_path = layout.meta_path(key);
        if key.is_dir_marker() {
            tokio::fs::create_dir_all(layout.object_path(key))
                .await
                .map_err(|e| placement_error(e.into(), key))?;
            rename_into(sidecar, &meta_path).await?;
            discard(payload).await;
            debug!(bucket, key = key.as_str(), "directory object published");
            return Ok(());
        }
        rename_into(sidecar, &meta_path).await?;
        if let Err(e) = rename_into(payload, &layout.object_path(key)).await {
            // The old payload, if any, is now unpaired and so invisible.
            discard(&meta_path).await;
            return Err(placement_error(e, key));
        }
        debug!(bucket, key = key.as_str(), etag = %record.etag, size = record.size, "object published");
        Ok(())
    }

    /// Write `body` to a fresh scratch file.
    async fn stage(layout: &BucketLayout, body: &[u8]) -> BackendResult<PathBuf> {
        let scratch = layout.scratch("");
        if let Err(e) = tokio::fs::write(&scratch, body).await {
            discard(&scratch).await;
            return Err(e.into());
        }
        Ok(scratch)
    }

    async fn store(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo> {
        let layout = self.require_bucket(bucket).await?;
        let key = ObjectKey::parse(key)?;
        let record = ObjectRecord::new(compute_etag(body), body.len() as u64, attrs);
        let result = async {
            let scratch = Self::stage(&layout, body).await?;
            self.publish(bucket, &layout, &key, &scratch, &record).await
        }
        .await;
        match result {
            Ok(()) => Ok(record.to_info(key.as_str())),
            // The scratch area disappears with a concurrently deleted bucket.
            Err(BackendError::Io(e)) if is_missing(&e) => {
                self.require_bucket(bucket).await?;
                Err(BackendError::Io(e))
            }
            Err(e) => Err(e),
        }
    }

    /// The record of an existing object. Call with the key's lock held.
    async fn object_record(
        layout: &BucketLayout,
        key: &ObjectKey<'_>,
    ) -> BackendResult<ObjectRecord> {
        let no_such_key = || BackendError::NoSuchKey {
            key: key.as_str().to_owned(),
        };
        if !has_payload(layout, key).await? {
            return Err(no_such_key());
        }
        read_json::<ObjectRecord>(&layout.meta_path(key))
            .await?
            .ok_or_else(no_such_key)
    }

    async fn read_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BackendResult<ObjectData> {
        let layout = self.require_bucket(bucket).await?;
        let key = ObjectKey::parse(key)?;
        let no_such_key = || BackendError::NoSuchKey {
            key: key.as_str().to_owned(),
        };

        let guard = self.locks.read(bucket, key.as_str()).await;
        if key.is_dir_marker() {
            let record = Self::object_record(&layout, &key).await?;
            drop(guard);
            if range.is_some_and(|r| r.resolve(record.size).is_none()) {
                return Err(BackendError::InvalidRange);
            }
            return Ok(ObjectData {
                info: record.to_info(key.as_str()),
                body: Bytes::new(),
                range: None,
            });
        }
        let mut file = match tokio::fs::File::open(layout.object_path(&key)).await {
            Ok(file) => file,
            Err(e) if is_missing(&e) => return Err(no_such_key()),
            Err(e) => return Err(e.into()),
        };
        if !file.metadata().await?.is_file() {
            return Err(no_such_key());
        }
        let record = read_json::<ObjectRecord>(&layout.meta_path(&key))
            .await?
            .ok_or_else(no_such_key)?;
        drop(guard);

        // The open handle pins the published payload even if it is replaced
        // or unlinked from here on.
        let resolved = match range {
            Some(range) => Some(range.resolve(record.size).ok_or(BackendError::InvalidRange)?),
            None => None,
        };
        let body = match resolved {
            Some((start, end)) => {
                let len = usize::try_from(end - start + 1)
                    .map_err(|e| BackendError::Internal(anyhow::anyhow!(e)))?;
                let mut buf = vec![0u8; len];
                file.seek(io::SeekFrom::Start(start)).await?;
                file.read_exact(&mut buf).await?;
                buf
            }
            None => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).await?;
                buf
            }
        };

        Ok(ObjectData {
            info: record.to_info(key.as_str()),
            body: Bytes::from(body),
            range: resolved,
        })
    }
}

#[async_trait]
impl Backend for PosixBackend {
    async fn list_buckets(&self) -> BackendResult<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            let layout = self.layout(&name);
            if let Some(record) = read_json::<BucketRecord>(&layout.record()).await? {
                buckets.push(BucketInfo {
                    name,
                    creation_date: record.created,
                    owner: record.acl.owner,
                });
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        acl: AccessControlPolicy,
    ) -> BackendResult<BucketInfo> {
        let layout = self.layout(bucket);
        match tokio::fs::create_dir(layout.dir()).await {
            // An existing plain directory is adopted; its record decides.
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        for dir in layout.all_dirs() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let record = BucketRecord {
            created: Utc::now(),
            acl,
        };
        let scratch = layout.scratch(".json");
        write_json(&scratch, &record).await?;
        // link(2) fails if the target exists: whoever links first owns the bucket.
        let linked = tokio::fs::hard_link(&scratch, layout.record()).await;
        discard(&scratch).await;
        match linked {
            Ok(()) => {
                info!(bucket, owner = %record.acl.owner.id, "bucket created");
                Ok(BucketInfo {
                    name: bucket.to_owned(),
                    creation_date: record.created,
                    owner: record.acl.owner,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(BackendError::BucketAlreadyExists {
                    bucket: bucket.to_owned(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn head_bucket(&self, bucket: &str) -> BackendResult<BucketInfo> {
        let (_, record) = self.bucket_record(bucket).await?;
        Ok(BucketInfo {
            name: bucket.to_owned(),
            creation_date: record.created,
            owner: record.acl.owner,
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> BackendResult<()> {
        // Held until the tree is moved aside, so no publish lands in between.
        let guard = self.buckets.write(bucket, "").await;
        let layout = self.require_bucket(bucket).await?;
        if blocking(layout.clone(), |layout| list::has_objects(&layout)).await? {
            return Err(BackendError::BucketNotEmpty {
                bucket: bucket.to_owned(),
            });
        }

        // Move the whole tree aside first so the name frees up atomically.
        let trash = self.root.join(TRASH_DIR);
        tokio::fs::create_dir_all(&trash).await?;
        let doomed = trash.join(Uuid::new_v4().simple().to_string());
        match tokio::fs::rename(layout.dir(), &doomed).await {
            Ok(()) => {}
            Err(e) if is_missing(&e) => {
                return Err(BackendError::NoSuchBucket {
                    bucket: bucket.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        drop(guard);
        if let Err(e) = tokio::fs::remove_dir_all(&doomed).await {
            warn!(bucket, path = %doomed.display(), error = %e, "failed to clear deleted bucket");
        }
        info!(bucket, "bucket deleted");
        Ok(())
    }

    async fn get_bucket_acl(&self, bucket: &str) -> BackendResult<AccessControlPolicy> {
        let (_, record) = self.bucket_record(bucket).await?;
        Ok(record.acl)
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlPolicy) -> BackendResult<()> {
        // The empty key is never an object, so its stripe serves the bucket record.
        let _guard = self.locks.write(bucket, "").await;
        let (layout, mut record) = self.bucket_record(bucket).await?;
        record.acl = acl;
        let scratch = layout.scratch(".json");
        write_json(&scratch, &record).await?;
        if let Err(e) = tokio::fs::rename(&scratch, layout.record()).await {
            discard(&scratch).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, query: &ListQuery) -> BackendResult<ListPage> {
        let layout = self.require_bucket(bucket).await?;
        let query = query.clone();
        blocking(layout, move |layout| list::list_page(&layout, &query)).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo> {
        self.store(bucket, key, &body, attrs).await
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> BackendResult<ObjectData> {
        self.read_object(bucket, key, range).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectInfo> {
        let layout = self.require_bucket(bucket).await?;
        let key = ObjectKey::parse(key)?;
        let _guard = self.locks.read(bucket, key.as_str()).await;
        Ok(Self::object_record(&layout, &key).await?.to_info(key.as_str()))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        let layout = self.require_bucket(bucket).await?;
        let key = ObjectKey::parse(key)?;
        let payload = layout.object_path(&key);
        let sidecar = layout.meta_path(&key);
        {
            let _guard = self.locks.write(bucket, key.as_str()).await;
            if !has_payload(&layout, &key).await? {
                return Err(BackendError::NoSuchKey {
                    key: key.as_str().to_owned(),
                });
            }
            if key.is_dir_marker() {
                // The sidecar is what makes the directory an object.
                tokio::fs::remove_file(&sidecar).await?;
            } else {
                tokio::fs::remove_file(&payload).await?;
                discard(&sidecar).await;
            }
        }
        let first_dir = if key.is_dir_marker() {
            Some(payload.as_path())
        } else {
            payload.parent()
        };
        if let Some(dir) = first_dir {
            prune_payload_dirs(&layout, dir).await;
        }
        prune_empty_dirs(&sidecar, &layout.meta_root()).await;
        debug!(bucket, key = key.as_str(), "object deleted");
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo> {
        // The source lock is released before the destination lock is taken.
        let source = self.read_object(src_bucket, src_key, None).await?;
        self.store(dst_bucket, dst_key, &source.body, attrs).await
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> BackendResult<AccessControlPolicy> {
        let layout = self.require_bucket(bucket).await?;
        let key = ObjectKey::parse(key)?;
        let _guard = self.locks.read(bucket, key.as_str()).await;
        Ok(Self::object_record(&layout, &key).await?.acl)
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: AccessControlPolicy,
    ) -> BackendResult<()> {
        let layout = self.require_bucket(bucket).await?;
        let key = ObjectKey::parse(key)?;
        let _guard = self.locks.write(bucket, key.as_str()).await;
        let mut record = Self::object_record(&layout, &key).await?;
        record.acl = acl;
        let scratch = layout.scratch(".json");
        write_json(&scratch, &record).await?;
        if let Err(e) = tokio::fs::rename(&scratch, layout.meta_path(&key)).await {
            discard(&scratch).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<UploadInfo> {
        self.create_upload(bucket, key, attrs).await
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> BackendResult<PartInfo> {
        self.stage_part(bucket, key, upload_id, part_number, &body)
            .await
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<UploadParts> {
        self.staged_parts(bucket, key, upload_id).await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BackendResult<ObjectInfo> {
        self.complete_upload(bucket, key, upload_id, parts).await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<()> {
        self.abort_upload(bucket, key, upload_id).await
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> BackendResult<Vec<UploadInfo>> {
        self.in_flight_uploads(bucket, prefix).await
    }
}

/// Run a directory walk on the blocking pool.
async fn blocking<T, F>(layout: BucketLayout, f: F) -> BackendResult<T>
where
    T: Send + 'static,
    F: FnOnce(BucketLayout) -> BackendResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(layout))
        .await
        .map_err(|e| BackendError::Internal(anyhow::anyhow!("directory walk failed: {e}")))?
}

/// Refuse keys that collide with the file/directory shape of existing keys.
async fn check_placement(layout: &BucketLayout, key: &ObjectKey<'_>) -> BackendResult<()> {
    for ancestor in key.ancestors() {
        match tokio::fs::metadata(layout.dir().join(&ancestor)).await {
            Ok(m) if !m.is_dir() => {
                return Err(BackendError::ObjectParentIsFile {
                    key: key.as_str().to_owned(),
                });
            }
            Ok(_) => {}
            Err(e) if is_missing(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }
    match tokio::fs::metadata(layout.object_path(key)).await {
        Ok(m) if key.is_dir_marker() && !m.is_dir() => Err(BackendError::ObjectParentIsFile {
            key: key.as_str().to_owned(),
        }),
        Ok(m) if m.is_dir() && !key.is_dir_marker() => Err(BackendError::ExistingObjectIsDirectory {
            key: key.as_str().to_owned(),
        }),
        Ok(_) => Ok(()),
        Err(e) if is_missing(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A file/directory conflict that appeared after [`check_placement`].
fn placement_error(e: BackendError, key: &ObjectKey<'_>) -> BackendError {
    match e {
        BackendError::Io(ref io) if io.kind() == io::ErrorKind::NotADirectory => {
            BackendError::ObjectParentIsFile {
                key: key.as_str().to_owned(),
            }
        }
        BackendError::Io(ref io) if io.kind() == io::ErrorKind::IsADirectory => {
            BackendError::ExistingObjectIsDirectory {
                key: key.as_str().to_owned(),
            }
        }
        other => other,
    }
}

/// Rename `from` to `to`, creating the parent directory. A concurrent delete
/// may prune that directory in between; the rename is then retried.
async fn rename_into(from: &Path, to: &Path) -> BackendResult<()> {
    let mut attempt = 1;
    loop {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(from, to).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < PUBLISH_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Whether `key` has a published payload: a regular file, or a directory
/// for a marker.
async fn has_payload(layout: &BucketLayout, key: &ObjectKey<'_>) -> BackendResult<bool> {
    match tokio::fs::metadata(layout.object_path(key)).await {
        Ok(m) if key.is_dir_marker() => Ok(m.is_dir()),
        Ok(m) => Ok(m.is_file()),
        Err(e) if is_missing(&e) || e.kind() == io::ErrorKind::NotADirectory => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove empty payload directories from `dir` upwards, stopping below the
/// bucket directory and at any directory that is itself an object.
async fn prune_payload_dirs(layout: &BucketLayout, dir: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        let Ok(rel) = dir.strip_prefix(layout.dir()) else {
            break;
        };
        if rel.as_os_str().is_empty() {
            break;
        }
        if tokio::fs::try_exists(layout.marker_meta_path(rel))
            .await
            .unwrap_or(true)
        {
            break;
        }
        if tokio::fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Remove directories left empty above `path`, up to but excluding `stop`.
async fn prune_empty_dirs(path: &Path, stop: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        // Fails on non-empty directories, which ends the climb.
        if tokio::fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}

/// Best-effort removal of a file.
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if !is_missing(&e) {
            warn!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}
