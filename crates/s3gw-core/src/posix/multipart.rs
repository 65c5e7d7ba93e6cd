//! Multipart staging.
//!
//! An upload is a directory under `.s3gw/multipart/<upload-id>` holding its
//! record and one payload plus one record per part. Completion and abort
//! hold the upload's stripe exclusively; part uploads hold it shared while
//! they rename into the directory. A completion checks the part records
//! before it claims the directory, so a racing abort either runs first or
//! finds the upload consumed, never a claim that is later handed back.

use std::path::{Path, PathBuf};

use chrono::Utc;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use s3gw_model::types::{CompletedPart, ObjectInfo, PartInfo, UploadInfo};

use super::meta::{ObjectRecord, PartRecord, UploadRecord, is_missing, read_json, write_json};
use super::paths::{
    BucketLayout, ObjectKey, parse_part_record_name, part_path, part_record_path,
    upload_info_path,
};
use super::{PosixBackend, discard};
use crate::backend::{ObjectAttrs, UploadParts};
use crate::error::{BackendError, BackendResult};
use crate::utils::{
    compute_etag, compute_multipart_etag, generate_upload_id, is_valid_upload_id, normalize_etag,
};

const COPY_BUFFER: usize = 64 * 1024;

fn no_such_upload(upload_id: &str) -> BackendError {
    BackendError::NoSuchUpload {
        upload_id: upload_id.to_owned(),
    }
}

impl PosixBackend {
    /// Load an upload that belongs to `key`.
    async fn load_upload(
        layout: &BucketLayout,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<(PathBuf, UploadRecord)> {
        if !is_valid_upload_id(upload_id) {
            return Err(no_such_upload(upload_id));
        }
        let dir = layout.upload_dir(upload_id);
        match read_json::<UploadRecord>(&upload_info_path(&dir)).await? {
            Some(record) if record.key == key => Ok((dir, record)),
            _ => Err(no_such_upload(upload_id)),
        }
    }

    /// Take sole ownership of an upload by moving its directory aside.
    async fn claim_upload(
        layout: &BucketLayout,
        dir: &Path,
        upload_id: &str,
        purpose: &str,
    ) -> BackendResult<PathBuf> {
        let claimed = layout.tmp_dir().join(format!("{upload_id}.{purpose}"));
        match tokio::fs::rename(dir, &claimed).await {
            Ok(()) => Ok(claimed),
            Err(e) if is_missing(&e) => Err(no_such_upload(upload_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) async fn create_upload(
        &self,
        bucket: &str,
        key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<UploadInfo> {
        let layout = self.require_bucket(bucket).await?;
        // Refuse unmappable keys now rather than at completion.
        ObjectKey::parse(key)?;

        let upload_id = generate_upload_id();
        let record = UploadRecord {
            key: key.to_owned(),
            upload_id: upload_id.clone(),
            initiated: Utc::now(),
            content_type: attrs.content_type,
            metadata: attrs.metadata,
            acl: attrs.acl,
        };

        // Staged outside and renamed in, so a listed upload always has a record.
        let staging = layout.tmp_dir().join(format!("{upload_id}.new"));
        tokio::fs::create_dir(&staging).await?;
        let result = async {
            write_json(&upload_info_path(&staging), &record).await?;
            let _bucket = self.buckets.read(bucket, "").await;
            self.require_bucket(bucket).await?;
            tokio::fs::rename(&staging, layout.upload_dir(&upload_id)).await?;
            Ok::<(), BackendError>(())
        }
        .await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        debug!(bucket, key, upload_id = %upload_id, "multipart upload created");
        Ok(record.to_info())
    }

    pub(super) async fn stage_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> BackendResult<PartInfo> {
        let layout = self.require_bucket(bucket).await?;
        Self::load_upload(&layout, key, upload_id).await?;

        let record = PartRecord {
            part_number,
            etag: compute_etag(body),
            size: body.len() as u64,
            last_modified: Utc::now(),
        };
        let payload = Self::stage(&layout, body).await?;
        let sidecar = layout.scratch(".json");
        let result = async {
            write_json(&sidecar, &record).await?;
            let _upload = self.uploads.read(bucket, upload_id).await;
            let (dir, _) = Self::load_upload(&layout, key, upload_id).await?;
            tokio::fs::rename(&payload, part_path(&dir, part_number)).await?;
            tokio::fs::rename(&sidecar, part_record_path(&dir, part_number)).await?;
            Ok::<(), BackendError>(())
        }
        .await;

        if let Err(e) = result {
            discard(&payload).await;
            discard(&sidecar).await;
            // The upload was completed or aborted meanwhile.
            return Err(match e {
                BackendError::Io(ref io) if is_missing(io) => no_such_upload(upload_id),
                other => other,
            });
        }
        debug!(bucket, key, upload_id, part_number, size = record.size, "part staged");
        Ok(record.into())
    }

    pub(super) async fn staged_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<UploadParts> {
        let layout = self.require_bucket(bucket).await?;
        let (dir, record) = Self::load_upload(&layout, key, upload_id).await?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if is_missing(&e) => return Err(no_such_upload(upload_id)),
            Err(e) => return Err(e.into()),
        };
        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(part_number) = name.to_str().and_then(parse_part_record_name) else {
                continue;
            };
            if let Some(part) = read_json::<PartRecord>(&part_record_path(&dir, part_number)).await? {
                parts.push(PartInfo::from(part));
            }
        }
        parts.sort_by_key(|p| p.part_number);

        Ok(UploadParts {
            upload: record.to_info(),
            parts,
        })
    }

    pub(super) async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BackendResult<ObjectInfo> {
        let layout = self.require_bucket(bucket).await?;
        let object_key = ObjectKey::parse(key)?;
        let _upload = self.uploads.write(bucket, upload_id).await;
        let (dir, record) = Self::load_upload(&layout, key, upload_id).await?;
        check_parts(&dir, parts).await?;
        let claimed = Self::claim_upload(&layout, &dir, upload_id, "completing").await?;

        let result = self
            .assemble(bucket, &layout, &object_key, &claimed, &record, parts)
            .await;
        match result {
            Ok(info) => {
                if let Err(e) = tokio::fs::remove_dir_all(&claimed).await {
                    warn!(bucket, upload_id, error = %e, "failed to clear completed upload");
                }
                info!(bucket, key, upload_id, parts = parts.len(), etag = %info.etag, "multipart upload completed");
                Ok(info)
            }
            Err(e) => {
                // Storage failed mid-assembly. The stripe is still held, so
                // nobody has seen the upload missing; hand it back.
                if let Err(restore) = tokio::fs::rename(&claimed, &dir).await {
                    warn!(bucket, upload_id, error = %restore, "failed to restore upload after failed completion");
                }
                Err(e)
            }
        }
    }

    /// Concatenate the listed parts into a scratch file, verifying each
    /// part's entity tag on the way, and publish the result.
    async fn assemble(
        &self,
        bucket: &str,
        layout: &BucketLayout,
        key: &ObjectKey<'_>,
        upload_dir: &Path,
        upload: &UploadRecord,
        parts: &[CompletedPart],
    ) -> BackendResult<ObjectInfo> {
        let scratch = layout.scratch("");
        let concatenated = concatenate(&scratch, upload_dir, parts).await;
        let (etags, size) = match concatenated {
            Ok(done) => done,
            Err(e) => {
                discard(&scratch).await;
                return Err(e);
            }
        };

        let record = ObjectRecord::new(compute_multipart_etag(&etags), size, upload.attrs());
        self.publish(bucket, layout, key, &scratch, &record).await?;
        Ok(record.to_info(key.as_str()))
    }

    pub(super) async fn abort_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<()> {
        let layout = self.require_bucket(bucket).await?;
        let _upload = self.uploads.write(bucket, upload_id).await;
        let (dir, _) = Self::load_upload(&layout, key, upload_id).await?;
        let claimed = Self::claim_upload(&layout, &dir, upload_id, "aborting").await?;
        tokio::fs::remove_dir_all(&claimed).await?;
        debug!(bucket, key, upload_id, "multipart upload aborted");
        Ok(())
    }

    pub(super) async fn in_flight_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> BackendResult<Vec<UploadInfo>> {
        let layout = self.require_bucket(bucket).await?;
        let mut entries = match tokio::fs::read_dir(layout.multipart_root()).await {
            Ok(entries) => entries,
            Err(e) if is_missing(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut uploads = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let info = upload_info_path(&entry.path());
            if let Some(record) = read_json::<UploadRecord>(&info).await? {
                if record.key.starts_with(prefix) {
                    uploads.push(record.to_info());
                }
            }
        }
        uploads.sort_by(|a, b| (&a.key, &a.upload_id).cmp(&(&b.key, &b.upload_id)));
        Ok(uploads)
    }
}

/// Check every listed part against its staged record. Call with the
/// upload's stripe held exclusively.
async fn check_parts(upload_dir: &Path, parts: &[CompletedPart]) -> BackendResult<()> {
    for part in parts {
        let staged = read_json::<PartRecord>(&part_record_path(upload_dir, part.part_number)).await?;
        match staged {
            Some(staged) if normalize_etag(&staged.etag) == normalize_etag(&part.etag) => {}
            _ => {
                return Err(BackendError::InvalidPart {
                    part_number: part.part_number,
                });
            }
        }
    }
    Ok(())
}

/// Stream the listed parts into `out`, returning the per-part entity tags
/// and the total size.
async fn concatenate(
    out: &Path,
    upload_dir: &Path,
    parts: &[CompletedPart],
) -> BackendResult<(Vec<String>, u64)> {
    let mut writer = tokio::fs::File::create(out).await?;
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut etags = Vec::with_capacity(parts.len());
    let mut total = 0u64;

    for part in parts {
        let invalid = || BackendError::InvalidPart {
            part_number: part.part_number,
        };
        let mut reader = match tokio::fs::File::open(part_path(upload_dir, part.part_number)).await
        {
            Ok(file) => file,
            Err(e) if is_missing(&e) => return Err(invalid()),
            Err(e) => return Err(e.into()),
        };

        let mut hasher = Md5::new();
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
        }

        let etag = format!("\"{}\"", hex::encode(hasher.finalize()));
        if normalize_etag(&etag) != normalize_etag(&part.etag) {
            return Err(invalid());
        }
        etags.push(etag);
    }

    writer.flush().await?;
    writer.sync_all().await?;
    Ok((etags, total))
}
