//! A backend that stores nothing.
//!
//! Every call succeeds with an empty or zero result, which makes it useful
//! for measuring the protocol layer alone and for exercising clients.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use s3gw_model::Owner;
use s3gw_model::types::{
    AccessControlPolicy, BucketInfo, CompletedPart, ListPage, ListQuery, ObjectInfo, PartInfo,
    UploadInfo,
};

use crate::backend::{Backend, ObjectAttrs, ObjectData, UploadParts};
use crate::error::BackendResult;
use crate::utils::{ByteRange, compute_etag, compute_multipart_etag, generate_upload_id};

/// The no-op backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

/// The owner reported for resources nobody created.
fn nobody() -> Owner {
    Owner::new("")
}

fn empty_object(key: &str) -> ObjectInfo {
    ObjectInfo {
        key: key.to_owned(),
        size: 0,
        etag: compute_etag(b""),
        last_modified: Utc::now(),
        content_type: "application/octet-stream".to_owned(),
        metadata: std::collections::HashMap::new(),
        owner: nobody(),
    }
}

/// Anyone may do anything; ACLs are not stored.
fn open_acl() -> AccessControlPolicy {
    AccessControlPolicy::from_canned(
        s3gw_model::CannedAcl::PublicReadWrite,
        nobody(),
        None,
    )
}

#[async_trait]
impl Backend for NoopBackend {
    async fn list_buckets(&self) -> BackendResult<Vec<BucketInfo>> {
        Ok(Vec::new())
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        acl: AccessControlPolicy,
    ) -> BackendResult<BucketInfo> {
        Ok(BucketInfo {
            name: bucket.to_owned(),
            creation_date: Utc::now(),
            owner: acl.owner,
        })
    }

    async fn head_bucket(&self, bucket: &str) -> BackendResult<BucketInfo> {
        Ok(BucketInfo {
            name: bucket.to_owned(),
            creation_date: Utc::now(),
            owner: nobody(),
        })
    }

    async fn delete_bucket(&self, _bucket: &str) -> BackendResult<()> {
        Ok(())
    }

    async fn get_bucket_acl(&self, _bucket: &str) -> BackendResult<AccessControlPolicy> {
        Ok(open_acl())
    }

    async fn put_bucket_acl(&self, _bucket: &str, _acl: AccessControlPolicy) -> BackendResult<()> {
        Ok(())
    }

    async fn list_objects(&self, _bucket: &str, _query: &ListQuery) -> BackendResult<ListPage> {
        Ok(ListPage::default())
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        body: Bytes,
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo> {
        Ok(ObjectInfo {
            size: body.len() as u64,
            etag: compute_etag(&body),
            content_type: attrs.content_type,
            metadata: attrs.metadata,
            owner: attrs.acl.owner,
            ..empty_object(key)
        })
    }

    async fn get_object(
        &self,
        _bucket: &str,
        key: &str,
        _range: Option<ByteRange>,
    ) -> BackendResult<ObjectData> {
        Ok(ObjectData {
            info: empty_object(key),
            body: Bytes::new(),
            range: None,
        })
    }

    async fn head_object(&self, _bucket: &str, key: &str) -> BackendResult<ObjectInfo> {
        Ok(empty_object(key))
    }

    async fn delete_object(&self, _bucket: &str, _key: &str) -> BackendResult<()> {
        Ok(())
    }

    async fn copy_object(
        &self,
        _src_bucket: &str,
        _src_key: &str,
        _dst_bucket: &str,
        dst_key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<ObjectInfo> {
        Ok(ObjectInfo {
            content_type: attrs.content_type,
            metadata: attrs.metadata,
            owner: attrs.acl.owner,
            ..empty_object(dst_key)
        })
    }

    async fn get_object_acl(&self, _bucket: &str, _key: &str) -> BackendResult<AccessControlPolicy> {
        Ok(open_acl())
    }

    async fn put_object_acl(
        &self,
        _bucket: &str,
        _key: &str,
        _acl: AccessControlPolicy,
    ) -> BackendResult<()> {
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        attrs: ObjectAttrs,
    ) -> BackendResult<UploadInfo> {
        Ok(UploadInfo {
            key: key.to_owned(),
            upload_id: generate_upload_id(),
            initiated: Utc::now(),
            owner: attrs.acl.owner,
        })
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> BackendResult<PartInfo> {
        Ok(PartInfo {
            part_number,
            etag: compute_etag(&body),
            size: body.len() as u64,
            last_modified: Utc::now(),
        })
    }

    async fn list_parts(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> BackendResult<UploadParts> {
        Ok(UploadParts {
            upload: UploadInfo {
                key: key.to_owned(),
                upload_id: upload_id.to_owned(),
                initiated: Utc::now(),
                owner: nobody(),
            },
            parts: Vec::new(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        _upload_id: &str,
        parts: &[CompletedPart],
    ) -> BackendResult<ObjectInfo> {
        let etags: Vec<&str> = parts.iter().map(|p| p.etag.as_str()).collect();
        Ok(ObjectInfo {
            etag: compute_multipart_etag(&etags),
            ..empty_object(key)
        })
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
    ) -> BackendResult<()> {
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        _bucket: &str,
        _prefix: &str,
    ) -> BackendResult<Vec<UploadInfo>> {
        Ok(Vec::new())
    }
}
