//! Multipart upload handlers.
//!
//! Implements `create_multipart_upload`, `upload_part`, `list_parts`,
//! `complete_multipart_upload`, `abort_multipart_upload` and
//! `list_multipart_uploads`. Every one of them is gated on a bucket
//! permission, so a caller that gets past the gate may learn whether an
//! upload exists.

use s3gw_model::input::{
    AbortMultipartUploadInput, CompleteMultipartUploadInput, CreateMultipartUploadInput,
    ListMultipartUploadsInput, ListPartsInput, UploadPartInput,
};
use s3gw_model::output::{
    CompleteMultipartUploadOutput, CreateMultipartUploadOutput, ListMultipartUploadsOutput,
    ListPartsOutput, UploadPartOutput,
};
use s3gw_model::{Identity, Permission, S3Error};
use tracing::{debug, info};

use crate::gateway::S3Gateway;
use crate::ops::{echo_limit, new_object_attrs};
use crate::validation::{
    resolve_max_keys, validate_completed_parts, validate_content_md5, validate_metadata,
    validate_object_key, validate_part_number,
};

impl S3Gateway {
    /// Start an upload. Needs WRITE on the bucket.
    pub async fn handle_create_multipart_upload(
        &self,
        identity: &Identity,
        input: CreateMultipartUploadInput,
    ) -> Result<CreateMultipartUploadOutput, S3Error> {
        validate_object_key(&input.key)?;
        validate_metadata(&input.metadata)?;
        let bucket_acl = self
            .authorize_bucket(identity, &input.bucket, Permission::Write)
            .await?;

        let attrs = new_object_attrs(
            identity,
            &bucket_acl.owner,
            input.content_type,
            input.metadata,
            input.acl,
        );
        let upload = self
            .backend
            .create_multipart_upload(&input.bucket, &input.key, attrs)
            .await?;

        debug!(bucket = %input.bucket, key = %input.key, upload_id = %upload.upload_id, "create_multipart_upload completed");
        Ok(CreateMultipartUploadOutput {
            bucket: input.bucket,
            key: input.key,
            upload_id: upload.upload_id,
        })
    }

    /// Stage one part. Needs WRITE on the bucket.
    pub async fn handle_upload_part(
        &self,
        identity: &Identity,
        input: UploadPartInput,
    ) -> Result<UploadPartOutput, S3Error> {
        validate_part_number(input.part_number)?;
        validate_content_md5(input.content_md5.as_deref(), &input.body)?;
        self.authorize_bucket(identity, &input.bucket, Permission::Write)
            .await?;

        let part = self
            .backend
            .upload_part(
                &input.bucket,
                &input.key,
                &input.upload_id,
                input.part_number,
                input.body,
            )
            .await?;
        Ok(UploadPartOutput { etag: part.etag })
    }

    /// Staged parts after `part-number-marker`. Needs READ on the bucket.
    pub async fn handle_list_parts(
        &self,
        identity: &Identity,
        input: ListPartsInput,
    ) -> Result<ListPartsOutput, S3Error> {
        let max_parts = resolve_max_keys(input.max_parts, "max-parts")?;
        self.authorize_bucket(identity, &input.bucket, Permission::Read)
            .await?;

        let staged = self
            .backend
            .list_parts(&input.bucket, &input.key, &input.upload_id)
            .await?;
        let marker = input.part_number_marker.unwrap_or(0);
        let mut parts: Vec<_> = staged
            .parts
            .into_iter()
            .filter(|p| p.part_number > marker)
            .collect();
        let is_truncated = parts.len() > max_parts;
        parts.truncate(max_parts);
        let next_part_number_marker = if is_truncated {
            parts.last().map(|p| p.part_number)
        } else {
            None
        };

        Ok(ListPartsOutput {
            bucket: input.bucket,
            key: input.key,
            upload_id: input.upload_id,
            owner: staged.upload.owner,
            part_number_marker: marker,
            next_part_number_marker,
            max_parts: echo_limit(max_parts),
            is_truncated,
            parts,
        })
    }

    /// Assemble the listed parts into the object. Needs WRITE on the bucket.
    pub async fn handle_complete_multipart_upload(
        &self,
        identity: &Identity,
        input: CompleteMultipartUploadInput,
    ) -> Result<CompleteMultipartUploadOutput, S3Error> {
        validate_completed_parts(&input.parts)?;
        self.authorize_bucket(identity, &input.bucket, Permission::Write)
            .await?;

        let info = self
            .backend
            .complete_multipart_upload(&input.bucket, &input.key, &input.upload_id, &input.parts)
            .await?;

        info!(
            bucket = %input.bucket,
            key = %input.key,
            upload_id = %input.upload_id,
            parts = input.parts.len(),
            "complete_multipart_upload completed"
        );
        Ok(CompleteMultipartUploadOutput {
            location: format!("/{}/{}", input.bucket, input.key),
            bucket: input.bucket,
            key: input.key,
            etag: info.etag,
        })
    }

    /// Discard an upload. Needs WRITE on the bucket.
    pub async fn handle_abort_multipart_upload(
        &self,
        identity: &Identity,
        input: AbortMultipartUploadInput,
    ) -> Result<(), S3Error> {
        self.authorize_bucket(identity, &input.bucket, Permission::Write)
            .await?;
        self.backend
            .abort_multipart_upload(&input.bucket, &input.key, &input.upload_id)
            .await?;
        debug!(bucket = %input.bucket, key = %input.key, upload_id = %input.upload_id, "abort_multipart_upload completed");
        Ok(())
    }

    /// In-flight uploads after the `(key-marker, upload-id-marker)` pair.
    /// Without an upload-id marker every upload for `key-marker` is skipped.
    /// Needs READ on the bucket.
    pub async fn handle_list_multipart_uploads(
        &self,
        identity: &Identity,
        input: ListMultipartUploadsInput,
    ) -> Result<ListMultipartUploadsOutput, S3Error> {
        let max_uploads = resolve_max_keys(input.max_uploads, "max-uploads")?;
        self.authorize_bucket(identity, &input.bucket, Permission::Read)
            .await?;

        let prefix = input.prefix.unwrap_or_default();
        let key_marker = input.key_marker.unwrap_or_default();
        // The upload-id marker means nothing without a key marker.
        let upload_id_marker = if key_marker.is_empty() {
            String::new()
        } else {
            input.upload_id_marker.unwrap_or_default()
        };
        let mut uploads: Vec<_> = self
            .backend
            .list_multipart_uploads(&input.bucket, &prefix)
            .await?
            .into_iter()
            .filter(|u| {
                key_marker.is_empty()
                    || u.key > key_marker
                    || (!upload_id_marker.is_empty()
                        && u.key == key_marker
                        && u.upload_id > upload_id_marker)
            })
            .collect();
        // Pages are cut on the (key, upload id) order the markers assume.
        uploads.sort_by(|a, b| (&a.key, &a.upload_id).cmp(&(&b.key, &b.upload_id)));
        let is_truncated = uploads.len() > max_uploads;
        uploads.truncate(max_uploads);
        let (next_key_marker, next_upload_id_marker) = match uploads.last() {
            Some(last) if is_truncated => (Some(last.key.clone()), Some(last.upload_id.clone())),
            _ => (None, None),
        };

        Ok(ListMultipartUploadsOutput {
            bucket: input.bucket,
            prefix,
            key_marker,
            upload_id_marker,
            next_key_marker,
            next_upload_id_marker,
            max_uploads: echo_limit(max_uploads),
            is_truncated,
            uploads,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use s3gw_model::types::CompletedPart;
    use s3gw_model::{CannedAcl, S3ErrorCode};

    use super::*;
    use crate::ops::test_support::{alice, bob, gateway_with_bucket};

    async fn start(gateway: &S3Gateway, key: &str) -> String {
        gateway
            .handle_create_multipart_upload(
                &alice(),
                CreateMultipartUploadInput {
                    bucket: "bucket".to_owned(),
                    key: key.to_owned(),
                    ..CreateMultipartUploadInput::default()
                },
            )
            .await
            .unwrap()
            .upload_id
    }

    async fn upload(
        gateway: &S3Gateway,
        upload_id: &str,
        n: u32,
        body: &'static [u8],
    ) -> CompletedPart {
        let out = gateway
            .handle_upload_part(
                &alice(),
                UploadPartInput {
                    bucket: "bucket".to_owned(),
                    key: "big".to_owned(),
                    upload_id: upload_id.to_owned(),
                    part_number: n,
                    body: Bytes::from_static(body),
                    content_md5: None,
                },
            )
            .await
            .unwrap();
        CompletedPart {
            part_number: n,
            etag: out.etag,
        }
    }

    fn complete(upload_id: &str, parts: Vec<CompletedPart>) -> CompleteMultipartUploadInput {
        CompleteMultipartUploadInput {
            bucket: "bucket".to_owned(),
            key: "big".to_owned(),
            upload_id: upload_id.to_owned(),
            parts,
        }
    }

    #[tokio::test]
    async fn test_should_complete_upload_with_composite_etag() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let id = start(&gateway, "big").await;
        let p2 = upload(&gateway, &id, 2, b"world").await;
        let p1 = upload(&gateway, &id, 1, b"hello ").await;

        let out = gateway
            .handle_complete_multipart_upload(&alice(), complete(&id, vec![p1, p2]))
            .await
            .unwrap();
        assert!(out.etag.ends_with("-2\""));
        assert_eq!(out.location, "/bucket/big");
    }

    #[tokio::test]
    async fn test_should_reject_out_of_order_and_missing_parts() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let id = start(&gateway, "big").await;
        let p1 = upload(&gateway, &id, 1, b"a").await;
        let p2 = upload(&gateway, &id, 2, b"b").await;

        let err = gateway
            .handle_complete_multipart_upload(
                &alice(),
                complete(&id, vec![p2.clone(), p1.clone()]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidPartOrder);

        let p3 = CompletedPart {
            part_number: 3,
            etag: p2.etag.clone(),
        };
        let err = gateway
            .handle_complete_multipart_upload(&alice(), complete(&id, vec![p1, p2, p3]))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidPart);

        let err = gateway
            .handle_complete_multipart_upload(&alice(), complete(&id, Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::MalformedXML);
    }

    #[tokio::test]
    async fn test_should_paginate_parts() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let id = start(&gateway, "big").await;
        for n in 1..=3 {
            upload(&gateway, &id, n, b"x").await;
        }
        let list = |marker: Option<u32>| ListPartsInput {
            bucket: "bucket".to_owned(),
            key: "big".to_owned(),
            upload_id: id.clone(),
            max_parts: Some(2),
            part_number_marker: marker,
        };

        let out = gateway.handle_list_parts(&alice(), list(None)).await.unwrap();
        let numbers: Vec<u32> = out.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, [1, 2]);
        assert!(out.is_truncated);
        assert_eq!(out.next_part_number_marker, Some(2));
        assert_eq!(out.owner.id, "alice");

        let out = gateway.handle_list_parts(&alice(), list(Some(2))).await.unwrap();
        let numbers: Vec<u32> = out.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, [3]);
        assert!(!out.is_truncated);
    }

    #[tokio::test]
    async fn test_should_paginate_uploads_by_key() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        for key in ["a", "b", "c"] {
            start(&gateway, key).await;
        }
        let out = gateway
            .handle_list_multipart_uploads(
                &alice(),
                ListMultipartUploadsInput {
                    bucket: "bucket".to_owned(),
                    key_marker: Some("a".to_owned()),
                    max_uploads: Some(1),
                    ..ListMultipartUploadsInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.uploads.len(), 1);
        assert_eq!(out.uploads[0].key, "b");
        assert!(out.is_truncated);
        assert_eq!(out.next_key_marker.as_deref(), Some("b"));
        assert_eq!(
            out.next_upload_id_marker.as_deref(),
            Some(out.uploads[0].upload_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_should_page_through_uploads_sharing_a_key() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let mut expected = vec![start(&gateway, "b").await, start(&gateway, "b").await];
        expected.sort();
        start(&gateway, "c").await;

        let mut seen = Vec::new();
        let mut key_marker = None;
        let mut upload_id_marker = None;
        loop {
            let out = gateway
                .handle_list_multipart_uploads(
                    &alice(),
                    ListMultipartUploadsInput {
                        bucket: "bucket".to_owned(),
                        key_marker: key_marker.take(),
                        upload_id_marker: upload_id_marker.take(),
                        max_uploads: Some(1),
                        ..ListMultipartUploadsInput::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(out.uploads.len(), 1);
            seen.push((out.uploads[0].key.clone(), out.uploads[0].upload_id.clone()));
            if !out.is_truncated {
                break;
            }
            key_marker = out.next_key_marker;
            upload_id_marker = out.next_upload_id_marker;
        }

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], ("b".to_owned(), expected[0].clone()));
        assert_eq!(seen[1], ("b".to_owned(), expected[1].clone()));
        assert_eq!(seen[2].0, "c");
    }

    #[tokio::test]
    async fn test_should_skip_whole_key_without_upload_id_marker() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        start(&gateway, "b").await;
        start(&gateway, "b").await;
        start(&gateway, "c").await;
        let out = gateway
            .handle_list_multipart_uploads(
                &alice(),
                ListMultipartUploadsInput {
                    bucket: "bucket".to_owned(),
                    key_marker: Some("b".to_owned()),
                    ..ListMultipartUploadsInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.uploads.len(), 1);
        assert_eq!(out.uploads[0].key, "c");
        assert!(!out.is_truncated);
        assert!(out.next_upload_id_marker.is_none());
    }

    #[tokio::test]
    async fn test_should_report_aborted_upload_as_missing() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let id = start(&gateway, "big").await;
        let abort = || AbortMultipartUploadInput {
            bucket: "bucket".to_owned(),
            key: "big".to_owned(),
            upload_id: id.clone(),
        };
        gateway
            .handle_abort_multipart_upload(&alice(), abort())
            .await
            .unwrap();
        let err = gateway
            .handle_abort_multipart_upload(&alice(), abort())
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NoSuchUpload);
    }

    #[tokio::test]
    async fn test_should_deny_uploads_without_bucket_write() {
        let (_dir, gateway) = gateway_with_bucket(Some(CannedAcl::PublicRead)).await;
        let err = gateway
            .handle_create_multipart_upload(
                &bob(),
                CreateMultipartUploadInput {
                    bucket: "bucket".to_owned(),
                    key: "big".to_owned(),
                    ..CreateMultipartUploadInput::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);

        // Same answer for an upload id that does not exist.
        let err = gateway
            .handle_abort_multipart_upload(
                &bob(),
                AbortMultipartUploadInput {
                    bucket: "bucket".to_owned(),
                    key: "big".to_owned(),
                    upload_id: "0".repeat(32),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
    }
}
