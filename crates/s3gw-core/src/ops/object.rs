//! Object CRUD handlers.
//!
//! Implements `put_object`, `get_object`, `head_object`, `delete_object`
//! and `copy_object`, including conditional and ranged reads.

use s3gw_model::input::{
    CopyObjectInput, DeleteObjectInput, GetObjectInput, HeadObjectInput, PutObjectInput,
};
use s3gw_model::output::{
    CopyObjectOutput, GetObjectOutput, HeadObjectOutput, PutObjectOutput,
};
use s3gw_model::types::{MetadataDirective, ObjectInfo};
use s3gw_model::{Identity, Permission, S3Error, S3ErrorCode};
use tracing::debug;

use crate::gateway::S3Gateway;
use crate::ops::new_object_attrs;
use crate::utils::{ByteRange, is_valid_if_match, is_valid_if_none_match};
use crate::validation::{validate_content_md5, validate_metadata, validate_object_key};

impl S3Gateway {
    /// Store an object. Needs WRITE on the bucket.
    pub async fn handle_put_object(
        &self,
        identity: &Identity,
        input: PutObjectInput,
    ) -> Result<PutObjectOutput, S3Error> {
        validate_object_key(&input.key)?;
        validate_metadata(&input.metadata)?;
        validate_content_md5(input.content_md5.as_deref(), &input.body)?;

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
        let info = self
            .backend
            .put_object(&input.bucket, &input.key, input.body, attrs)
            .await?;

        debug!(bucket = %input.bucket, key = %input.key, etag = %info.etag, size = info.size, "put_object completed");
        Ok(PutObjectOutput { etag: info.etag })
    }

    /// Read an object or a byte range of it. Needs READ on the object.
    pub async fn handle_get_object(
        &self,
        identity: &Identity,
        input: GetObjectInput,
    ) -> Result<GetObjectOutput, S3Error> {
        let range = input.range.as_deref().map(ByteRange::parse).transpose()?;
        self.authorize_object(identity, &input.bucket, &input.key, Permission::Read)
            .await?;

        let data = self
            .backend
            .get_object(&input.bucket, &input.key, range)
            .await?;
        check_conditions(
            &data.info,
            input.if_match.as_deref(),
            input.if_none_match.as_deref(),
        )?;

        let content_range = data.range.map(|(start, end)| (start, end, data.info.size));
        Ok(GetObjectOutput {
            info: data.info,
            body: data.body,
            content_range,
        })
    }

    /// Object metadata. Needs READ on the object.
    pub async fn handle_head_object(
        &self,
        identity: &Identity,
        input: HeadObjectInput,
    ) -> Result<HeadObjectOutput, S3Error> {
        self.authorize_object(identity, &input.bucket, &input.key, Permission::Read)
            .await?;
        let info = self
            .backend
            .head_object(&input.bucket, &input.key)
            .await?;
        check_conditions(
            &info,
            input.if_match.as_deref(),
            input.if_none_match.as_deref(),
        )?;
        Ok(HeadObjectOutput { info })
    }

    /// Remove an object. Needs WRITE on the bucket.
    pub async fn handle_delete_object(
        &self,
        identity: &Identity,
        input: DeleteObjectInput,
    ) -> Result<(), S3Error> {
        self.authorize_bucket(identity, &input.bucket, Permission::Write)
            .await?;
        self.backend
            .delete_object(&input.bucket, &input.key)
            .await?;
        debug!(bucket = %input.bucket, key = %input.key, "delete_object completed");
        Ok(())
    }

    /// Copy an object. Needs READ on the source object and WRITE on the
    /// destination bucket.
    pub async fn handle_copy_object(
        &self,
        identity: &Identity,
        input: CopyObjectInput,
    ) -> Result<CopyObjectOutput, S3Error> {
        validate_object_key(&input.key)?;
        let same_object = input.source_bucket == input.bucket && input.source_key == input.key;
        if same_object && input.metadata_directive == MetadataDirective::Copy {
            return Err(S3Error::with_message(
                S3ErrorCode::InvalidRequest,
                "This copy request is illegal because it is trying to copy an object to itself \
                 without changing the object's metadata, storage class, website redirect \
                 location or encryption attributes.",
            ));
        }

        self.authorize_object(
            identity,
            &input.source_bucket,
            &input.source_key,
            Permission::Read,
        )
        .await?;
        let bucket_acl = self
            .authorize_bucket(identity, &input.bucket, Permission::Write)
            .await?;

        let (content_type, metadata) = match input.metadata_directive {
            MetadataDirective::Copy => {
                let source = self
                    .backend
                    .head_object(&input.source_bucket, &input.source_key)
                    .await?;
                (Some(source.content_type), source.metadata)
            }
            MetadataDirective::Replace => {
                validate_metadata(&input.metadata)?;
                (input.content_type, input.metadata)
            }
        };
        let attrs = new_object_attrs(identity, &bucket_acl.owner, content_type, metadata, input.acl);

        let info = self
            .backend
            .copy_object(
                &input.source_bucket,
                &input.source_key,
                &input.bucket,
                &input.key,
                attrs,
            )
            .await?;

        debug!(
            src = %format!("{}/{}", input.source_bucket, input.source_key),
            dst = %format!("{}/{}", input.bucket, input.key),
            "copy_object completed"
        );
        Ok(CopyObjectOutput {
            etag: info.etag,
            last_modified: info.last_modified,
        })
    }
}

/// Apply `If-Match` (412 on mismatch) and then `If-None-Match` (304 on match).
fn check_conditions(
    info: &ObjectInfo,
    if_match: Option<&str>,
    if_none_match: Option<&str>,
) -> Result<(), S3Error> {
    if let Some(if_match) = if_match {
        if !is_valid_if_match(&info.etag, if_match) {
            return Err(S3Error::new(S3ErrorCode::PreconditionFailed).with_resource(&info.key));
        }
    }
    if let Some(if_none_match) = if_none_match {
        if !is_valid_if_none_match(&info.etag, if_none_match) {
            return Err(S3Error::new(S3ErrorCode::NotModified).with_resource(&info.key));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use s3gw_model::CannedAcl;

    use super::*;
    use crate::ops::DEFAULT_CONTENT_TYPE;
    use crate::ops::test_support::{admin, alice, bob, gateway_with_bucket, put};

    fn get(key: &str) -> GetObjectInput {
        GetObjectInput {
            bucket: "bucket".to_owned(),
            key: key.to_owned(),
            ..GetObjectInput::default()
        }
    }

    fn copy(src_key: &str, dst_key: &str, directive: MetadataDirective) -> CopyObjectInput {
        CopyObjectInput {
            bucket: "bucket".to_owned(),
            key: dst_key.to_owned(),
            source_bucket: "bucket".to_owned(),
            source_key: src_key.to_owned(),
            metadata_directive: directive,
            ..CopyObjectInput::default()
        }
    }

    #[tokio::test]
    async fn test_should_put_and_get_with_default_content_type() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        put(&gateway, &alice(), "k", b"hello").await;
        let out = gateway.handle_get_object(&alice(), get("k")).await.unwrap();
        assert_eq!(&out.body[..], b"hello");
        assert_eq!(out.info.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(out.info.owner.id, "alice");
        assert!(out.content_range.is_none());
    }

    #[tokio::test]
    async fn test_should_deny_writes_without_grant() {
        let (_dir, gateway) = gateway_with_bucket(Some(CannedAcl::PublicRead)).await;
        let err = gateway
            .handle_put_object(
                &bob(),
                PutObjectInput {
                    bucket: "bucket".to_owned(),
                    key: "k".to_owned(),
                    body: Bytes::from_static(b"x"),
                    ..PutObjectInput::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);

        put(&gateway, &alice(), "k", b"x").await;
        let err = gateway
            .handle_delete_object(
                &bob(),
                DeleteObjectInput {
                    bucket: "bucket".to_owned(),
                    key: "k".to_owned(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
    }

    #[tokio::test]
    async fn test_should_hide_missing_object_from_callers_without_bucket_read() {
        let (_dir, gateway) = gateway_with_bucket(None).await;

        let err = gateway.handle_get_object(&alice(), get("nope")).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NoSuchKey);
        let err = gateway.handle_get_object(&admin(), get("nope")).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NoSuchKey);
        let err = gateway.handle_get_object(&bob(), get("nope")).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);

        // An existing private object answers bob the same way.
        put(&gateway, &alice(), "secret", b"x").await;
        let err = gateway.handle_get_object(&bob(), get("secret")).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
    }

    #[tokio::test]
    async fn test_should_reveal_missing_object_to_bucket_readers() {
        let (_dir, gateway) = gateway_with_bucket(Some(CannedAcl::PublicRead)).await;
        let err = gateway
            .handle_get_object(&Identity::Anonymous, get("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NoSuchKey);
    }

    #[tokio::test]
    async fn test_should_hide_missing_bucket_on_object_read() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let mut input = get("k");
        input.bucket = "missing".to_owned();
        let err = gateway.handle_get_object(&alice(), input.clone()).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
        let err = gateway.handle_get_object(&admin(), input).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NoSuchBucket);
    }

    #[tokio::test]
    async fn test_should_serve_ranges() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        put(&gateway, &alice(), "k", b"0123456789").await;

        let mut input = get("k");
        input.range = Some("bytes=-4".to_owned());
        let out = gateway.handle_get_object(&alice(), input).await.unwrap();
        assert_eq!(&out.body[..], b"6789");
        assert_eq!(out.content_range, Some((6, 9, 10)));

        let mut input = get("k");
        input.range = Some("bytes=20-".to_owned());
        let err = gateway.handle_get_object(&alice(), input).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidRange);
    }

    #[tokio::test]
    async fn test_should_evaluate_conditional_headers() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        put(&gateway, &alice(), "k", b"hello").await;
        let etag = "\"5d41402abc4b2a76b9719d911017c592\"";

        let mut input = get("k");
        input.if_match = Some("\"other\"".to_owned());
        let err = gateway.handle_get_object(&alice(), input).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::PreconditionFailed);

        let mut input = get("k");
        input.if_none_match = Some(etag.to_owned());
        let err = gateway.handle_get_object(&alice(), input).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::NotModified);

        let head = HeadObjectInput {
            bucket: "bucket".to_owned(),
            key: "k".to_owned(),
            if_match: Some(etag.to_owned()),
            if_none_match: Some("\"other\"".to_owned()),
        };
        let out = gateway.handle_head_object(&alice(), head).await.unwrap();
        assert_eq!(out.info.size, 5);
    }

    #[tokio::test]
    async fn test_should_delete_then_report_missing_twice() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        put(&gateway, &alice(), "k", b"x").await;
        let delete = || DeleteObjectInput {
            bucket: "bucket".to_owned(),
            key: "k".to_owned(),
        };
        gateway.handle_delete_object(&alice(), delete()).await.unwrap();
        for _ in 0..2 {
            let err = gateway
                .handle_delete_object(&alice(), delete())
                .await
                .unwrap_err();
            assert_eq!(err.code, S3ErrorCode::NoSuchKey);
        }
    }

    #[tokio::test]
    async fn test_should_reject_bad_content_md5() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let err = gateway
            .handle_put_object(
                &alice(),
                PutObjectInput {
                    bucket: "bucket".to_owned(),
                    key: "k".to_owned(),
                    body: Bytes::from_static(b"hello"),
                    content_md5: Some("1B2M2Y8AsgTpgAmY7PhCfg==".to_owned()),
                    ..PutObjectInput::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::BadDigest);
    }

    #[tokio::test]
    async fn test_should_copy_metadata_by_directive() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        gateway
            .handle_put_object(
                &alice(),
                PutObjectInput {
                    bucket: "bucket".to_owned(),
                    key: "src".to_owned(),
                    body: Bytes::from_static(b"payload"),
                    content_type: Some("text/plain".to_owned()),
                    metadata: HashMap::from([("color".to_owned(), "red".to_owned())]),
                    ..PutObjectInput::default()
                },
            )
            .await
            .unwrap();

        gateway
            .handle_copy_object(&alice(), copy("src", "kept", MetadataDirective::Copy))
            .await
            .unwrap();
        let kept = gateway.handle_get_object(&alice(), get("kept")).await.unwrap();
        assert_eq!(&kept.body[..], b"payload");
        assert_eq!(kept.info.content_type, "text/plain");
        assert_eq!(kept.info.metadata["color"], "red");

        let mut replace = copy("src", "replaced", MetadataDirective::Replace);
        replace.content_type = Some("application/json".to_owned());
        gateway.handle_copy_object(&alice(), replace).await.unwrap();
        let replaced = gateway
            .handle_get_object(&alice(), get("replaced"))
            .await
            .unwrap();
        assert_eq!(replaced.info.content_type, "application/json");
        assert!(replaced.info.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_should_refuse_copy_onto_itself_without_replace() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        put(&gateway, &alice(), "k", b"x").await;
        let err = gateway
            .handle_copy_object(&alice(), copy("k", "k", MetadataDirective::Copy))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidRequest);
        gateway
            .handle_copy_object(&alice(), copy("k", "k", MetadataDirective::Replace))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_should_require_source_read_for_copy() {
        let (_dir, gateway) = gateway_with_bucket(Some(CannedAcl::PublicReadWrite)).await;
        put(&gateway, &alice(), "private", b"x").await;
        let err = gateway
            .handle_copy_object(&bob(), copy("private", "stolen", MetadataDirective::Copy))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);
    }
}
