//! Listing handlers.
//!
//! Implements `list_objects` (v1, marker based) and `list_objects_v2`
//! (continuation-token based) over the backend's single paging primitive.

use s3gw_model::input::{ListObjectsInput, ListObjectsV2Input};
use s3gw_model::output::{ListObjectsOutput, ListObjectsV2Output};
use s3gw_model::types::ListQuery;
use s3gw_model::{Identity, Permission, S3Error};
use tracing::debug;

use crate::gateway::S3Gateway;
use crate::ops::echo_limit;
use crate::utils::{decode_continuation_token, encode_continuation_token};
use crate::validation::resolve_max_keys;

impl S3Gateway {
    /// List objects, version 1. Needs READ on the bucket.
    pub async fn handle_list_objects(
        &self,
        identity: &Identity,
        input: ListObjectsInput,
    ) -> Result<ListObjectsOutput, S3Error> {
        let max_keys = resolve_max_keys(input.max_keys, "max-keys")?;
        self.authorize_bucket(identity, &input.bucket, Permission::Read)
            .await?;

        let prefix = input.prefix.unwrap_or_default();
        let marker = input.marker.unwrap_or_default();
        let delimiter = input.delimiter.filter(|d| !d.is_empty());
        let query = ListQuery {
            prefix: prefix.clone(),
            delimiter: delimiter.clone().unwrap_or_default(),
            start_after: marker.clone(),
            max_keys,
        };
        let page = self.backend.list_objects(&input.bucket, &query).await?;

        debug!(
            bucket = %input.bucket,
            prefix = %prefix,
            count = page.objects.len(),
            truncated = page.is_truncated,
            "list_objects completed"
        );

        // v1 only reports NextMarker when a delimiter is in play; without one
        // clients resume from the last key.
        let next_marker = if page.is_truncated && delimiter.is_some() {
            page.next_marker
        } else {
            None
        };
        Ok(ListObjectsOutput {
            name: input.bucket,
            prefix,
            marker,
            delimiter,
            max_keys: echo_limit(max_keys),
            is_truncated: page.is_truncated,
            next_marker,
            contents: page.objects,
            common_prefixes: page.common_prefixes,
        })
    }

    /// List objects, version 2. Needs READ on the bucket.
    pub async fn handle_list_objects_v2(
        &self,
        identity: &Identity,
        input: ListObjectsV2Input,
    ) -> Result<ListObjectsV2Output, S3Error> {
        let max_keys = resolve_max_keys(input.max_keys, "max-keys")?;
        let resume_from = input
            .continuation_token
            .as_deref()
            .map(decode_continuation_token)
            .transpose()?;
        self.authorize_bucket(identity, &input.bucket, Permission::Read)
            .await?;

        let prefix = input.prefix.unwrap_or_default();
        let delimiter = input.delimiter.filter(|d| !d.is_empty());
        // The token takes precedence over start-after.
        let start_after = resume_from
            .or_else(|| input.start_after.clone())
            .unwrap_or_default();
        let query = ListQuery {
            prefix: prefix.clone(),
            delimiter: delimiter.clone().unwrap_or_default(),
            start_after,
            max_keys,
        };
        let mut page = self.backend.list_objects(&input.bucket, &query).await?;

        if !input.fetch_owner {
            for object in &mut page.objects {
                object.owner = None;
            }
        }
        let key_count = page.objects.len() + page.common_prefixes.len();
        let next_continuation_token = if page.is_truncated {
            page.next_marker.as_deref().map(encode_continuation_token)
        } else {
            None
        };

        debug!(
            bucket = %input.bucket,
            prefix = %prefix,
            key_count,
            truncated = page.is_truncated,
            "list_objects_v2 completed"
        );

        Ok(ListObjectsV2Output {
            name: input.bucket,
            prefix,
            delimiter,
            max_keys: echo_limit(max_keys),
            key_count: echo_limit(key_count),
            is_truncated: page.is_truncated,
            continuation_token: input.continuation_token,
            next_continuation_token,
            start_after: input.start_after,
            contents: page.objects,
            common_prefixes: page.common_prefixes,
        })
    }
}

#[cfg(test)]
mod tests {
    use s3gw_model::{CannedAcl, S3ErrorCode};

    use super::*;
    use crate::ops::test_support::{alice, bob, gateway_with_bucket, put};

    fn v2(delimiter: Option<&str>, max_keys: Option<i32>) -> ListObjectsV2Input {
        ListObjectsV2Input {
            bucket: "bucket".to_owned(),
            delimiter: delimiter.map(ToOwned::to_owned),
            max_keys,
            ..ListObjectsV2Input::default()
        }
    }

    #[tokio::test]
    async fn test_should_group_common_prefixes() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        for key in ["a/b", "a/c", "d"] {
            put(&gateway, &alice(), key, b"x").await;
        }
        let out = gateway
            .handle_list_objects_v2(&alice(), v2(Some("/"), None))
            .await
            .unwrap();
        let keys: Vec<&str> = out.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["d"]);
        assert_eq!(out.common_prefixes, ["a/"]);
        assert_eq!(out.key_count, 2);
        assert!(out.contents[0].owner.is_none());
    }

    #[tokio::test]
    async fn test_should_paginate_with_continuation_tokens() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        for key in ["k1", "k2", "k3", "k4", "k5"] {
            put(&gateway, &alice(), key, b"x").await;
        }

        let mut seen = Vec::new();
        let mut input = v2(None, Some(2));
        loop {
            let out = gateway
                .handle_list_objects_v2(&alice(), input.clone())
                .await
                .unwrap();
            seen.extend(out.contents.into_iter().map(|o| o.key));
            match out.next_continuation_token {
                Some(token) => {
                    assert!(out.is_truncated);
                    input.continuation_token = Some(token);
                }
                None => break,
            }
        }
        assert_eq!(seen, ["k1", "k2", "k3", "k4", "k5"]);
    }

    #[tokio::test]
    async fn test_should_include_owner_when_requested() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        put(&gateway, &alice(), "k", b"x").await;
        let mut input = v2(None, None);
        input.fetch_owner = true;
        let out = gateway.handle_list_objects_v2(&alice(), input).await.unwrap();
        assert_eq!(out.contents[0].owner.as_ref().unwrap().id, "alice");
    }

    #[tokio::test]
    async fn test_should_reject_bad_parameters() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let err = gateway
            .handle_list_objects_v2(&alice(), v2(None, Some(-1)))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidArgument);

        let mut input = v2(None, None);
        input.continuation_token = Some("%%%".to_owned());
        let err = gateway.handle_list_objects_v2(&alice(), input).await.unwrap_err();
        assert_eq!(err.code, S3ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_should_list_v1_with_marker() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        for key in ["a", "b/1", "b/2", "c"] {
            put(&gateway, &alice(), key, b"x").await;
        }
        let out = gateway
            .handle_list_objects(
                &alice(),
                ListObjectsInput {
                    bucket: "bucket".to_owned(),
                    delimiter: Some("/".to_owned()),
                    marker: Some("a".to_owned()),
                    max_keys: Some(1),
                    ..ListObjectsInput::default()
                },
            )
            .await
            .unwrap();
        assert!(out.contents.is_empty());
        assert_eq!(out.common_prefixes, ["b/"]);
        assert!(out.is_truncated);
        assert_eq!(out.next_marker.as_deref(), Some("b/"));
    }

    #[tokio::test]
    async fn test_should_require_bucket_read_to_list() {
        let (_dir, gateway) = gateway_with_bucket(None).await;
        let err = gateway
            .handle_list_objects_v2(&bob(), v2(None, None))
            .await
            .unwrap_err();
        assert_eq!(err.code, S3ErrorCode::AccessDenied);

        let (_dir, gateway) = gateway_with_bucket(Some(CannedAcl::AuthenticatedRead)).await;
        gateway
            .handle_list_objects_v2(&bob(), v2(None, None))
            .await
            .unwrap();
    }
}
