//! Bucket lifecycle handlers.
//!
//! Implements `list_buckets`, `create_bucket`, `delete_bucket`,
//! `head_bucket` and `get_bucket_location`.

use s3gw_model::input::{
    CreateBucketInput, DeleteBucketInput, GetBucketLocationInput, HeadBucketInput,
    ListBucketsInput,
};
use s3gw_model::output::{
    CreateBucketOutput, GetBucketLocationOutput, HeadBucketOutput, ListBucketsOutput,
};
use s3gw_model::{AccessControlPolicy, Identity, Permission, S3Error, S3ErrorCode};
use tracing::debug;

use crate::error::BackendError;
use crate::gateway::S3Gateway;
use crate::validation::validate_bucket_name;

impl S3Gateway {
    /// List the buckets visible to the caller: all of them for the admin,
    /// the caller's own otherwise.
    pub async fn handle_list_buckets(
        &self,
        identity: &Identity,
        _input: ListBucketsInput,
    ) -> Result<ListBucketsOutput, S3Error> {
        let mut buckets = self.backend.list_buckets().await?;
        if !identity.is_admin() {
            buckets.retain(|b| identity.owns(&b.owner));
        }
        Ok(ListBucketsOutput {
            owner: identity.owner(),
            buckets,
        })
    }

    /// Create a bucket owned by the caller.
    pub async fn handle_create_bucket(
        &self,
        identity: &Identity,
        input: CreateBucketInput,
    ) -> Result<CreateBucketOutput, S3Error> {
        let bucket = input.bucket;
        validate_bucket_name(&bucket)?;
        if identity.is_anonymous() {
            return Err(S3Error::access_denied(bucket));
        }

        let acl =
            AccessControlPolicy::from_canned(input.acl.unwrap_or_default(), identity.owner(), None);
        match self.backend.create_bucket(&bucket, acl).await {
            Ok(_) => {}
            Err(BackendError::BucketAlreadyExists { .. }) => {
                let existing = self.backend.head_bucket(&bucket).await?;
                let code = if identity.owns(&existing.owner) {
                    S3ErrorCode::BucketAlreadyOwnedByYou
                } else {
                    S3ErrorCode::BucketAlreadyExists
                };
                return Err(S3Error::new(code).with_resource(bucket));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(bucket = %bucket, %identity, "create_bucket completed");
        Ok(CreateBucketOutput {
            location: format!("/{bucket}"),
        })
    }

    /// Delete an empty bucket. Needs full control.
    pub async fn handle_delete_bucket(
        &self,
        identity: &Identity,
        input: DeleteBucketInput,
    ) -> Result<(), S3Error> {
        self.authorize_bucket(identity, &input.bucket, Permission::FullControl)
            .await?;
        self.backend.delete_bucket(&input.bucket).await?;
        debug!(bucket = %input.bucket, "delete_bucket completed");
        Ok(())
    }

    /// Check that a bucket exists and is readable.
    pub async fn handle_head_bucket(
        &self,
        identity: &Identity,
        input: HeadBucketInput,
    ) -> Result<HeadBucketOutput, S3Error> {
        self.authorize_bucket(identity, &input.bucket, Permission::Read)
            .await?;
        Ok(HeadBucketOutput {
            region: self.region.clone(),
        })
    }

    /// The bucket's region; empty for `us-east-1`.
    pub async fn handle_get_bucket_location(
        &self,
        identity: &Identity,
        input: GetBucketLocationInput,
    ) -> Result<GetBucketLocationOutput, S3Error> {
        self.authorize_bucket(identity, &input.bucket, Permission::Read)
            .await?;
        let location_constraint = if self.region == "us-east-1" {
            String::new()
        } else {
            self.region.clone()
        };
        Ok(GetBucketLocationOutput {
            location_constraint,
        })
    }
}
