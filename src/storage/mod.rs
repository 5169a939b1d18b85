use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput;
use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::get_object_acl::GetObjectAclOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::operation::list_multipart_uploads::ListMultipartUploadsOutput;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::operation::list_parts::ListPartsOutput;
use aws_sdk_s3::operation::upload_part::UploadPartOutput;
use aws_sdk_s3::types::{CompletedPart, ObjectIdentifier};
use bytes::Bytes;
use dyn_clone::DynClone;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::transfer::range::ByteRange;
use crate::uploader::options::PutOptions;

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// One ListObjectsV2 page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub start_after: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: i32,
}

/// One ListMultipartUploads page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMultipartUploadsRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub max_uploads: Option<i32>,
}

/// The provider primitives the engines are built from.
///
/// A storage instance is bound to one bucket; every key is a full object key.
/// Implementations perform exactly one provider call per method and never
/// retry on their own (the SDK's retry configuration is the only retry
/// policy). Tests substitute in-memory implementations.
#[async_trait]
pub trait StorageTrait: DynClone {
    fn bucket(&self) -> &str;

    /// Fetch one ListObjectsV2 page.
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsV2Output>;

    /// Fetch one ListMultipartUploads page.
    async fn list_multipart_uploads(
        &self,
        request: &ListMultipartUploadsRequest,
    ) -> Result<ListMultipartUploadsOutput>;

    /// Fetch one ListParts page of an incomplete upload.
    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<String>,
    ) -> Result<ListPartsOutput>;

    async fn head_object(&self, key: &str) -> Result<HeadObjectOutput>;

    async fn get_object_acl(&self, key: &str) -> Result<GetObjectAclOutput>;

    /// Start a GetObject; the body is streamed by the caller.
    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<GetObjectOutput>;

    async fn delete_object(&self, key: &str) -> Result<DeleteObjectOutput>;

    /// Delete up to 1000 keys in one request.
    ///
    /// Per-key rejections come back in `DeleteObjectsOutput::errors`; only a
    /// failure of the request as a whole is returned as `Err`.
    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput>;

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> Result<CreateMultipartUploadOutput>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<UploadPartOutput>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartUploadOutput>;

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<AbortMultipartUploadOutput>;
}

dyn_clone::clone_trait_object!(StorageTrait);

// Default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

/// Token bucket limiting provider calls to `objects_per_sec` objects.
pub fn build_rate_limiter(objects_per_sec: u32) -> Arc<RateLimiter> {
    let refill = if (objects_per_sec as usize) <= REFILL_PER_INTERVAL_DIVIDER {
        1
    } else {
        objects_per_sec as usize / REFILL_PER_INTERVAL_DIVIDER
    };
    Arc::new(
        RateLimiter::builder()
            .max(objects_per_sec as usize)
            .initial(objects_per_sec as usize)
            .refill(refill)
            .fair(true)
            .build(),
    )
}

/// Create the S3-backed storage for one bucket.
pub async fn create_storage(
    client_config: &ClientConfig,
    bucket: &str,
    rate_limit_objects: Option<u32>,
) -> Storage {
    let rate_limit_objects_per_sec = rate_limit_objects.map(build_rate_limiter);

    s3::S3StorageFactory::create(
        client_config,
        bucket.to_string(),
        client_config.request_payer.clone(),
        rate_limit_objects_per_sec,
    )
    .await
}
