pub mod client_builder;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
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
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier, RequestPayer,
};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use bytes::Bytes;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::storage::{
    ListMultipartUploadsRequest, ListObjectsRequest, Storage, StorageTrait,
};
use crate::transfer::range::ByteRange;
use crate::uploader::options::PutOptions;

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "NoSuchKey") and the message from the response.
/// For other error types (network, timeout, construction failure), returns
/// "N/A" as the code and the full error description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

pub struct S3StorageFactory;

impl S3StorageFactory {
    pub async fn create(
        client_config: &ClientConfig,
        bucket: String,
        request_payer: Option<RequestPayer>,
        rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
    ) -> Storage {
        let client = Arc::new(client_config.create_client().await);

        Box::new(S3Storage {
            bucket,
            client,
            request_payer,
            rate_limit_objects_per_sec,
        })
    }
}

/// S3 storage bound to a single bucket.
#[derive(Clone)]
struct S3Storage {
    bucket: String,
    client: Arc<Client>,
    request_payer: Option<RequestPayer>,
    rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsV2Output> {
        self.exec_rate_limit_objects_per_sec().await;

        let prefix = request.prefix.as_deref().unwrap_or_default();
        self.client
            .list_objects_v2()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .set_prefix(request.prefix.clone())
            .set_delimiter(request.delimiter.clone())
            .set_start_after(request.start_after.clone())
            .set_continuation_token(request.continuation_token.clone())
            .max_keys(request.max_keys)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = prefix,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::list_objects_v2() failed.")
            })
    }

    async fn list_multipart_uploads(
        &self,
        request: &ListMultipartUploadsRequest,
    ) -> Result<ListMultipartUploadsOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        let prefix = request.prefix.as_deref().unwrap_or_default();
        self.client
            .list_multipart_uploads()
            .bucket(&self.bucket)
            .set_prefix(request.prefix.clone())
            .set_delimiter(request.delimiter.clone())
            .set_key_marker(request.key_marker.clone())
            .set_upload_id_marker(request.upload_id_marker.clone())
            .set_max_uploads(request.max_uploads)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = prefix,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListMultipartUploads API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::list_multipart_uploads() failed.")
            })
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<String>,
    ) -> Result<ListPartsOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .list_parts()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .set_part_number_marker(part_number_marker)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    upload_id = upload_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListParts API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::list_parts() failed.")
            })
    }

    async fn head_object(&self, key: &str) -> Result<HeadObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .head_object()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 HeadObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::head_object() failed.")
            })
    }

    async fn get_object_acl(&self, key: &str) -> Result<GetObjectAclOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .get_object_acl()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObjectAcl API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::get_object_acl() failed.")
            })
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<GetObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .get_object()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(|r| r.to_header()))
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    range = range.map(|r| r.to_string()),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::get_object() failed.")
            })
    }

    async fn delete_object(&self, key: &str) -> Result<DeleteObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .delete_object()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::delete_object() failed.")
            })
    }

    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput> {
        self.exec_rate_limit_objects_per_sec_n(objects.len()).await;

        let object_count = objects.len();
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .context("Failed to build Delete request")?;

        self.client
            .delete_objects()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    object_count = object_count,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObjects API call failed for {} objects in s3://{}: {} ({}).",
                    object_count,
                    self.bucket,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::delete_objects() failed.")
            })
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> Result<CreateMultipartUploadOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        let metadata = if options.metadata.is_empty() {
            None
        } else {
            Some(options.metadata.clone())
        };

        self.client
            .create_multipart_upload()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(metadata)
            .set_content_type(options.content_type.clone())
            .set_content_encoding(options.content_encoding.clone())
            .set_cache_control(options.cache_control.clone())
            .set_content_disposition(options.content_disposition.clone())
            .set_content_language(options.content_language.clone())
            .set_acl(options.acl())
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CreateMultipartUpload API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::create_multipart_upload() failed.")
            })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<UploadPartOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        let content_length = body.len() as i64;
        self.client
            .upload_part()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    upload_id = upload_id,
                    part_number = part_number,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 UploadPart API call failed for part {} of s3://{}/{}: {} ({}).",
                    part_number, self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::upload_part() failed.")
            })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartUploadOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        let part_count = parts.len();
        self.client
            .complete_multipart_upload()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    upload_id = upload_id,
                    part_count = part_count,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CompleteMultipartUpload API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e)
                    .context("aws_sdk_s3::client::complete_multipart_upload() failed.")
            })
    }

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<AbortMultipartUploadOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client
            .abort_multipart_upload()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    upload_id = upload_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 AbortMultipartUpload API call failed for s3://{}/{}: {} ({}).",
                    self.bucket, key, s3_error_code, s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::abort_multipart_upload() failed.")
            })
    }
}

impl S3Storage {
    /// Acquire one token per request for single-object calls.
    async fn exec_rate_limit_objects_per_sec(&self) {
        if let Some(ref rate_limiter) = self.rate_limit_objects_per_sec {
            rate_limiter.acquire_one().await;
        }
    }

    /// Acquire `count` tokens for batch calls, so a 1000-key DeleteObjects
    /// counts as 1000 objects against the configured rate.
    async fn exec_rate_limit_objects_per_sec_n(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(ref rate_limiter) = self.rate_limit_objects_per_sec {
            rate_limiter.acquire(count).await;
        }
    }
}
