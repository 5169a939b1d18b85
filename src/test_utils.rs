//! Shared test utilities for the s3tk library crate.
//!
//! [`MockStorage`] is an in-memory bucket implementing [`StorageTrait`]. It
//! pages listings with key-based continuation tokens, records every call,
//! and exposes its state so tests can inject failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
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
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::{
    CommonPrefix, CompletedPart, DeletedObject, Grant, MultipartUpload, Object, ObjectIdentifier,
    Owner, Part, Permission,
};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use bytes::{Bytes, BytesMut};

use crate::config::{CLITimeoutConfig, ClientConfig, RetryConfig};
use crate::storage::{ListMultipartUploadsRequest, ListObjectsRequest, Storage, StorageTrait};
use crate::transfer::range::ByteRange;
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials};
use crate::uploader::options::PutOptions;

const TOKEN_PREFIX: &str = "after:";
const LAST_MODIFIED_SECS: i64 = 1_700_000_000;

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Client configuration with static credentials and a fixed region, so
/// building a client never touches the environment or the network.
pub(crate) fn make_test_client_config() -> ClientConfig {
    ClientConfig {
        client_config_location: ClientConfigLocation::default(),
        credential: S3Credentials::Credentials {
            access_keys: AccessKeys {
                access_key: "test_access_key".to_string(),
                secret_access_key: "test_secret_access_key".to_string(),
                session_token: None,
            },
        },
        region: Some("us-east-1".to_string()),
        endpoint_url: None,
        force_path_style: false,
        accelerate: false,
        request_payer: None,
        retry_config: RetryConfig {
            aws_max_attempts: 1,
            initial_backoff_milliseconds: 100,
        },
        cli_timeout_config: CLITimeoutConfig::default(),
        disable_stalled_stream_protection: false,
        request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockObject {
    pub body: Bytes,
    pub content_encoding: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct MockUpload {
    pub key: String,
    pub upload_id: String,
    pub options: PutOptions,
    pub parts: BTreeMap<i32, Bytes>,
}

/// Mutable state behind a [`MockStorage`]. Tests edit it through
/// [`MockStorage::configure`] and inspect it through [`MockStorage::state`].
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub objects: BTreeMap<String, MockObject>,
    pub uploads: BTreeMap<(String, String), MockUpload>,
    next_upload_id: u64,

    // Failure injection.
    /// Zero-based list_objects call that fails.
    pub fail_list_call: Option<usize>,
    /// Every listing page returns this token with `is_truncated = true`.
    pub stuck_token: Option<String>,
    /// Zero-based list_objects calls that return an empty truncated page.
    pub empty_truncated_calls: Vec<usize>,
    /// Server-side cap on keys per page, below the requested `max_keys`.
    pub page_cap: Option<usize>,
    /// Continuation pages start this many keys early, repeating the tail
    /// of the previous page.
    pub page_overlap: usize,
    /// Keys that DeleteObjects reports as per-key errors, mapped to a code.
    pub batch_error_keys: HashMap<String, String>,
    pub fail_delete_objects: bool,
    pub fail_upload_part: Option<i32>,
    pub fail_get_object: bool,
    pub upload_delay: Option<Duration>,
    /// Per-part delay, overriding `upload_delay`.
    pub part_delays: HashMap<i32, Duration>,

    // Call records.
    pub list_calls: Vec<ListObjectsRequest>,
    pub list_multipart_calls: Vec<ListMultipartUploadsRequest>,
    pub delete_objects_calls: Vec<Vec<String>>,
    pub delete_object_calls: Vec<String>,
    pub get_object_calls: Vec<(String, Option<ByteRange>)>,
    pub upload_part_calls: Vec<(i32, usize)>,
    /// Part numbers in the order their uploads finished.
    pub upload_part_completions: Vec<i32>,
    pub complete_calls: Vec<Vec<CompletedPart>>,
    pub abort_calls: Vec<String>,
    uploads_in_flight: usize,
    pub max_uploads_in_flight: usize,
}

#[derive(Clone)]
pub(crate) struct MockStorage {
    bucket: String,
    state: Arc<Mutex<MockState>>,
}

impl MockStorage {
    pub(crate) fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A bucket holding `count` objects named `{prefix}{index:06}` of `size` bytes.
    pub(crate) fn with_objects(bucket: &str, prefix: &str, count: usize, size: usize) -> Self {
        let storage = Self::new(bucket);
        storage.configure(|state| {
            for index in 0..count {
                state.objects.insert(
                    format!("{prefix}{index:06}"),
                    MockObject {
                        body: Bytes::from(vec![b'x'; size]),
                        content_encoding: None,
                        metadata: HashMap::new(),
                    },
                );
            }
        });
        storage
    }

    pub(crate) fn put(&self, key: &str, body: impl Into<Bytes>) -> &Self {
        self.configure(|state| {
            state.objects.insert(
                key.to_string(),
                MockObject {
                    body: body.into(),
                    content_encoding: None,
                    metadata: HashMap::new(),
                },
            );
        });
        self
    }

    pub(crate) fn put_encoded(&self, key: &str, body: impl Into<Bytes>, encoding: &str) -> &Self {
        self.configure(|state| {
            state.objects.insert(
                key.to_string(),
                MockObject {
                    body: body.into(),
                    content_encoding: Some(encoding.to_string()),
                    metadata: HashMap::new(),
                },
            );
        });
        self
    }

    pub(crate) fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state());
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    pub(crate) fn object(&self, key: &str) -> Option<Bytes> {
        self.state().objects.get(key).map(|o| o.body.clone())
    }
}

fn last_modified() -> DateTime {
    DateTime::from_secs(LAST_MODIFIED_SECS)
}

fn e_tag_of(body: &[u8]) -> String {
    format!("\"{:016x}\"", body.iter().fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(*b as u64)))
}

fn decode_token(token: &Option<String>) -> Option<&str> {
    token.as_deref().map(|t| t.strip_prefix(TOKEN_PREFIX).unwrap_or(t))
}

#[async_trait]
impl StorageTrait for MockStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsV2Output> {
        let mut state = self.state();
        let call = state.list_calls.len();
        state.list_calls.push(request.clone());

        if state.fail_list_call == Some(call) {
            return Err(anyhow!("injected list_objects failure"));
        }
        if let Some(token) = state.stuck_token.clone() {
            return Ok(ListObjectsV2Output::builder()
                .contents(Object::builder().key(format!("stuck-{call}")).size(1).build())
                .is_truncated(true)
                .next_continuation_token(token)
                .build());
        }
        if state.empty_truncated_calls.contains(&call) {
            let token = request
                .continuation_token
                .clone()
                .unwrap_or_else(|| format!("{TOKEN_PREFIX}{}", request.start_after.clone().unwrap_or_default()));
            // A fresh token string so the cursor visibly advances.
            return Ok(ListObjectsV2Output::builder()
                .is_truncated(true)
                .next_continuation_token(format!("{token}\u{0}"))
                .key_count(0)
                .build());
        }

        let prefix = request.prefix.clone().unwrap_or_default();
        let after = decode_token(&request.continuation_token)
            .map(|t| t.trim_end_matches('\u{0}').to_string())
            .or_else(|| request.start_after.clone())
            .unwrap_or_default();
        let max_keys = (request.max_keys.max(0) as usize).min(state.page_cap.unwrap_or(usize::MAX));

        let mut candidates: Vec<(&String, &MockObject)> = Vec::new();
        if request.continuation_token.is_some() && state.page_overlap > 0 {
            let mut repeated: Vec<(&String, &MockObject)> = state
                .objects
                .range::<String, _>((std::ops::Bound::Unbounded, std::ops::Bound::Included(&after)))
                .rev()
                .filter(|(key, _)| key.starts_with(&prefix))
                .take(state.page_overlap)
                .collect();
            repeated.reverse();
            candidates.extend(repeated);
        }
        candidates.extend(
            state
                .objects
                .range::<String, _>((std::ops::Bound::Excluded(&after), std::ops::Bound::Unbounded))
                .filter(|(key, _)| key.starts_with(&prefix)),
        );

        let mut builder = ListObjectsV2Output::builder();
        let mut emitted = 0;
        let mut last_consumed: Option<String> = None;
        let mut last_prefix: Option<String> = None;
        let mut index = 0;
        while index < candidates.len() {
            let (key, object) = candidates[index];
            let common_prefix = request.delimiter.as_deref().and_then(|delimiter| {
                key[prefix.len()..]
                    .find(delimiter)
                    .map(|pos| key[..prefix.len() + pos + delimiter.len()].to_string())
            });

            if let Some(common_prefix) = common_prefix {
                if last_prefix.as_deref() != Some(common_prefix.as_str()) {
                    if emitted == max_keys {
                        break;
                    }
                    builder = builder.common_prefixes(
                        CommonPrefix::builder().prefix(common_prefix.clone()).build(),
                    );
                    emitted += 1;
                    last_prefix = Some(common_prefix);
                }
            } else {
                if emitted == max_keys {
                    break;
                }
                builder = builder.contents(
                    Object::builder()
                        .key(key.as_str())
                        .size(object.body.len() as i64)
                        .e_tag(e_tag_of(&object.body))
                        .last_modified(last_modified())
                        .storage_class(aws_sdk_s3::types::ObjectStorageClass::Standard)
                        .build(),
                );
                emitted += 1;
            }
            last_consumed = Some(key.clone());
            index += 1;
        }

        let truncated = index < candidates.len();
        builder = builder.is_truncated(truncated).key_count(emitted as i32);
        if truncated {
            if let Some(last) = last_consumed {
                builder = builder.next_continuation_token(format!("{TOKEN_PREFIX}{last}"));
            }
        }
        Ok(builder.build())
    }

    async fn list_multipart_uploads(
        &self,
        request: &ListMultipartUploadsRequest,
    ) -> Result<ListMultipartUploadsOutput> {
        let mut state = self.state();
        state.list_multipart_calls.push(request.clone());

        let prefix = request.prefix.clone().unwrap_or_default();
        let marker = (
            request.key_marker.clone().unwrap_or_default(),
            request.upload_id_marker.clone().unwrap_or_default(),
        );
        let max_uploads = request.max_uploads.unwrap_or(1000).max(0) as usize;

        let candidates: Vec<&MockUpload> = state
            .uploads
            .iter()
            .filter(|((key, id), _)| {
                key.starts_with(&prefix) && (key.as_str(), id.as_str()) > (marker.0.as_str(), marker.1.as_str())
            })
            .map(|(_, upload)| upload)
            .collect();

        let page = &candidates[..max_uploads.min(candidates.len())];
        let truncated = page.len() < candidates.len();

        let mut builder = ListMultipartUploadsOutput::builder()
            .bucket(&self.bucket)
            .is_truncated(truncated);
        for upload in page {
            builder = builder.uploads(
                MultipartUpload::builder()
                    .key(&upload.key)
                    .upload_id(&upload.upload_id)
                    .initiated(last_modified())
                    .build(),
            );
        }
        if truncated {
            if let Some(last) = page.last() {
                builder = builder
                    .next_key_marker(&last.key)
                    .next_upload_id_marker(&last.upload_id);
            }
        }
        Ok(builder.build())
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<String>,
    ) -> Result<ListPartsOutput> {
        let state = self.state();
        let upload = state
            .uploads
            .get(&(key.to_string(), upload_id.to_string()))
            .ok_or_else(|| anyhow!("NoSuchUpload"))?;
        let marker: i32 = part_number_marker
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or(0);

        let mut builder = ListPartsOutput::builder()
            .key(key)
            .upload_id(upload_id)
            .is_truncated(false);
        for (number, body) in upload.parts.range(marker + 1..) {
            builder = builder.parts(
                Part::builder()
                    .part_number(*number)
                    .size(body.len() as i64)
                    .e_tag(e_tag_of(body))
                    .build(),
            );
        }
        Ok(builder.build())
    }

    async fn head_object(&self, key: &str) -> Result<HeadObjectOutput> {
        let state = self.state();
        let object = state
            .objects
            .get(key)
            .ok_or_else(|| anyhow!("NotFound: {key}"))?;

        let mut builder = HeadObjectOutput::builder()
            .content_length(object.body.len() as i64)
            .e_tag(e_tag_of(&object.body))
            .last_modified(last_modified())
            .set_content_encoding(object.content_encoding.clone());
        for (name, value) in &object.metadata {
            builder = builder.metadata(name, value);
        }
        Ok(builder.build())
    }

    async fn get_object_acl(&self, key: &str) -> Result<GetObjectAclOutput> {
        if !self.state().objects.contains_key(key) {
            return Err(anyhow!("NoSuchKey: {key}"));
        }
        let owner = Owner::builder().id("owner-id").display_name("owner").build();
        Ok(GetObjectAclOutput::builder()
            .owner(owner)
            .grants(Grant::builder().permission(Permission::FullControl).build())
            .build())
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> Result<GetObjectOutput> {
        let mut state = self.state();
        state.get_object_calls.push((key.to_string(), range));
        if state.fail_get_object {
            return Err(anyhow!("injected get_object failure"));
        }

        let object = state
            .objects
            .get(key)
            .ok_or_else(|| anyhow!("NoSuchKey: {key}"))?;
        let body = match range {
            Some(range) => {
                let start = (range.start as usize).min(object.body.len());
                let end = (range.end as usize + 1).min(object.body.len());
                object.body.slice(start..end)
            }
            None => object.body.clone(),
        };

        Ok(GetObjectOutput::builder()
            .content_length(body.len() as i64)
            .set_content_encoding(object.content_encoding.clone())
            .e_tag(e_tag_of(&object.body))
            .body(ByteStream::from(body))
            .build())
    }

    async fn delete_object(&self, key: &str) -> Result<DeleteObjectOutput> {
        let mut state = self.state();
        state.delete_object_calls.push(key.to_string());
        state.objects.remove(key);
        Ok(DeleteObjectOutput::builder().build())
    }

    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput> {
        let mut state = self.state();
        state
            .delete_objects_calls
            .push(objects.iter().map(|o| o.key().to_string()).collect());

        if state.fail_delete_objects {
            return Err(anyhow!("injected delete_objects failure: AccessDenied"));
        }

        let mut builder = DeleteObjectsOutput::builder();
        for identifier in &objects {
            let key = identifier.key();
            if let Some(code) = state.batch_error_keys.get(key).cloned() {
                builder = builder.errors(
                    aws_sdk_s3::types::Error::builder()
                        .key(key)
                        .code(code.as_str())
                        .message(format!("{code} error"))
                        .build(),
                );
            } else {
                state.objects.remove(key);
                builder = builder.deleted(DeletedObject::builder().key(key).build());
            }
        }
        Ok(builder.build())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: &PutOptions,
    ) -> Result<CreateMultipartUploadOutput> {
        let mut state = self.state();
        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            (key.to_string(), upload_id.clone()),
            MockUpload {
                key: key.to_string(),
                upload_id: upload_id.clone(),
                options: options.clone(),
                parts: BTreeMap::new(),
            },
        );

        Ok(CreateMultipartUploadOutput::builder()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .build())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<UploadPartOutput> {
        let delay = {
            let mut state = self.state();
            state.upload_part_calls.push((part_number, body.len()));
            state.uploads_in_flight += 1;
            state.max_uploads_in_flight = state.max_uploads_in_flight.max(state.uploads_in_flight);
            state.part_delays.get(&part_number).copied().or(state.upload_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.uploads_in_flight -= 1;
        if state.fail_upload_part == Some(part_number) {
            return Err(anyhow!("injected upload_part failure"));
        }

        let e_tag = e_tag_of(&body);
        let upload = state
            .uploads
            .get_mut(&(key.to_string(), upload_id.to_string()))
            .ok_or_else(|| anyhow!("NoSuchUpload"))?;
        upload.parts.insert(part_number, body);
        state.upload_part_completions.push(part_number);

        Ok(UploadPartOutput::builder().e_tag(e_tag).build())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartUploadOutput> {
        let mut state = self.state();
        state.complete_calls.push(parts.clone());

        let upload = state
            .uploads
            .remove(&(key.to_string(), upload_id.to_string()))
            .ok_or_else(|| anyhow!("NoSuchUpload"))?;

        let mut body = BytesMut::new();
        for part in &parts {
            let number = part.part_number().unwrap_or_default();
            let data = upload
                .parts
                .get(&number)
                .ok_or_else(|| anyhow!("InvalidPart: {number}"))?;
            body.extend_from_slice(data);
        }
        let body = body.freeze();
        let e_tag = e_tag_of(&body);

        state.objects.insert(
            key.to_string(),
            MockObject {
                body,
                content_encoding: upload.options.content_encoding.clone(),
                metadata: upload.options.metadata.clone(),
            },
        );

        Ok(CompleteMultipartUploadOutput::builder()
            .bucket(&self.bucket)
            .key(key)
            .e_tag(e_tag)
            .build())
    }

    async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<AbortMultipartUploadOutput> {
        let mut state = self.state();
        state.abort_calls.push(upload_id.to_string());
        state
            .uploads
            .remove(&(key.to_string(), upload_id.to_string()));
        Ok(AbortMultipartUploadOutput::builder().build())
    }
}
