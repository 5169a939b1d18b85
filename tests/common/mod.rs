//! Shared E2E test infrastructure.
//!
//! `TestHelper` manages throwaway buckets and runs commands against real S3
//! using the `s3tk-e2e-test` AWS profile.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier};
use s3tk_rs::command::{CommandEnv, run_command};
use s3tk_rs::config::Config;
use s3tk_rs::config::args::build_config_from_args;
use s3tk_rs::storage::create_storage;
use s3tk_rs::types::{ProgressSnapshot, RunContext};
use s3tk_rs::{create_run_cancellation_token, exit_code_from_error};

const AWS_PROFILE: &str = "s3tk-e2e-test";

const DEFAULT_REGION: &str = "us-east-1";

/// What a command run left behind.
#[derive(Debug)]
pub struct CommandResult {
    pub output: String,
    pub snapshot: ProgressSnapshot,
    pub exit_code: i32,
}

/// Deletes the bucket and its objects on drop, even when the test panics.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(async move {
                    helper.delete_bucket_cascade(&bucket).await;
                })
            });
        }));
    }
}

pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Arc::new(Self {
            client: Client::new(&sdk_config),
            region,
        })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
        }
    }

    /// A bucket name unique across parallel test processes.
    pub fn generate_bucket_name(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!("s3tk-e2e-{}-{nanos}", std::process::id())
    }

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must not specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        loop {
            let Ok(resp) = self.client.list_objects_v2().bucket(bucket).send().await else {
                break;
            };
            let objects: Vec<ObjectIdentifier> = resp
                .contents()
                .iter()
                .filter_map(|obj| obj.key())
                .filter_map(|key| ObjectIdentifier::builder().key(key).build().ok())
                .collect();
            if objects.is_empty() {
                break;
            }
            let Ok(delete) = Delete::builder().set_objects(Some(objects)).quiet(true).build() else {
                break;
            };
            let _ = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await;
        }

        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key} in {bucket}: {e}"));
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Vec<u8> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to get object {key} in {bucket}: {e}"));
        resp.body.collect().await.unwrap().into_bytes().to_vec()
    }

    pub async fn count_objects(&self, bucket: &str, prefix: &str) -> usize {
        let mut count = 0;
        let mut continuation_token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .unwrap_or_else(|e| panic!("Failed to list objects in {bucket}/{prefix}: {e}"));
            count += resp.contents().len();
            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string())
                }
                _ => break,
            }
        }
        count
    }

    /// Builds a config from CLI arguments, adding the e2e profile.
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full_args: Vec<String> = vec!["s3tk".to_string()];
        full_args.extend(args.iter().map(|s| s.to_string()));
        if !full_args.iter().any(|a| a.starts_with("--profile")) {
            full_args.push("--profile".to_string());
            full_args.push(AWS_PROFILE.to_string());
        }

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    /// Runs the configured command and captures its stdout.
    pub async fn run(config: Config) -> CommandResult {
        let command = config.command.expect("a subcommand");
        let storage = match (command.bucket(), config.client_config.as_ref()) {
            (Some(bucket), Some(client_config)) => {
                Some(create_storage(client_config, bucket, config.rate_limit_objects).await)
            }
            _ => None,
        };

        let context = RunContext::new(create_run_cancellation_token(), command.is_dry_run());
        let env = CommandEnv::new(context.clone(), config.reporter_config);

        let mut output = Vec::new();
        let result = run_command(&command, storage, &env, &mut output).await;

        CommandResult {
            output: String::from_utf8_lossy(&output).into_owned(),
            snapshot: context.snapshot(),
            exit_code: result.as_ref().map_or_else(exit_code_from_error, |_| 0),
        }
    }
}

pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
