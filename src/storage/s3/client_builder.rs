use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::retry::RetryConfig;
use aws_config::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};

use crate::config::{CLITimeoutConfig, ClientConfig};
use crate::types::S3Credentials;

const PROVIDER_NAME: &str = "s3tk";

impl ClientConfig {
    /// Build an S3 client from the resolved credentials, region, endpoint,
    /// retry, timeout and stalled-stream settings.
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_sdk_config().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .accelerate(self.accelerate)
            .request_checksum_calculation(self.request_checksum_calculation.clone());

        if let Some(endpoint_url) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        Client::from_conf(builder.build())
    }

    async fn load_sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(self.build_retry_config())
            .timeout_config(build_timeout_config(&self.cli_timeout_config));

        if let Some(profile_files) = self.build_profile_files() {
            loader = loader.profile_files(profile_files);
        }

        loader = self.load_credentials(loader);
        loader = self.load_region(loader);

        if self.disable_stalled_stream_protection {
            loader = loader.stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        }

        loader.load().await
    }

    fn load_credentials(&self, loader: ConfigLoader) -> ConfigLoader {
        match &self.credential {
            S3Credentials::Profile(profile) => loader.profile_name(profile),
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.clone(),
                    access_keys.secret_access_key.clone(),
                    access_keys.session_token.clone(),
                    None,
                    PROVIDER_NAME,
                );
                loader.credentials_provider(credentials)
            }
            S3Credentials::FromEnvironment => loader,
        }
    }

    fn load_region(&self, loader: ConfigLoader) -> ConfigLoader {
        match &self.region {
            Some(region) => loader.region(Region::new(region.clone())),
            // Profile and environment chain; a static-credential setup with no
            // region anywhere still needs one for request signing.
            None if matches!(self.credential, S3Credentials::Credentials { .. }) => loader.region(
                RegionProviderChain::default_provider().or_else(Region::new("us-east-1")),
            ),
            None => loader,
        }
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_profile_files(&self) -> Option<ProfileFiles> {
        let location = &self.client_config_location;
        if location.aws_config_file.is_none() && location.aws_shared_credentials_file.is_none() {
            return None;
        }

        let mut builder = ProfileFiles::builder();
        builder = match &location.aws_config_file {
            Some(path) => builder.with_file(ProfileFileKind::Config, path),
            None => builder.include_default_config_file(true),
        };
        builder = match &location.aws_shared_credentials_file {
            Some(path) => builder.with_file(ProfileFileKind::Credentials, path),
            None => builder.include_default_credentials_file(true),
        };
        Some(builder.build())
    }
}

fn build_timeout_config(cli_timeout_config: &CLITimeoutConfig) -> TimeoutConfig {
    let mut builder = TimeoutConfig::builder();

    if let Some(ms) = cli_timeout_config.operation_timeout_milliseconds {
        builder = builder.operation_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli_timeout_config.operation_attempt_timeout_milliseconds {
        builder = builder.operation_attempt_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli_timeout_config.connect_timeout_milliseconds {
        builder = builder.connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli_timeout_config.read_timeout_milliseconds {
        builder = builder.read_timeout(Duration::from_millis(ms));
    }

    builder.build()
}
