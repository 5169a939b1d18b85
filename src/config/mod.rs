pub mod args;

use std::path::PathBuf;
use std::time::Duration;

use aws_sdk_s3::types::RequestPayer;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use fancy_regex::Regex;

use crate::locator::ResourceLocation;
use crate::sampler::SampleOptions;
use crate::transfer::range::ByteRange;
use crate::types::{ClientConfigLocation, S3Credentials};
use crate::uploader::options::PutOptions;

pub const DEFAULT_REPORT_FREQUENCY_MILLISECONDS: u64 = 5000;
pub const DEFAULT_PART_SIZE: usize = 20 * 1024 * 1024;
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_QUEUE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Configuration for one `s3tk` invocation.
///
/// Built from [`CLIArgs`](crate::CLIArgs) via `Config::try_from`. Library
/// users may also construct it directly and hand the pieces they need
/// (`client_config`, `reporter_config`, the per-command config) to the
/// functions in [`command`](crate::command).
///
/// ```
/// use s3tk_rs::config::args::build_config_from_args;
/// use s3tk_rs::config::CommandConfig;
///
/// let config = build_config_from_args(["s3tk", "size", "s3://my-bucket/logs/"]).unwrap();
/// let Some(CommandConfig::Size(size)) = config.command else { panic!() };
/// assert_eq!(size.location.bucket, "my-bucket");
/// assert_eq!(size.location.key.as_deref(), Some("logs/"));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` only when shell completion was requested.
    pub command: Option<CommandConfig>,
    pub client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub reporter_config: ReporterConfig,
    pub show_no_progress: bool,
    pub rate_limit_objects: Option<u32>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            command: None,
            client_config: None,
            tracing_config: None,
            reporter_config: ReporterConfig::default(),
            show_no_progress: false,
            rate_limit_objects: None,
            auto_complete_shell: None,
        }
    }
}

/// The resolved subcommand and its options.
#[derive(Debug, Clone)]
pub enum CommandConfig {
    List(ListConfig),
    Get(GetConfig),
    Put(PutConfig),
    Delete(DeleteConfig),
    Head(HeadConfig),
    Clean(CleanConfig),
    Size(SizeConfig),
    Scan(ScanConfig),
    Sample(SampleConfig),
    ListMultipart(ListMultipartConfig),
    ParseUri { uri: String },
    MakeUri { bucket: String, key: String },
}

impl CommandConfig {
    /// The bucket the command talks to, if it needs a storage client at all.
    pub fn bucket(&self) -> Option<&str> {
        let location = match self {
            CommandConfig::List(c) => &c.location,
            CommandConfig::Get(c) => &c.location,
            CommandConfig::Put(c) => &c.location,
            CommandConfig::Delete(c) => &c.location,
            CommandConfig::Head(c) => &c.location,
            CommandConfig::Clean(c) => &c.location,
            CommandConfig::Size(c) => &c.location,
            CommandConfig::Scan(c) => &c.location,
            CommandConfig::Sample(c) => &c.location,
            CommandConfig::ListMultipart(c) => &c.location,
            CommandConfig::ParseUri { .. } | CommandConfig::MakeUri { .. } => return None,
        };
        Some(&location.bucket)
    }

    /// Only `clean --dry-run` simulates; the run context is created with this flag.
    pub fn is_dry_run(&self) -> bool {
        matches!(self, CommandConfig::Clean(c) if c.dry_run)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ListFormat {
    #[default]
    Key,
    BucketKey,
    Url,
}

#[derive(Debug, Clone)]
pub struct ListConfig {
    pub location: ResourceLocation,
    pub delimiter: Option<String>,
    pub start_after: Option<String>,
    /// `None` lists everything.
    pub limit: Option<u64>,
    pub format: ListFormat,
}

#[derive(Debug, Clone)]
pub struct GetConfig {
    pub location: ResourceLocation,
    /// Destination file; the key's basename when neither this nor `stdout` is set.
    pub file: Option<PathBuf>,
    pub stdout: bool,
    pub range: Option<ByteRange>,
    pub gunzip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutSource {
    File(PathBuf),
    Stdin,
}

#[derive(Debug, Clone)]
pub struct PutConfig {
    pub location: ResourceLocation,
    pub source: PutSource,
    pub options: PutOptions,
    pub part_size: usize,
    pub queue_size: usize,
}

#[derive(Debug, Clone)]
pub struct DeleteConfig {
    pub location: ResourceLocation,
}

#[derive(Debug, Clone)]
pub struct HeadConfig {
    pub location: ResourceLocation,
    pub acl: bool,
}

#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub location: ResourceLocation,
    pub key_regex: Option<Regex>,
    pub dry_run: bool,
    pub force: bool,
    pub verbose_keys: bool,
    pub batch_size: usize,
    /// NDJSON audit file with one record per matched key.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SizeConfig {
    pub location: ResourceLocation,
    pub key_regex: Option<Regex>,
    pub verbose_keys: bool,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub location: ResourceLocation,
    pub key_regex: Option<Regex>,
    pub gunzip: bool,
}

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub location: ResourceLocation,
    pub key_regex: Option<Regex>,
    pub options: SampleOptions,
    pub verbose_keys: bool,
}

#[derive(Debug, Clone)]
pub struct ListMultipartConfig {
    pub location: ResourceLocation,
    pub delimiter: Option<String>,
    pub limit: Option<u64>,
    pub page_size: i32,
    pub file: Option<PathBuf>,
    pub verbose_keys: bool,
}

/// Timing of the throttled progress reporter.
///
/// A report fires after `min_delay` without new events, or `max_delay` after
/// the first unreported event, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl ReporterConfig {
    /// `max_delay` is twice the report frequency.
    pub fn from_frequency(frequency: Duration) -> Self {
        ReporterConfig {
            min_delay: frequency,
            max_delay: frequency * 2,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_delay.is_zero() {
            return Err("Report frequency must be greater than zero.".to_string());
        }
        if self.min_delay > self.max_delay {
            return Err(format!(
                "Reporter min delay ({:?}) must not exceed max delay ({:?}).",
                self.min_delay, self.max_delay
            ));
        }
        Ok(())
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        ReporterConfig::from_frequency(Duration::from_millis(DEFAULT_REPORT_FREQUENCY_MILLISECONDS))
    }
}

/// AWS S3 client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub accelerate: bool,
    pub request_payer: Option<RequestPayer>,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

/// SDK-level retry policy. The engines themselves never retry.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
