use crate::config::{
    CLITimeoutConfig, CleanConfig, ClientConfig, CommandConfig, Config, DEFAULT_QUEUE_SIZE,
    DEFAULT_REPORT_FREQUENCY_MILLISECONDS, DeleteConfig, GetConfig, HeadConfig,
    ListConfig, ListFormat, ListMultipartConfig, MAX_PAGE_SIZE, MIN_PART_SIZE, PutConfig,
    PutSource, ReporterConfig, RetryConfig, SampleConfig, ScanConfig, SizeConfig, TracingConfig,
};
use crate::locator::{ResourceLocation, resolve};
use crate::sampler::SampleOptions;
use crate::transfer::range::ByteRange;
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials};
use crate::uploader::options::PutOptions;
use aws_sdk_s3::types::RequestPayer;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use fancy_regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

pub mod value_parser;


use value_parser::human_bytes::{check_human_bytes, parse_human_bytes};

// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_ACCELERATE: bool = false;
const DEFAULT_REQUEST_PAYER: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;
const DEFAULT_LIST_DELIMITER: &str = "/";
const DEFAULT_LIST_LIMIT: u64 = 100;
const DEFAULT_BATCH_SIZE: u16 = 1000;
const DEFAULT_PART_SIZE: &str = "20MiB";
const DEFAULT_SAMPLE_DEPTH: usize = 3;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_INVALID_REGEX: &str = "Invalid regular expression pattern";
const ERROR_MESSAGE_SUBCOMMAND_REQUIRED: &str =
    "A subcommand is required. Run with --help to list them.";
const ERROR_MESSAGE_BATCH_SIZE_ZERO: &str = "Batch size must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE: &str = "Batch size must be at most 1000 (S3 API limit).";
const ERROR_MESSAGE_PAGE_SIZE_OUT_OF_RANGE: &str = "Page size must be between 1 and 1000.";
const ERROR_MESSAGE_LIMIT_ZERO: &str = "Limit must be at least 1.";
const ERROR_MESSAGE_QUEUE_SIZE_ZERO: &str = "Queue size must be at least 1.";
const ERROR_MESSAGE_PART_SIZE_TOO_SMALL: &str = "Part size must be at least 5MiB.";
const ERROR_MESSAGE_DEPTH_ZERO: &str = "Depth must be at least 1.";
const ERROR_MESSAGE_PUT_SOURCE_REQUIRED: &str = "Must either specify --file or --stdin.";

// ---------------------------------------------------------------------------
// Value parser helpers
// ---------------------------------------------------------------------------

fn check_byte_range(s: &str) -> Result<ByteRange, String> {
    s.parse::<ByteRange>().map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3tk - S3 toolkit for bulk listing, fetching, uploading and cleaning.
///
/// Example:
///   s3tk list s3://my-bucket/logs/ --limit 20
///   s3tk get s3://my-bucket/logs/app.log.gz --stdout --gunzip
///   s3tk put s3://my-bucket/backup.tar --file backup.tar --queue-size 4
///   s3tk clean s3://my-bucket/tmp/ --key-regex '\.tmp$' --dry-run
#[derive(Parser, Clone, Debug)]
#[command(name = "s3tk", version, about, long_about = None)]
pub struct CLIArgs {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Don't show progress reports.
    #[arg(long, env, global = true, default_value_t = DEFAULT_SHOW_NO_PROGRESS, help_heading = "General")]
    pub show_no_progress: bool,

    /// Interval between progress reports in milliseconds. Default: 5000.
    #[arg(
        long,
        env,
        global = true,
        default_value_t = DEFAULT_REPORT_FREQUENCY_MILLISECONDS,
        help_heading = "General",
        long_help = r#"Progress is reported once events have been quiet for this long,
or at twice this interval while events keep arriving."#
    )]
    pub report_frequency_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Maximum objects per second for rate limiting.
    #[arg(long, env, global = true, help_heading = "Performance")]
    pub rate_limit_objects: Option<u32>,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, global = true, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, global = true, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, global = true, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, global = true, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, global = true, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, global = true, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS config file path.
    #[arg(long, env, global = true, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    /// AWS shared credentials file path.
    #[arg(long, env, global = true, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// AWS profile. If not set, the default credential chain is used.
    #[arg(long, global = true, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub profile: Option<String>,

    /// AWS access key ID.
    #[arg(long, global = true, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, global = true, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub secret_access_key: Option<String>,

    /// AWS session token.
    #[arg(long, global = true, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub session_token: Option<String>,

    /// AWS region.
    #[arg(long, global = true, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO, Wasabi).
    #[arg(long, env, global = true, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, global = true, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS")]
    pub force_path_style: bool,

    /// Enable S3 Transfer Acceleration.
    #[arg(long, env, global = true, default_value_t = DEFAULT_ACCELERATE, help_heading = "AWS")]
    pub accelerate: bool,

    /// Enable requester-pays.
    #[arg(long, env, global = true, default_value_t = DEFAULT_REQUEST_PAYER, help_heading = "AWS")]
    pub request_payer: bool,

    /// Disable stalled stream protection.
    #[arg(long, env, global = true, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List keys and common prefixes in a bucket.
    List(ListArgs),
    /// Fetch an object to a file or stdout.
    Get(GetArgs),
    /// Upload a file or stdin as a multipart upload.
    Put(PutArgs),
    /// Delete a single object.
    Delete(ObjectArgs),
    /// Show the metadata of an object.
    Head(HeadArgs),
    /// Delete every key under a prefix, optionally filtered by regex.
    Clean(CleanArgs),
    /// Count the objects and bytes under a prefix.
    Size(SizeArgs),
    /// Stream the content of every matching key to stdout.
    Scan(ScanArgs),
    /// Count the JSON types found at each key path of NDJSON records.
    Sample(SampleArgs),
    /// List incomplete multipart uploads.
    ListMultipart(ListMultipartArgs),
    /// Translate an S3 URI to "<bucket> <key>".
    ParseUri {
        uri: String,
    },
    /// Translate a bucket and key to an S3 URI.
    MakeUri {
        bucket: String,
        key: String,
    },
}

#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Bucket name or URI (s3://bucket/prefix).
    pub bucket_or_uri: String,

    /// Prefix of the keys to list. Overrides the prefix in the URI.
    pub prefix: Option<String>,

    /// Hierarchy delimiter. An empty string disables grouping.
    #[arg(long, default_value = DEFAULT_LIST_DELIMITER)]
    pub delimiter: String,

    /// Start listing after this key.
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub start_after: Option<String>,

    /// Output format of each listed key.
    #[arg(short = 'f', long, value_enum, default_value_t = ListFormat::Key)]
    pub format: ListFormat,

    /// Maximum number of keys to list.
    #[arg(short = 'l', long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: u64,

    /// List every key (ignores --limit).
    #[arg(short = 'u', long)]
    pub unlimited: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ObjectArgs {
    /// Bucket name or URI (s3://bucket/key).
    pub bucket_or_uri: String,

    /// Key of the object. Overrides the key in the URI.
    pub key: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    /// Destination file. Defaults to the basename of the key.
    #[arg(short = 'f', long, conflicts_with = "stdout")]
    pub file: Option<PathBuf>,

    /// Write to stdout instead of a file.
    #[arg(short = 'S', long)]
    pub stdout: bool,

    /// Inclusive byte range to download, e.g. "0-499" or "500".
    #[arg(short = 'R', long, value_parser = check_byte_range)]
    pub range: Option<ByteRange>,

    /// Decompress gzip content detected by its magic bytes.
    #[arg(long)]
    pub gunzip: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PutArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    /// Read the content from this file.
    #[arg(short = 'f', long, conflicts_with = "stdin")]
    pub file: Option<PathBuf>,

    /// Stream the content from stdin.
    #[arg(short = 'S', long)]
    pub stdin: bool,

    /// Header applied to the object, e.g. -H "ContentEncoding:gzip".
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// User metadata applied to the object, e.g. -m "git-hash:feedbeef".
    #[arg(short = 'm', long)]
    pub metadata: Vec<String>,

    /// Make the object publicly readable.
    #[arg(short = 'P', long)]
    pub publish: bool,

    /// Size of each part (held in memory while buffered).
    #[arg(
        short = 'p',
        long,
        default_value = DEFAULT_PART_SIZE,
        value_parser = check_human_bytes,
        long_help = r#"Size of each uploaded part. Minimum 5MiB.
Allow suffixes: KB, KiB, MB, MiB, GB, GiB"#
    )]
    pub part_size: String,

    /// Maximum number of buffered parts awaiting upload.
    #[arg(long, default_value_t = DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,
}

#[derive(Args, Clone, Debug)]
pub struct HeadArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    /// Also fetch the object's ACL.
    #[arg(short = 'a', long)]
    pub acl: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PrefixArgs {
    /// Bucket name or URI (s3://bucket/prefix).
    pub bucket_or_uri: String,

    /// Prefix to which the command is limited. Overrides the prefix in the URI.
    pub prefix: Option<String>,

    /// Only include keys matching this regular expression.
    #[arg(short = 'k', long, value_parser = NonEmptyStringValueParser::new())]
    pub key_regex: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct CleanArgs {
    #[command(flatten)]
    pub target: PrefixArgs,

    /// Simulation mode. Lists and filters keys but does not delete.
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Log every key as [FILTERED] or [DELETED].
    #[arg(long)]
    pub verbose_keys: bool,

    /// Keys per DeleteObjects request (1-1000).
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u16,

    /// Write one NDJSON record per matched key to this file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct SizeArgs {
    #[command(flatten)]
    pub target: PrefixArgs,

    /// Log every key as [FILTERED] or [COUNTED].
    #[arg(long)]
    pub verbose_keys: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub target: PrefixArgs,

    /// Decompress gzip content detected by its magic bytes.
    #[arg(long)]
    pub gunzip: bool,
}

#[derive(Args, Clone, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub target: PrefixArgs,

    /// Levels of nested keys to sample.
    #[arg(short = 'd', long, default_value_t = DEFAULT_SAMPLE_DEPTH)]
    pub depth: usize,

    /// Dotted key path whose string value is parsed as JSON. Repeatable.
    #[arg(short = 'p', long, value_parser = NonEmptyStringValueParser::new())]
    pub parse: Vec<String>,

    /// Sample the items of arrays as well.
    #[arg(long)]
    pub inspect_arrays: bool,

    /// Print every key as [FILTERED] or [SAMPLED].
    #[arg(long)]
    pub verbose_keys: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ListMultipartArgs {
    /// Bucket name or URI (s3://bucket/prefix).
    pub bucket_or_uri: String,

    /// Key prefix to which the scan is limited.
    pub prefix: Option<String>,

    /// Delimiter for common prefixes (none by default).
    #[arg(short = 'd', long, value_parser = NonEmptyStringValueParser::new())]
    pub delimiter: Option<String>,

    /// Maximum number of uploads to return.
    #[arg(short = 'l', long)]
    pub limit: Option<u64>,

    /// Entries fetched per request (max 1000).
    #[arg(short = 'P', long, default_value_t = MAX_PAGE_SIZE)]
    pub page_size: i32,

    /// Write one NDJSON record per upload to this file.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Log every upload with its age.
    #[arg(long)]
    pub verbose_keys: bool,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3tk_rs::config::args::{Commands, parse_from_args};
///
/// let args = vec!["s3tk", "clean", "s3://my-bucket/tmp/", "--dry-run"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(matches!(cli_args.command, Some(Commands::Clean(ref clean)) if clean.dry_run));
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

fn compile_regex(pattern: &Option<String>) -> Result<Option<Regex>, String> {
    match pattern {
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| format!("{ERROR_MESSAGE_INVALID_REGEX} for key-regex: {e}")),
        None => Ok(None),
    }
}

fn resolve_location(bucket_or_uri: &str, key: Option<&str>) -> Result<ResourceLocation, String> {
    resolve(bucket_or_uri, key).map_err(|e| e.to_string())
}

fn resolve_object(args: &ObjectArgs) -> Result<ResourceLocation, String> {
    let location = resolve_location(&args.bucket_or_uri, args.key.as_deref())?;
    location.require_key().map_err(|e| e.to_string())?;
    Ok(location)
}

impl PrefixArgs {
    fn location(&self) -> Result<ResourceLocation, String> {
        resolve_location(&self.bucket_or_uri, self.prefix.as_deref())
    }
}

impl Commands {
    fn build_command_config(&self) -> Result<CommandConfig, String> {
        let config = match self {
            Commands::List(args) => {
                if !args.unlimited && args.limit == 0 {
                    return Err(ERROR_MESSAGE_LIMIT_ZERO.to_string());
                }
                CommandConfig::List(ListConfig {
                    location: resolve_location(&args.bucket_or_uri, args.prefix.as_deref())?,
                    delimiter: Some(args.delimiter.clone()).filter(|d| !d.is_empty()),
                    start_after: args.start_after.clone(),
                    limit: (!args.unlimited).then_some(args.limit),
                    format: args.format,
                })
            }
            Commands::Get(args) => CommandConfig::Get(GetConfig {
                location: resolve_object(&args.object)?,
                file: args.file.clone(),
                stdout: args.stdout,
                range: args.range,
                gunzip: args.gunzip,
            }),
            Commands::Put(args) => {
                let source = match (&args.file, args.stdin) {
                    (Some(file), _) => PutSource::File(file.clone()),
                    (None, true) => PutSource::Stdin,
                    (None, false) => return Err(ERROR_MESSAGE_PUT_SOURCE_REQUIRED.to_string()),
                };
                let part_size = parse_human_bytes(&args.part_size)?;
                let part_size = usize::try_from(part_size).map_err(|e| e.to_string())?;
                if part_size < MIN_PART_SIZE {
                    return Err(ERROR_MESSAGE_PART_SIZE_TOO_SMALL.to_string());
                }
                if args.queue_size == 0 {
                    return Err(ERROR_MESSAGE_QUEUE_SIZE_ZERO.to_string());
                }
                let options = PutOptions::from_entries(&args.headers, &args.metadata, args.publish)
                    .map_err(|e| e.to_string())?;

                CommandConfig::Put(PutConfig {
                    location: resolve_object(&args.object)?,
                    source,
                    options,
                    part_size,
                    queue_size: args.queue_size,
                })
            }
            Commands::Delete(args) => CommandConfig::Delete(DeleteConfig {
                location: resolve_object(args)?,
            }),
            Commands::Head(args) => CommandConfig::Head(HeadConfig {
                location: resolve_object(&args.object)?,
                acl: args.acl,
            }),
            Commands::Clean(args) => {
                if args.batch_size == 0 {
                    return Err(ERROR_MESSAGE_BATCH_SIZE_ZERO.to_string());
                }
                if args.batch_size > 1000 {
                    return Err(ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE.to_string());
                }
                CommandConfig::Clean(CleanConfig {
                    location: args.target.location()?,
                    key_regex: compile_regex(&args.target.key_regex)?,
                    dry_run: args.dry_run,
                    force: args.force,
                    verbose_keys: args.verbose_keys,
                    batch_size: args.batch_size as usize,
                    output: args.output.clone(),
                })
            }
            Commands::Size(args) => CommandConfig::Size(SizeConfig {
                location: args.target.location()?,
                key_regex: compile_regex(&args.target.key_regex)?,
                verbose_keys: args.verbose_keys,
            }),
            Commands::Scan(args) => CommandConfig::Scan(ScanConfig {
                location: args.target.location()?,
                key_regex: compile_regex(&args.target.key_regex)?,
                gunzip: args.gunzip,
            }),
            Commands::Sample(args) => {
                if args.depth == 0 {
                    return Err(ERROR_MESSAGE_DEPTH_ZERO.to_string());
                }
                CommandConfig::Sample(SampleConfig {
                    location: args.target.location()?,
                    key_regex: compile_regex(&args.target.key_regex)?,
                    options: SampleOptions {
                        depth: args.depth,
                        parse_paths: args.parse.clone(),
                        inspect_arrays: args.inspect_arrays,
                    },
                    verbose_keys: args.verbose_keys,
                })
            }
            Commands::ListMultipart(args) => {
                if args.page_size < 1 || args.page_size > MAX_PAGE_SIZE {
                    return Err(ERROR_MESSAGE_PAGE_SIZE_OUT_OF_RANGE.to_string());
                }
                if args.limit == Some(0) {
                    return Err(ERROR_MESSAGE_LIMIT_ZERO.to_string());
                }
                CommandConfig::ListMultipart(ListMultipartConfig {
                    location: resolve_location(&args.bucket_or_uri, args.prefix.as_deref())?,
                    delimiter: args.delimiter.clone(),
                    limit: args.limit,
                    page_size: args.page_size,
                    file: args.file.clone(),
                    verbose_keys: args.verbose_keys,
                })
            }
            Commands::ParseUri { uri } => CommandConfig::ParseUri { uri: uri.clone() },
            Commands::MakeUri { bucket, key } => CommandConfig::MakeUri {
                bucket: bucket.clone(),
                key: key.clone(),
            },
        };
        Ok(config)
    }
}

impl CLIArgs {
    fn build_client_config(&self) -> ClientConfig {
        let credential = if let Some(ref profile) = self.profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.access_key {
            let secret_key = self.secret_access_key.clone().unwrap_or_default();
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: secret_key,
                    session_token: self.session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        let request_payer = if self.request_payer {
            Some(RequestPayer::Requester)
        } else {
            None
        };

        ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            force_path_style: self.force_path_style,
            accelerate: self.accelerate,
            request_payer,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        let command = match (&args.command, args.auto_complete_shell) {
            (Some(command), _) => Some(command.build_command_config()?),
            (None, Some(_)) => None,
            (None, None) => return Err(ERROR_MESSAGE_SUBCOMMAND_REQUIRED.to_string()),
        };

        let reporter_config = ReporterConfig::from_frequency(Duration::from_millis(
            args.report_frequency_milliseconds,
        ));
        reporter_config.validate()?;

        // parse-uri and make-uri never talk to S3.
        let client_config = command
            .as_ref()
            .and_then(CommandConfig::bucket)
            .map(|_| args.build_client_config());

        Ok(Config {
            command,
            client_config,
            tracing_config: args.build_tracing_config(),
            reporter_config,
            show_no_progress: args.show_no_progress,
            rate_limit_objects: args.rate_limit_objects,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
