/*!
# Overview
s3tk-rs is a toolkit for bulk operations against Amazon S3 and S3-compatible
object storage: listing, sizing, scanning, fetching, uploading and cleaning
up objects and incomplete multipart uploads.

## Features
- **Paginated Enumeration**: Continuation-token walks with limits and duplicate protection
- **Batched Deletion**: DeleteObjects batches of up to 1000 keys, dry-run simulation, NDJSON audit
- **Streaming Transfer**: Backpressure-aware copy with gzip decoding and byte ranges
- **Multipart Upload**: Bounded-concurrency part uploads that never commit a partial object
- **Record Sampling**: Typed key-path counts over NDJSON objects
- **Throttled Progress**: Debounced progress reports with a maximum latency
- **Library-First**: Every CLI command is an async function in [`command`]

## As a Library
The `s3tk` CLI is a thin wrapper over this library.

Example usage
=============

```toml
[dependencies]
s3tk-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3tk_rs::command::{CommandEnv, run_command};
use s3tk_rs::config::args::build_config_from_args;
use s3tk_rs::storage::create_storage;
use s3tk_rs::types::RunContext;
use s3tk_rs::create_run_cancellation_token;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = build_config_from_args(["s3tk", "size", "s3://my-bucket/logs/"])
        .map_err(anyhow::Error::msg)?;
    let command = config.command.expect("a subcommand was given");

    let client_config = config.client_config.expect("storage commands carry a client config");
    let storage = create_storage(&client_config, command.bucket().unwrap_or_default(), None).await;

    let context = RunContext::new(create_run_cancellation_token(), command.is_dry_run());
    let env = CommandEnv::new(context, config.reporter_config);
    run_command(&command, Some(storage), &env, &mut tokio::io::stdout()).await
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod command;
pub mod config;
pub mod deleter;
pub mod filters;
pub mod lister;
pub mod locator;
pub mod reporter;
pub mod safety;
pub mod sampler;
pub mod storage;
pub mod transfer;
pub mod types;
pub mod uploader;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use types::error::{S3tkError, exit_code_from_error, is_cancelled_error, is_output_closed};
pub use types::token::{RunCancellationToken, create_run_cancellation_token};
