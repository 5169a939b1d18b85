//! The subcommands of `s3tk`, one async function each.
//!
//! Commands write their human-readable results to the `out` writer they are
//! given (stdout in the binary). Throttled progress lines go to the optional
//! [`ProgressSink`] instead, so piping results never mixes in progress noise.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::{CommandConfig, ReporterConfig};
use crate::reporter::{ReportFn, ReportTrigger, ThrottledReporter};
use crate::safety::SafetyChecker;
use crate::storage::Storage;
use crate::types::error::output_error;
use crate::types::{ProgressSnapshot, RunContext};

pub mod bulk;
pub mod listing;
pub mod object;
mod output;
pub mod sample;
pub mod uri;

pub use bulk::{clean, scan, size};
pub use listing::{ListSummary, MultipartListSummary, list, list_multipart};
pub use object::{delete, get, head, put};
pub use sample::sample;
pub use uri::{make_uri, parse_uri};

/// Receives rendered progress lines.
pub type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything a command needs besides its storage and its own options.
#[derive(Clone)]
pub struct CommandEnv {
    pub context: RunContext,
    pub reporter_config: ReporterConfig,
    /// `None` keeps the run quiet until its final line.
    pub progress: Option<ProgressSink>,
    pub json_logging: bool,
}

impl CommandEnv {
    pub fn new(context: RunContext, reporter_config: ReporterConfig) -> Self {
        Self {
            context,
            reporter_config,
            progress: None,
            json_logging: false,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_json_logging(mut self, json_logging: bool) -> Self {
        self.json_logging = json_logging;
        self
    }

    /// Start a reporter that renders the run's counters through `render`.
    ///
    /// The final report is left to the command, which writes it to its
    /// output rather than to the progress sink.
    pub(crate) fn start_reporter<F>(&self, render: F) -> Result<Option<ThrottledReporter>>
    where
        F: Fn(&ProgressSnapshot, Duration) -> String + Send + Sync + 'static,
    {
        let Some(progress) = self.progress.clone() else {
            return Ok(None);
        };

        let context = self.context.clone();
        let report: ReportFn = Arc::new(move |trigger: ReportTrigger| {
            if trigger != ReportTrigger::Final {
                progress(&render(&context.snapshot(), context.elapsed()));
            }
        });
        ThrottledReporter::new(&self.reporter_config, report).map(Some)
    }
}

/// Run one resolved command.
///
/// `storage` may be `None` only for the commands that never talk to the
/// provider (`parse-uri`, `make-uri`).
pub async fn run_command<W>(
    command: &CommandConfig,
    storage: Option<Storage>,
    env: &CommandEnv,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let result = match command {
        CommandConfig::ParseUri { uri } => parse_uri(uri, out).await.map(|_| ()),
        CommandConfig::MakeUri { bucket, key } => make_uri(bucket, key, out).await.map(|_| ()),
        CommandConfig::List(config) => list(required(storage)?, config, env, out).await.map(|_| ()),
        CommandConfig::Get(config) => get(required(storage)?, config, env, out).await.map(|_| ()),
        CommandConfig::Put(config) => put(required(storage)?, config, env, out).await.map(|_| ()),
        CommandConfig::Delete(config) => delete(required(storage)?, config, out).await,
        CommandConfig::Head(config) => head(required(storage)?, config, out).await,
        CommandConfig::Clean(config) => {
            let checker = SafetyChecker::new(config.dry_run, config.force, env.json_logging);
            clean(required(storage)?, config, env, &checker, out)
                .await
                .map(|_| ())
        }
        CommandConfig::Size(config) => size(required(storage)?, config, env, out).await.map(|_| ()),
        CommandConfig::Scan(config) => scan(required(storage)?, config, env, out).await.map(|_| ()),
        CommandConfig::Sample(config) => sample(required(storage)?, config, env, out).await.map(|_| ()),
        CommandConfig::ListMultipart(config) => list_multipart(required(storage)?, config, env, out)
            .await
            .map(|_| ()),
    };

    // Flush whatever made it out, even on failure.
    let flushed = out.flush().await;
    result?;
    flushed.map_err(output_error)
}

fn required(storage: Option<Storage>) -> Result<Storage> {
    storage.ok_or_else(|| anyhow!("a storage client is required for this command."))
}
