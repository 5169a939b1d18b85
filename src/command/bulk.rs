//! Prefix-wide commands: `clean`, `size` and `scan`.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::AsyncWrite;

use crate::config::{CleanConfig, ScanConfig, SizeConfig};
use crate::deleter::{AuditSink, BatchDeleter, DeleteOptions, DeletionSummary};
use crate::filters::KeyRegexFilter;
use crate::lister::{ListingOptions, ObjectWalker};
use crate::locator::ResourceLocation;
use crate::reporter::ThrottledReporter;
use crate::safety::{DECLINED_MESSAGE, SafetyChecker, clean_question};
use crate::storage::Storage;
use crate::transfer::{ScanSummary, StreamingTransfer, scan_objects};
use crate::types::error::is_cancelled_error;
use crate::types::record::NdjsonWriter;
use crate::types::{ProgressCounters, ProgressSnapshot};

use super::CommandEnv;
use super::output::{count, elapsed, pretty_bytes, write_line};

const DRY_RUN_PREFIX: &str = "[Dry-Run] ";

pub(super) fn walker_for(storage: Storage, location: &ResourceLocation, env: &CommandEnv) -> ObjectWalker {
    ObjectWalker::new(
        storage,
        ListingOptions::with_prefix(location.prefix()),
        env.context.clone(),
    )
}

pub(super) fn matching(filter: &KeyRegexFilter) -> String {
    filter
        .pattern()
        .map(|pattern| format!(" matching regex {pattern}"))
        .unwrap_or_default()
}

/// `{count} of {scanned} keys => {size} ({bytes} bytes) in {time} [{last key}]`
fn volume_report(counted: u64, snapshot: &ProgressSnapshot, bytes: u64, duration: Duration) -> String {
    format!(
        "{} of {} keys => {} ({} bytes) in {} [{}]",
        count(counted),
        count(snapshot.scanned),
        pretty_bytes(bytes),
        count(bytes),
        elapsed(duration),
        snapshot.last_key.as_deref().unwrap_or_default(),
    )
}

fn clean_report(dry_run: bool, snapshot: &ProgressSnapshot, duration: Duration) -> String {
    let prefix = if dry_run { DRY_RUN_PREFIX } else { "" };
    format!(
        "{prefix}Deleted {}",
        volume_report(snapshot.deleted, snapshot, snapshot.bytes, duration)
    )
}

/// Delete every key under a prefix (optionally filtered by regex) in
/// batches, after confirmation.
///
/// A declined confirmation prints the decline message and returns the
/// `Cancelled` error, as does ctrl-c during the walk (the pending batch is
/// dropped and no final line is printed). Per-key rejections are reported after the final
/// line as a `PartialDelete` error.
pub async fn clean<W>(
    storage: Storage,
    config: &CleanConfig,
    env: &CommandEnv,
    checker: &SafetyChecker,
    out: &mut W,
) -> Result<DeletionSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let filter = KeyRegexFilter::new(config.key_regex.clone());
    let uri = config.location.uri();
    let dry_run = env.context.is_dry_run();

    if let Err(e) = checker.check_before_deletion(&clean_question(&uri, filter.pattern().as_deref())) {
        if is_cancelled_error(&e) {
            write_line(out, DECLINED_MESSAGE).await?;
        }
        return Err(e);
    }

    let prefix = if dry_run { DRY_RUN_PREFIX } else { "" };
    write_line(out, format!("{prefix}Deleting keys at {uri}{} ...", matching(&filter))).await?;

    let mut deleter = BatchDeleter::new(
        storage.clone(),
        env.context.clone(),
        DeleteOptions {
            filter,
            batch_size: config.batch_size,
            verbose_keys: config.verbose_keys,
        },
    );
    if let Some(path) = &config.output {
        let file = File::create(path)
            .await
            .with_context(|| format!("failed to create {}.", path.display()))?;
        let file: Box<dyn AsyncWrite + Unpin + Send> = Box::new(file);
        let sink: AuditSink = NdjsonWriter::new(file);
        deleter = deleter.with_audit(sink);
    }

    let mut walker = walker_for(storage, &config.location, env);
    let reporter = env.start_reporter(move |snapshot, duration| clean_report(dry_run, snapshot, duration))?;
    let result = deleter.run(&mut walker, reporter.as_ref()).await;
    if let Some(reporter) = &reporter {
        reporter.halt();
    }
    let summary = result?;
    env.context.check_cancelled()?;

    write_line(
        out,
        clean_report(dry_run, &env.context.snapshot(), env.context.elapsed()),
    )
    .await?;
    for failure in &summary.failed {
        write_line(
            out,
            format!("[FAILED] {} {}: {}", failure.key, failure.code, failure.message),
        )
        .await?;
    }

    summary.into_result()
}

/// Count the objects and bytes under a prefix.
pub async fn size<W>(
    storage: Storage,
    config: &SizeConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<ScanSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let filter = KeyRegexFilter::new(config.key_regex.clone());
    let mut walker = walker_for(storage, &config.location, env);
    let reporter = env.start_reporter(|snapshot, duration| {
        volume_report(snapshot.matched, snapshot, snapshot.bytes, duration)
    })?;

    let result = count_objects(&mut walker, &filter, config.verbose_keys, env, out, reporter.as_ref()).await;
    if let Some(reporter) = &reporter {
        reporter.halt();
    }
    let summary = result?;
    env.context.check_cancelled()?;

    write_line(
        out,
        volume_report(summary.matched, &env.context.snapshot(), summary.bytes, env.context.elapsed()),
    )
    .await?;
    Ok(summary)
}

async fn count_objects<W>(
    walker: &mut ObjectWalker,
    filter: &KeyRegexFilter,
    verbose_keys: bool,
    env: &CommandEnv,
    out: &mut W,
    reporter: Option<&ThrottledReporter>,
) -> Result<ScanSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let counters = env.context.counters();
    let mut summary = ScanSummary::default();

    while let Some(object) = walker.next_object().await? {
        summary.scanned += 1;
        ProgressCounters::add(&counters.scanned, 1);

        let counted = filter.is_match(&object.key)?;
        if counted {
            summary.matched += 1;
            summary.bytes += object.size;
            ProgressCounters::add(&counters.matched, 1);
            ProgressCounters::add(&counters.bytes, object.size);
            counters.set_last_key(&object.key);
            summary.last_key = Some(object.key.clone());
        }

        if verbose_keys {
            let tag = if counted { "COUNTED" } else { "FILTERED" };
            write_line(out, format!("[{tag}] {} {}", object.key, object.size)).await?;
        }
        if let Some(reporter) = reporter {
            reporter.schedule();
        }
    }

    Ok(summary)
}

/// Stream the content of every matching object under a prefix into `out`.
///
/// Progress and the final report go to the progress sink, never to `out`.
pub async fn scan<W>(
    storage: Storage,
    config: &ScanConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<ScanSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let filter = KeyRegexFilter::new(config.key_regex.clone());
    if let Some(progress) = &env.progress {
        progress(&format!(
            "Scanning object content at {}{}",
            config.location.uri(),
            matching(&filter)
        ));
    }

    let mut walker = walker_for(storage.clone(), &config.location, env);
    let transfer = StreamingTransfer::new(env.context.clone()).with_stdout_sink(true);
    let reporter = env.start_reporter(scan_report)?;

    let result = scan_objects(
        &storage,
        &mut walker,
        &filter,
        config.gunzip,
        &transfer,
        out,
        reporter.as_ref(),
    )
    .await;
    if let Some(reporter) = &reporter {
        reporter.halt();
    }
    let summary = result?;
    env.context.check_cancelled()?;

    if let Some(progress) = &env.progress {
        progress(&scan_report(&env.context.snapshot(), env.context.elapsed()));
    }
    Ok(summary)
}

fn scan_report(snapshot: &ProgressSnapshot, duration: Duration) -> String {
    format!(
        "Scanned {} of {} keys => {} in {} [{}]",
        count(snapshot.matched),
        count(snapshot.scanned),
        pretty_bytes(snapshot.bytes),
        elapsed(duration),
        snapshot.last_key.as_deref().unwrap_or_default(),
    )
}
