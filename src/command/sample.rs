//! `sample`: count the typed key paths of NDJSON records under a prefix.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWrite;

use crate::config::SampleConfig;
use crate::filters::KeyRegexFilter;
use crate::lister::ObjectWalker;
use crate::reporter::ThrottledReporter;
use crate::sampler::{KEYS_FILTERED, KEYS_SAMPLED, RecordSampler, SampleMetrics};
use crate::storage::Storage;
use crate::transfer::{ScanSummary, StreamingTransfer, fetch_object};
use crate::types::{ProgressCounters, ProgressSnapshot};

use super::CommandEnv;
use super::bulk::{matching, walker_for};
use super::output::{count, elapsed, write_line};

/// Walk every matching object under a prefix, parse its lines as JSON and
/// count the type found at each key path.
///
/// Objects are always fetched with gzip detection. Progress reports carry
/// the metrics gathered so far; the final metrics go to `out` as sorted JSON.
pub async fn sample<W>(
    storage: Storage,
    config: &SampleConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<ScanSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let filter = KeyRegexFilter::new(config.key_regex.clone());
    write_line(
        out,
        format!(
            "Sampling records at {}{} to depth {}",
            config.location.uri(),
            matching(&filter),
            config.options.depth
        ),
    )
    .await?;

    let metrics = Arc::new(Mutex::new(SampleMetrics::new()));
    let mut sampler = RecordSampler::new(config.options.clone(), Arc::clone(&metrics));
    let mut walker = walker_for(storage.clone(), &config.location, env);
    let transfer = StreamingTransfer::new(env.context.clone());

    let shared = Arc::clone(&metrics);
    let reporter = env.start_reporter(move |snapshot, duration| sample_report(&shared, snapshot, duration))?;

    let result = sample_objects(
        &storage,
        &mut walker,
        &filter,
        config.verbose_keys,
        &transfer,
        &mut sampler,
        out,
        reporter.as_ref(),
    )
    .await;
    if let Some(reporter) = &reporter {
        reporter.halt();
    }
    let summary = result?;
    env.context.check_cancelled()?;

    write_line(
        out,
        sample_report(&metrics, &env.context.snapshot(), env.context.elapsed()),
    )
    .await?;
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
async fn sample_objects<W>(
    storage: &Storage,
    walker: &mut ObjectWalker,
    filter: &KeyRegexFilter,
    verbose_keys: bool,
    transfer: &StreamingTransfer,
    sampler: &mut RecordSampler,
    out: &mut W,
    reporter: Option<&ThrottledReporter>,
) -> Result<ScanSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let counters = transfer.context().counters();
    let mut summary = ScanSummary::default();

    while let Some(object) = walker.next_object().await? {
        summary.scanned += 1;

        let sampled = filter.is_match(&object.key)?;
        if verbose_keys {
            let tag = if sampled { "SAMPLED" } else { "FILTERED" };
            write_line(out, format!("[{tag}] {}", object.key)).await?;
        }

        if sampled {
            sampler.count(KEYS_SAMPLED);
            let session = fetch_object(storage, &object.key, None, true, transfer, sampler)
                .await
                .with_context(|| format!("failed to sample {}.", object.key))?;
            sampler.finish_object();

            summary.matched += 1;
            summary.bytes += session.bytes_transferred;
            summary.last_key = Some(object.key.clone());
            ProgressCounters::add(&counters.matched, 1);
        } else {
            sampler.count(KEYS_FILTERED);
        }

        ProgressCounters::add(&counters.scanned, 1);
        counters.set_last_key(&object.key);
        if let Some(reporter) = reporter {
            reporter.schedule();
        }
    }

    Ok(summary)
}

/// `{elapsed} elapsed [last-key => {key}]` followed by the metrics as
/// pretty-printed JSON.
fn sample_report(metrics: &Mutex<SampleMetrics>, snapshot: &ProgressSnapshot, duration: Duration) -> String {
    let metrics = metrics.lock().unwrap_or_else(PoisonError::into_inner);
    format!(
        "{} elapsed [last-key => {}] {} of {} keys sampled\n{}",
        elapsed(duration),
        snapshot.last_key.as_deref().unwrap_or_default(),
        count(snapshot.matched),
        count(snapshot.scanned),
        serde_json::to_string_pretty(&*metrics).unwrap_or_default(),
    )
}
