//! `list` and `list-multipart`.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tokio::fs::File;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::config::{ListConfig, ListFormat, ListMultipartConfig};
use crate::lister::{ListingOptions, MultipartUploadWalker, ObjectWalker, list_upload_parts};
use crate::storage::Storage;
use crate::types::error::S3tkError;
use crate::types::record::{MultipartUploadRecord, NdjsonWriter};
use crate::types::{ListingEntry, MultipartUploadDescriptor, ObjectDescriptor, ProgressCounters};

use super::CommandEnv;
use super::output::{count, elapsed, pad_left, pretty_bytes, timestamp, write_line};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSummary {
    pub prefixes: u64,
    pub keys: u64,
    /// The listing stopped at the limit while more keys remained.
    pub partial: bool,
}

/// List keys and common prefixes, one line each, up to the configured limit.
pub async fn list<W>(
    storage: Storage,
    config: &ListConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<ListSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let bucket = storage.bucket().to_string();
    let options = ListingOptions {
        prefix: config.location.key.clone(),
        delimiter: config.delimiter.clone(),
        start_after: config.start_after.clone(),
        limit: config.limit,
        ..Default::default()
    };
    let mut walker = ObjectWalker::new(storage, options, env.context.clone());
    let mut summary = ListSummary::default();

    while let Some(page) = walker.next_page().await? {
        let size_width = page
            .iter()
            .filter_map(ListingEntry::as_object)
            .map(|object| object.size.to_string().len())
            .max()
            .unwrap_or(1);

        for entry in &page {
            let line = match entry {
                ListingEntry::CommonPrefix(prefix) => {
                    summary.prefixes += 1;
                    format_prefix(config.format, &bucket, prefix)
                }
                ListingEntry::Object(object) => {
                    summary.keys += 1;
                    format_object(config.format, &bucket, object, size_width)
                }
            };
            write_line(out, line).await?;
        }
    }
    env.context.check_cancelled()?;
    summary.partial = walker.is_partial();

    if summary.prefixes > 0 {
        write_line(out, format!("Listed {} common prefixes.", count(summary.prefixes))).await?;
    }
    let (all, partial) = if summary.partial {
        ("", " (partial listing)")
    } else {
        ("all ", "")
    };
    write_line(
        out,
        format!("Listed {all}{} matching keys{partial}.", count(summary.keys)),
    )
    .await?;

    debug!(
        pages = walker.cursor().pages_fetched,
        keys = summary.keys,
        prefixes = summary.prefixes,
        "listing completed."
    );
    Ok(summary)
}

fn format_prefix(format: ListFormat, bucket: &str, prefix: &str) -> String {
    match format {
        ListFormat::Key => format!("  {prefix}"),
        ListFormat::BucketKey => format!("  {bucket} {prefix}"),
        ListFormat::Url => format!("  s3://{bucket}/{prefix}"),
    }
}

fn format_object(format: ListFormat, bucket: &str, object: &ObjectDescriptor, size_width: usize) -> String {
    let text = match format {
        ListFormat::Key => object.key.clone(),
        ListFormat::BucketKey => format!("{bucket} {}", object.key),
        ListFormat::Url => format!("s3://{bucket}/{}", object.key),
    };
    format!(
        "  [{} | {}] {text}",
        timestamp(object.last_modified.as_ref()),
        pad_left(size_width, &object.size.to_string()),
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartListSummary {
    pub uploads: u64,
    pub pages: u64,
    /// More uploads remained when the limit was reached.
    pub more: bool,
    /// Records written to the NDJSON file, when one was requested.
    pub records_written: Option<u64>,
}

/// List incomplete multipart uploads, optionally exporting them as NDJSON.
///
/// With `verbose_keys` each upload is printed with its age and the parts it
/// holds so far.
pub async fn list_multipart<W>(
    storage: Storage,
    config: &ListMultipartConfig,
    env: &CommandEnv,
    out: &mut W,
) -> Result<MultipartListSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let bucket = storage.bucket().to_string();
    let prefix = config.location.key.clone();
    let with_prefix = match &prefix {
        Some(prefix) => format!(" with prefix {prefix}"),
        None => String::new(),
    };
    write_line(
        out,
        format!("Listing incomplete multi-part uploads in bucket {bucket}{with_prefix}"),
    )
    .await?;

    let mut records = match &config.file {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("failed to create {}.", path.display()))?;
            Some(NdjsonWriter::new(file))
        }
        None => None,
    };

    let options = ListingOptions {
        prefix,
        delimiter: config.delimiter.clone(),
        page_size: config.page_size,
        limit: config.limit,
        ..Default::default()
    };
    let mut walker = MultipartUploadWalker::new(storage.clone(), options, env.context.clone());
    let reporter = env.start_reporter(|snapshot, duration| {
        format!(
            "{} found {} ({})",
            count(snapshot.scanned),
            scan_count(snapshot.pages),
            elapsed(duration)
        )
    })?;

    let mut summary = MultipartListSummary::default();
    while let Some(page) = walker.next_page().await? {
        for upload in &page {
            summary.uploads += 1;
            ProgressCounters::add(&env.context.counters().scanned, 1);

            if config.verbose_keys {
                write_line(out, describe_upload(&storage, &bucket, upload).await?).await?;
            }
            if let Some(records) = records.as_mut() {
                records.write(&MultipartUploadRecord::new(&bucket, upload)).await?;
            }
        }
        if let Some(reporter) = &reporter {
            reporter.schedule();
        }
    }
    if let Some(reporter) = &reporter {
        reporter.halt();
    }
    if env.context.is_cancelled() {
        // Keep what was exported before ctrl-c.
        if let Some(records) = records {
            records.finish().await?;
        }
        return Err(anyhow!(S3tkError::Cancelled));
    }

    summary.pages = walker.cursor().pages_fetched;
    summary.more = walker.is_partial();

    if summary.more {
        write_line(out, format!("Listed {} entries (more available).", count(summary.uploads))).await?;
    } else {
        write_line(out, format!("All {} entries listed.", count(summary.uploads))).await?;
    }

    if let (Some(records), Some(path)) = (records, &config.file) {
        let written = records.finish().await?;
        write_line(out, format!("Wrote {} records to {}", count(written), path.display())).await?;
        summary.records_written = Some(written);
    }

    info!(
        uploads = summary.uploads,
        pages = summary.pages,
        more = summary.more,
        "multipart upload listing completed."
    );
    Ok(summary)
}

fn scan_count(pages: u64) -> String {
    let preposition = if pages < 2 { "in" } else { "across" };
    let noun = if pages == 1 { "scan" } else { "scans" };
    format!("{preposition} {pages} {noun}")
}

async fn describe_upload(
    storage: &Storage,
    bucket: &str,
    upload: &MultipartUploadDescriptor,
) -> Result<String> {
    let parts = list_upload_parts(storage, &upload.key, &upload.upload_id).await?;
    let bytes: u64 = parts
        .iter()
        .map(|part| part.size().unwrap_or_default().max(0) as u64)
        .sum();
    let age = upload
        .initiated
        .map(|initiated| {
            let age = Utc::now().signed_duration_since(initiated);
            format!("{}h", age.num_hours())
        })
        .unwrap_or_else(|| "?".to_string());

    Ok(format!(
        "{} ({age}) s3://{bucket}/{} [{} parts, {}] {}",
        timestamp(upload.initiated.as_ref()),
        upload.key,
        parts.len(),
        pretty_bytes(bytes),
        upload.upload_id,
    ))
}
