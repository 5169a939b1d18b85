//! GetObject helpers built on the streaming pipe (`get` and `scan`).

use anyhow::{Context, Result};
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::filters::KeyRegexFilter;
use crate::lister::ObjectWalker;
use crate::locator::format_uri;
use crate::reporter::ThrottledReporter;
use crate::storage::Storage;
use crate::types::error::S3tkError;
use crate::types::ProgressCounters;

use super::{ByteRange, Decoding, StreamingTransfer, TransferSession, is_gzip_encoding};

/// Stream one object into `sink`.
///
/// A gzip `Content-Encoding` is decoded unless a range was requested;
/// `gunzip` additionally sniffs for the gzip magic bytes.
pub async fn fetch_object<W>(
    storage: &Storage,
    key: &str,
    range: Option<ByteRange>,
    gunzip: bool,
    transfer: &StreamingTransfer,
    sink: &mut W,
) -> Result<TransferSession>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let output = storage.get_object(key, range).await.with_context(|| {
        S3tkError::Transfer(format!(
            "failed to fetch {}.",
            format_uri(storage.bucket(), key)
        ))
    })?;

    let decoding = choose_decoding(output.content_encoding(), range.is_some(), gunzip);
    debug!(
        key = key,
        range = range.map(|r| r.to_header()),
        decoding = ?decoding,
        "object fetch started."
    );

    let body = Box::pin(output.body.into_async_read());
    transfer.run(body, sink, decoding).await
}

fn choose_decoding(content_encoding: Option<&str>, ranged: bool, gunzip: bool) -> Decoding {
    if !ranged && is_gzip_encoding(content_encoding) {
        Decoding::Gzip
    } else if gunzip {
        Decoding::Detect
    } else {
        Decoding::Identity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: u64,
    pub matched: u64,
    pub bytes: u64,
    pub last_key: Option<String>,
}

/// Stream every matching object under the walker's prefix into `sink`, one
/// after the other. Stops quietly when stdout is closed.
pub async fn scan_objects<W>(
    storage: &Storage,
    walker: &mut ObjectWalker,
    filter: &KeyRegexFilter,
    gunzip: bool,
    transfer: &StreamingTransfer,
    sink: &mut W,
    reporter: Option<&ThrottledReporter>,
) -> Result<ScanSummary>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut summary = ScanSummary::default();

    while let Some(object) = walker.next_object().await? {
        summary.scanned += 1;

        let matched = filter.is_match(&object.key)?;
        let mut ended_early = false;
        if matched {
            summary.matched += 1;
            let session = fetch_object(storage, &object.key, None, gunzip, transfer, sink).await?;
            summary.bytes += session.bytes_transferred;
            summary.last_key = Some(object.key.clone());
            ended_early = session.ended_early;
        }

        // Counted after the fetch so the report names a finished key.
        let counters = transfer.context().counters();
        ProgressCounters::add(&counters.scanned, 1);
        if matched {
            ProgressCounters::add(&counters.matched, 1);
        }
        counters.set_last_key(&object.key);

        if ended_early {
            info!(key = object.key, "output closed, scan stopped.");
            break;
        }
        if let Some(reporter) = reporter {
            reporter.schedule();
        }
    }

    Ok(summary)
}
