//! NDJSON audit/export records.
//!
//! `clean --output` writes one [`ObjectRecord`] per matched key and
//! `list-multipart --output` writes one [`MultipartUploadRecord`] per upload.

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::locator::format_uri;
use crate::types::{MultipartUploadDescriptor, ObjectDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordAction {
    Deleted,
    DryRun,
    Failed,
    Counted,
    Listed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectRecord<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub uri: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub action: RecordAction,
}

impl<'a> ObjectRecord<'a> {
    pub fn new(bucket: &'a str, object: &'a ObjectDescriptor, action: RecordAction) -> Self {
        Self {
            bucket,
            key: &object.key,
            uri: format_uri(bucket, &object.key),
            size: object.size,
            last_modified: object.last_modified.map(|t| t.to_rfc3339()),
            action,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MultipartUploadRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub bucket: &'a str,
    pub key: &'a str,
    pub uri: String,
    pub upload_id: &'a str,
}

impl<'a> MultipartUploadRecord<'a> {
    pub fn new(bucket: &'a str, upload: &'a MultipartUploadDescriptor) -> Self {
        Self {
            timestamp: upload.initiated.map(|t| t.to_rfc3339()),
            bucket,
            key: &upload.key,
            uri: format_uri(bucket, &upload.key),
            upload_id: &upload.upload_id,
        }
    }
}

/// Buffered newline-delimited JSON sink.
pub struct NdjsonWriter<W: AsyncWrite + Unpin + Send> {
    inner: BufWriter<W>,
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> NdjsonWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            inner: BufWriter::new(sink),
            written: 0,
        }
    }

    pub async fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("serde_json::to_vec() failed.")?;
        line.push(b'\n');
        self.inner
            .write_all(&line)
            .await
            .context("failed to write NDJSON record.")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush buffered records and return the number written.
    pub async fn finish(mut self) -> Result<u64> {
        self.inner
            .flush()
            .await
            .context("failed to flush NDJSON output.")?;
        Ok(self.written)
    }
}
