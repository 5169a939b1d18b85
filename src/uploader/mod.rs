//! Multipart upload coordinator behind `put`.
//!
//! The source is cut into fully buffered parts of `part_size` bytes. A
//! semaphore with `queue_size` permits bounds the parts that are buffered but
//! not yet acknowledged: the reader takes a permit before reading the next
//! part, so a full queue pauses the source. Parts upload concurrently in a
//! `JoinSet`; the commit is issued only after every part succeeded.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use aws_sdk_s3::types::CompletedPart;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_PART_SIZE, DEFAULT_QUEUE_SIZE};
use crate::locator::format_uri;
use crate::reporter::ThrottledReporter;
use crate::storage::Storage;
use crate::types::error::S3tkError;
use crate::types::{ProgressCounters, RunContext};

pub mod options;

pub use options::PutOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStatus {
    Pending,
    Uploading,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    /// 1-based part number.
    pub index: i32,
    pub size: usize,
    pub status: PartStatus,
    pub e_tag: Option<String>,
}

/// Parts of one upload with the ETags the provider issued for them.
#[derive(Debug, Clone, Default)]
pub struct UploadManifest {
    parts: Vec<UploadPart>,
}

impl UploadManifest {
    pub fn add(&mut self, index: i32, size: usize) {
        self.parts.push(UploadPart {
            index,
            size,
            status: PartStatus::Pending,
            e_tag: None,
        });
    }

    pub fn mark_uploading(&mut self, index: i32) {
        if let Some(part) = self.part_mut(index) {
            part.status = PartStatus::Uploading;
        }
    }

    pub fn mark_complete(&mut self, index: i32, e_tag: String) {
        if let Some(part) = self.part_mut(index) {
            part.status = PartStatus::Complete;
            part.e_tag = Some(e_tag);
        }
    }

    pub fn mark_failed(&mut self, index: i32) {
        if let Some(part) = self.part_mut(index) {
            part.status = PartStatus::Failed;
        }
    }

    pub fn parts(&self) -> &[UploadPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.size as u64).sum()
    }

    /// Every part complete and numbered 1..=n once sorted.
    pub fn is_complete(&self) -> bool {
        let mut indices: Vec<i32> = self.parts.iter().map(|p| p.index).collect();
        indices.sort_unstable();
        !self.parts.is_empty()
            && self.parts.iter().all(|p| p.status == PartStatus::Complete)
            && indices.iter().zip(1..).all(|(index, expected)| *index == expected)
    }

    /// The commit payload, ordered by part number.
    pub fn completed_parts(&mut self) -> Result<Vec<CompletedPart>> {
        if !self.is_complete() {
            return Err(anyhow!(
                "upload manifest is incomplete; refusing to commit."
            ));
        }
        self.parts.sort_by_key(|p| p.index);
        Ok(self
            .parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.index)
                    .set_e_tag(p.e_tag.clone())
                    .build()
            })
            .collect())
    }

    fn part_mut(&mut self, index: i32) -> Option<&mut UploadPart> {
        self.parts.iter_mut().find(|p| p.index == index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub upload_id: String,
    pub e_tag: Option<String>,
    pub parts: usize,
    pub bytes: u64,
}

type PartOutcome = (i32, usize, Result<String>);

pub struct MultipartUploader {
    storage: Storage,
    context: RunContext,
    options: PutOptions,
    part_size: usize,
    queue_size: usize,
}

impl MultipartUploader {
    pub fn new(storage: Storage, context: RunContext, options: PutOptions) -> Self {
        Self {
            storage,
            context,
            options,
            part_size: DEFAULT_PART_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    /// The 5 MiB provider minimum is enforced when arguments are parsed.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// Upload `source` to `key`. On any failure the provider-side upload is
    /// aborted and nothing is committed.
    pub async fn upload<R>(
        &self,
        key: &str,
        source: R,
        reporter: Option<&ThrottledReporter>,
    ) -> Result<UploadSummary>
    where
        R: AsyncRead + Unpin + Send,
    {
        let created = self
            .storage
            .create_multipart_upload(key, &self.options)
            .await
            .with_context(|| format!("failed to start upload to {}.", self.uri(key)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| anyhow!("CreateMultipartUpload returned no upload id."))?
            .to_string();

        debug!(
            key = key,
            upload_id = upload_id,
            part_size = self.part_size,
            queue_size = self.queue_size,
            "multipart upload started."
        );

        let result = self.commit(key, &upload_id, source, reporter).await;
        if let Err(e) = &result {
            warn!(key = key, upload_id = upload_id, error = format!("{e:#}"), "multipart upload failed.");
            self.abort(key, &upload_id).await;
        }
        result
    }

    async fn commit<R>(
        &self,
        key: &str,
        upload_id: &str,
        source: R,
        reporter: Option<&ThrottledReporter>,
    ) -> Result<UploadSummary>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut manifest = self.upload_parts(key, upload_id, source, reporter).await?;
        let parts = manifest.completed_parts()?;

        let output = self
            .storage
            .complete_multipart_upload(key, upload_id, parts)
            .await
            .with_context(|| format!("failed to complete upload to {}.", self.uri(key)))?;

        info!(
            key = key,
            upload_id = upload_id,
            parts = manifest.len(),
            bytes = manifest.total_bytes(),
            "multipart upload completed."
        );

        Ok(UploadSummary {
            upload_id: upload_id.to_string(),
            e_tag: output.e_tag().map(str::to_string),
            parts: manifest.len(),
            bytes: manifest.total_bytes(),
        })
    }

    async fn upload_parts<R>(
        &self,
        key: &str,
        upload_id: &str,
        mut source: R,
        reporter: Option<&ThrottledReporter>,
    ) -> Result<UploadManifest>
    where
        R: AsyncRead + Unpin + Send,
    {
        let semaphore = Arc::new(Semaphore::new(self.queue_size));
        // Dropping the set on an early return aborts the in-flight parts.
        let mut in_flight: JoinSet<PartOutcome> = JoinSet::new();
        let mut manifest = UploadManifest::default();
        let mut index = 0;

        loop {
            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        self.record(joined, &mut manifest, reporter)?;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        break permit.context("upload queue semaphore closed.")?;
                    }
                }
            };

            if self.context.is_cancelled() {
                return Err(anyhow!(S3tkError::Cancelled));
            }

            let part = read_part(&mut source, self.part_size).await?;
            // An empty source still yields one empty part.
            if part.is_empty() && index > 0 {
                break;
            }
            let last = part.len() < self.part_size;

            index += 1;
            let size = part.len();
            ProgressCounters::add(&self.context.counters().bytes_buffered, size as u64);
            manifest.add(index, size);
            manifest.mark_uploading(index);

            let storage = self.storage.clone();
            let context = self.context.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            in_flight.spawn(async move {
                let result = storage
                    .upload_part(&key, &upload_id, index, part.freeze())
                    .await
                    .and_then(|output| {
                        output
                            .e_tag()
                            .map(str::to_string)
                            .ok_or_else(|| anyhow!("UploadPart returned no ETag."))
                    });
                if result.is_ok() {
                    ProgressCounters::add(&context.counters().bytes_delivered, size as u64);
                }
                drop(permit);
                (index, size, result)
            });

            if last {
                break;
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            self.record(joined, &mut manifest, reporter)?;
        }

        Ok(manifest)
    }

    fn record(
        &self,
        joined: std::result::Result<PartOutcome, JoinError>,
        manifest: &mut UploadManifest,
        reporter: Option<&ThrottledReporter>,
    ) -> Result<()> {
        let (index, size, result) = joined.context("part upload task failed.")?;
        match result {
            Ok(e_tag) => {
                debug!(part_number = index, size = size, "part uploaded.");
                manifest.mark_complete(index, e_tag);
                if let Some(reporter) = reporter {
                    reporter.schedule();
                }
                Ok(())
            }
            Err(e) => {
                manifest.mark_failed(index);
                let message = format!("{e:#}");
                Err(e.context(S3tkError::UploadPart {
                    part_number: index,
                    message,
                }))
            }
        }
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        match self.storage.abort_multipart_upload(key, upload_id).await {
            Ok(_) => info!(key = key, upload_id = upload_id, "multipart upload aborted."),
            Err(e) => warn!(
                key = key,
                upload_id = upload_id,
                error = format!("{e:#}"),
                "failed to abort multipart upload."
            ),
        }
    }

    fn uri(&self, key: &str) -> String {
        format_uri(self.storage.bucket(), key)
    }
}

/// Read up to `part_size` bytes; fewer only at end of stream.
async fn read_part<R>(source: &mut R, part_size: usize) -> Result<BytesMut>
where
    R: AsyncRead + Unpin + Send,
{
    let mut part = BytesMut::with_capacity(part_size);
    while part.len() < part_size {
        let remaining = (part_size - part.len()) as u64;
        let read = AsyncReadExt::take(&mut *source, remaining)
            .read_buf(&mut part)
            .await
            .context(S3tkError::Transfer("failed to read upload source.".to_string()))?;
        if read == 0 {
            break;
        }
    }
    Ok(part)
}

#[cfg(test)]
mod tests;
