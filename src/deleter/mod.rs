//! Batch mutator behind `clean`.
//!
//! [`BatchDeleter`] pulls objects from an [`ObjectWalker`], filters them by
//! key regex, and deletes the matches with one DeleteObjects call per batch
//! of at most 1000 keys. Only one batch is ever in flight. Dry-run updates the
//! same counters without issuing any call.

use anyhow::{Context, Result, anyhow};
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::filters::KeyRegexFilter;
use crate::lister::ObjectWalker;
use crate::reporter::ThrottledReporter;
use crate::storage::Storage;
use crate::types::error::S3tkError;
use crate::types::record::{NdjsonWriter, ObjectRecord, RecordAction};
use crate::types::{ObjectDescriptor, ProgressCounters, RunContext};

pub mod batch;

pub use batch::{DeletionBatch, MAX_BATCH_SIZE};

/// NDJSON sink for one record per matched key (`clean --output`).
pub type AuditSink = NdjsonWriter<Box<dyn AsyncWrite + Unpin + Send>>;

/// A key the provider refused to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedKey {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Outcome of a clean run. In dry-run, `deleted` and `bytes` are what would
/// have been deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub scanned: u64,
    pub matched: u64,
    pub deleted: u64,
    pub bytes: u64,
    pub delete_requests: u64,
    pub failed: Vec<FailedKey>,
    pub dry_run: bool,
}

impl DeletionSummary {
    /// `Err(PartialDelete)` when any key was rejected.
    pub fn into_result(self) -> Result<Self> {
        if self.failed.is_empty() {
            return Ok(self);
        }
        Err(anyhow!(S3tkError::PartialDelete {
            deleted: self.deleted,
            failed: self.failed.len() as u64,
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub filter: KeyRegexFilter,
    pub batch_size: usize,
    pub verbose_keys: bool,
}

pub struct BatchDeleter {
    storage: Storage,
    context: RunContext,
    options: DeleteOptions,
    audit: Option<AuditSink>,
}

impl BatchDeleter {
    pub fn new(storage: Storage, context: RunContext, options: DeleteOptions) -> Self {
        Self {
            storage,
            context,
            options,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Drain the walker. A rejected key is recorded and the run continues;
    /// a failed DeleteObjects request ends the run with an error.
    pub async fn run(
        mut self,
        walker: &mut ObjectWalker,
        reporter: Option<&ThrottledReporter>,
    ) -> Result<DeletionSummary> {
        let dry_run = self.context.is_dry_run();
        let mut summary = DeletionSummary {
            dry_run,
            ..Default::default()
        };
        let mut batch = DeletionBatch::new(self.options.batch_size, dry_run);

        debug!(
            batch_size = batch.capacity(),
            dry_run = dry_run,
            "delete worker started."
        );

        while let Some(object) = walker.next_object().await? {
            let counters = self.context.counters();
            summary.scanned += 1;
            ProgressCounters::add(&counters.scanned, 1);
            counters.set_last_key(&object.key);

            if self.options.filter.is_match(&object.key)? {
                summary.matched += 1;
                ProgressCounters::add(&counters.matched, 1);
                batch.push(object);

                if batch.is_full() {
                    self.flush(&mut batch, &mut summary).await?;
                }
            } else if self.options.verbose_keys {
                info!("[FILTERED] {}", object.key);
            }

            if let Some(reporter) = reporter {
                reporter.schedule();
            }
        }

        if self.context.is_cancelled() {
            info!(
                pending = batch.len(),
                "delete worker has been cancelled."
            );
        } else if !batch.is_empty() {
            self.flush(&mut batch, &mut summary).await?;
        }

        if let Some(audit) = self.audit.take() {
            audit.finish().await?;
        }

        debug!(
            scanned = summary.scanned,
            matched = summary.matched,
            deleted = summary.deleted,
            failed = summary.failed.len(),
            "delete worker has been completed."
        );

        Ok(summary)
    }

    async fn flush(&mut self, batch: &mut DeletionBatch, summary: &mut DeletionSummary) -> Result<()> {
        let (deleted, failed) = if batch.is_dry_run() {
            (batch.take(), Vec::new())
        } else {
            let identifiers = batch.identifiers()?;
            debug!(
                batch_size = identifiers.len(),
                "sending DeleteObjects batch request."
            );

            let response = self
                .storage
                .delete_objects(identifiers)
                .await
                .with_context(|| format!("DeleteObjects request of {} keys failed.", batch.len()))?;
            summary.delete_requests += 1;

            batch::partition_response(batch.take(), &response)
        };

        let counters = self.context.counters();
        let bytes: u64 = deleted.iter().map(|o| o.size).sum();
        summary.deleted += deleted.len() as u64;
        summary.bytes += bytes;
        ProgressCounters::add(&counters.deleted, deleted.len() as u64);
        ProgressCounters::add(&counters.bytes, bytes);
        ProgressCounters::add(&counters.failed, failed.len() as u64);

        let action = if batch.is_dry_run() {
            RecordAction::DryRun
        } else {
            RecordAction::Deleted
        };
        for object in &deleted {
            if self.options.verbose_keys {
                let prefix = if batch.is_dry_run() { "[Dry-Run] " } else { "" };
                info!("{prefix}[DELETED] {} {}", object.key, object.size);
            }
            self.write_record(object, action).await?;
        }
        for failure in &failed {
            let object = ObjectDescriptor::new(failure.key.clone(), 0);
            self.write_record(&object, RecordAction::Failed).await?;
        }

        debug!(
            deleted = deleted.len(),
            failed = failed.len(),
            "DeleteObjects batch completed."
        );

        summary.failed.extend(failed);
        Ok(())
    }

    async fn write_record(&mut self, object: &ObjectDescriptor, action: RecordAction) -> Result<()> {
        if let Some(audit) = self.audit.as_mut() {
            audit
                .write(&ObjectRecord::new(self.storage.bucket(), object, action))
                .await?;
        }
        Ok(())
    }
}
