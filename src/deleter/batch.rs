//! One DeleteObjects request worth of keys.

use std::collections::HashMap;

use anyhow::{Context, Result};
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::types::ObjectIdentifier;
use tracing::warn;

use crate::types::ObjectDescriptor;

use super::FailedKey;

/// Maximum objects per batch DeleteObjects API call (S3 limit).
pub const MAX_BATCH_SIZE: usize = 1000;

/// Keys accumulated for a single DeleteObjects call, in walk order.
#[derive(Debug, Clone)]
pub struct DeletionBatch {
    objects: Vec<ObjectDescriptor>,
    capacity: usize,
    dry_run: bool,
}

impl DeletionBatch {
    /// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(batch_size: usize, dry_run: bool) -> Self {
        let capacity = batch_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            objects: Vec::with_capacity(capacity),
            capacity,
            dry_run,
        }
    }

    pub fn push(&mut self, object: ObjectDescriptor) {
        self.objects.push(object);
    }

    pub fn is_full(&self) -> bool {
        self.objects.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }

    pub fn identifiers(&self) -> Result<Vec<ObjectIdentifier>> {
        self.objects
            .iter()
            .map(|object| {
                ObjectIdentifier::builder()
                    .key(&object.key)
                    .build()
                    .context("aws_sdk_s3::types::ObjectIdentifier::build() failed.")
            })
            .collect()
    }

    /// Empty the batch, keeping its capacity and mode.
    pub fn take(&mut self) -> Vec<ObjectDescriptor> {
        std::mem::replace(&mut self.objects, Vec::with_capacity(self.capacity))
    }
}

/// Split a batch into deleted objects and per-key failures.
///
/// S3 may omit successful keys from `Deleted` (quiet mode), so every key
/// without an entry in `Errors` counts as deleted.
pub fn partition_response(
    objects: Vec<ObjectDescriptor>,
    response: &DeleteObjectsOutput,
) -> (Vec<ObjectDescriptor>, Vec<FailedKey>) {
    let mut errors: HashMap<&str, (&str, &str)> = HashMap::new();
    for err in response.errors() {
        errors.insert(
            err.key().unwrap_or_default(),
            (
                err.code().unwrap_or("unknown"),
                err.message().unwrap_or("no message"),
            ),
        );
    }

    let mut deleted = Vec::with_capacity(objects.len());
    let mut failed = Vec::new();
    for object in objects {
        match errors.get(object.key.as_str()) {
            Some((code, message)) => {
                warn!(
                    key = object.key,
                    code = code,
                    message = message,
                    "S3 DeleteObjects partial failure for key '{}': {} ({}).",
                    object.key,
                    code,
                    message,
                );
                failed.push(FailedKey {
                    key: object.key,
                    code: code.to_string(),
                    message: message.to_string(),
                });
            }
            None => deleted.push(object),
        }
    }

    (deleted, failed)
}
