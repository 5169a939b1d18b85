//! Pagination cursor walkers.
//!
//! [`ObjectWalker`] turns ListObjectsV2 pages into a lazy, forward-only
//! sequence of [`ListingEntry`] values. [`MultipartUploadWalker`] does the
//! same for incomplete multipart uploads. Neither retries: a failed page is
//! an [`S3tkError::Enumeration`] error and ends the walk.

use std::collections::VecDeque;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use aws_sdk_s3::types::Part;
use tracing::{debug, info, trace};

use crate::config::MAX_PAGE_SIZE;
use crate::locator::format_uri;
use crate::storage::{ListMultipartUploadsRequest, ListObjectsRequest, Storage};
use crate::types::error::S3tkError;
use crate::types::{ListingEntry, MultipartUploadDescriptor, ObjectDescriptor, ProgressCounters, RunContext};

/// What to enumerate and how far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingOptions {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub start_after: Option<String>,
    /// Entries requested per page, clamped to 1..=1000.
    pub page_size: i32,
    /// Stop after this many entries (objects and common prefixes). `None` walks everything.
    pub limit: Option<u64>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        ListingOptions {
            prefix: None,
            delimiter: None,
            start_after: None,
            page_size: MAX_PAGE_SIZE,
            limit: None,
        }
    }
}

impl ListingOptions {
    pub fn with_prefix(prefix: &str) -> Self {
        ListingOptions {
            prefix: Some(prefix.to_string()).filter(|p| !p.is_empty()),
            ..Default::default()
        }
    }

    fn page_size(&self) -> i32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// Position of a walk. The token must advance (or disappear) on every page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationCursor {
    pub continuation_token: Option<String>,
    pub exhausted: bool,
    pub pages_fetched: u64,
    pub yielded: u64,
}

impl EnumerationCursor {
    fn remaining(&self, limit: Option<u64>) -> Option<u64> {
        limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    /// Accept the token of the page just fetched, or mark the walk finished.
    fn advance(&mut self, truncated: bool, next_token: Option<&str>) -> Result<()> {
        match (truncated, next_token) {
            (true, Some(token)) => {
                if self.continuation_token.as_deref() == Some(token) {
                    return Err(anyhow!(S3tkError::Enumeration(format!(
                        "continuation token did not advance after page {}.",
                        self.pages_fetched
                    ))));
                }
                self.continuation_token = Some(token.to_string());
            }
            _ => {
                self.continuation_token = None;
                self.exhausted = true;
            }
        }
        Ok(())
    }
}

pub struct ObjectWalker {
    storage: Storage,
    options: ListingOptions,
    context: RunContext,
    cursor: EnumerationCursor,
    buffer: VecDeque<ListingEntry>,
    last_key: Option<String>,
}

impl ObjectWalker {
    pub fn new(storage: Storage, options: ListingOptions, context: RunContext) -> Self {
        Self {
            storage,
            options,
            context,
            cursor: EnumerationCursor::default(),
            buffer: VecDeque::new(),
            last_key: None,
        }
    }

    pub fn cursor(&self) -> &EnumerationCursor {
        &self.cursor
    }

    /// True when the walk stopped at the limit while the provider had more.
    pub fn is_partial(&self) -> bool {
        self.cursor.continuation_token.is_some()
    }

    /// Fetch the next page. `Ok(None)` once the walk is exhausted, the limit
    /// is reached, or the run was cancelled.
    ///
    /// A truncated page may legitimately be empty; it is returned as an
    /// empty `Vec` and the walk continues with its token.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListingEntry>>> {
        if self.cursor.exhausted {
            return Ok(None);
        }
        if self.context.is_cancelled() {
            info!("Listing cancelled.");
            self.cursor.exhausted = true;
            return Ok(None);
        }

        let remaining = self.cursor.remaining(self.options.limit);
        if remaining == Some(0) {
            self.cursor.exhausted = true;
            return Ok(None);
        }

        let page_size = match remaining {
            Some(remaining) => (self.options.page_size() as u64).min(remaining) as i32,
            None => self.options.page_size(),
        };
        let request = ListObjectsRequest {
            prefix: self.options.prefix.clone(),
            delimiter: self.options.delimiter.clone(),
            start_after: self.options.start_after.clone(),
            continuation_token: self.cursor.continuation_token.clone(),
            max_keys: page_size,
        };

        let output = self.storage.list_objects(&request).await.with_context(|| {
            S3tkError::Enumeration(format!(
                "listing page {} of {} failed.",
                self.cursor.pages_fetched + 1,
                format_uri(self.storage.bucket(), self.options.prefix.as_deref().unwrap_or_default()),
            ))
        })?;

        self.cursor.pages_fetched += 1;
        ProgressCounters::add(&self.context.counters().pages, 1);

        let mut entries = merge_in_key_order(
            output.contents().iter().map(ObjectDescriptor::from),
            output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string)),
        );

        if let Some(last_key) = &self.last_key {
            entries.retain(|entry| entry.key() > last_key.as_str());
        }
        if let Some(remaining) = remaining {
            entries.truncate(remaining as usize);
        }
        if let Some(last) = entries.last() {
            self.last_key = Some(last.key().to_string());
        }
        self.cursor.yielded += entries.len() as u64;

        self.cursor.advance(
            output.is_truncated() == Some(true),
            output.next_continuation_token(),
        )?;
        if self.cursor.remaining(self.options.limit) == Some(0) {
            self.cursor.exhausted = true;
        }

        trace!(
            page = self.cursor.pages_fetched,
            entries = entries.len(),
            exhausted = self.cursor.exhausted,
            "listing page fetched."
        );

        Ok(Some(entries))
    }

    /// Pull the next entry, fetching pages as needed.
    pub async fn next_entry(&mut self) -> Result<Option<ListingEntry>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }
            match self.next_page().await? {
                Some(page) => self.buffer.extend(page),
                None => return Ok(None),
            }
        }
    }

    /// Pull the next object, skipping common prefixes.
    pub async fn next_object(&mut self) -> Result<Option<ObjectDescriptor>> {
        while let Some(entry) = self.next_entry().await? {
            if let ListingEntry::Object(object) = entry {
                return Ok(Some(object));
            }
        }
        Ok(None)
    }

    /// Drain the walk into a bounded channel. The channel capacity paces the
    /// walk; a closed receiver ends it without error.
    pub async fn send_to(&mut self, sender: &Sender<ListingEntry>) -> Result<u64> {
        debug!("listing has started.");

        let mut sent = 0;
        while let Some(entry) = self.next_entry().await? {
            if let Err(e) = sender
                .send(entry)
                .await
                .context("async_channel::Sender::send() failed.")
            {
                return if !sender.is_closed() { Err(e) } else { Ok(sent) };
            }
            sent += 1;
        }

        debug!(pages = self.cursor.pages_fetched, sent = sent, "listing has been completed.");
        Ok(sent)
    }
}

fn merge_in_key_order(
    objects: impl Iterator<Item = ObjectDescriptor>,
    prefixes: impl Iterator<Item = String>,
) -> Vec<ListingEntry> {
    let mut entries: Vec<ListingEntry> = objects
        .map(ListingEntry::Object)
        .chain(prefixes.map(ListingEntry::CommonPrefix))
        .collect();
    entries.sort_by(|a, b| a.key().cmp(b.key()));
    entries
}

/// Walks incomplete multipart uploads with the key-marker / upload-id-marker
/// protocol. Same limit, cancellation and error rules as [`ObjectWalker`].
pub struct MultipartUploadWalker {
    storage: Storage,
    options: ListingOptions,
    context: RunContext,
    markers: Option<(String, String)>,
    cursor: EnumerationCursor,
}

impl MultipartUploadWalker {
    pub fn new(storage: Storage, options: ListingOptions, context: RunContext) -> Self {
        Self {
            storage,
            options,
            context,
            markers: None,
            cursor: EnumerationCursor::default(),
        }
    }

    pub fn cursor(&self) -> &EnumerationCursor {
        &self.cursor
    }

    /// True when the walk stopped at the limit while the provider had more.
    pub fn is_partial(&self) -> bool {
        !self.cursor.exhausted || self.markers.is_some()
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<MultipartUploadDescriptor>>> {
        if self.cursor.exhausted {
            return Ok(None);
        }
        if self.context.is_cancelled() {
            info!("Multipart upload listing cancelled.");
            self.cursor.exhausted = true;
            return Ok(None);
        }

        let remaining = self.cursor.remaining(self.options.limit);
        if remaining == Some(0) {
            self.cursor.exhausted = true;
            return Ok(None);
        }
        let page_size = match remaining {
            Some(remaining) => (self.options.page_size() as u64).min(remaining) as i32,
            None => self.options.page_size(),
        };

        let request = ListMultipartUploadsRequest {
            prefix: self.options.prefix.clone(),
            delimiter: self.options.delimiter.clone(),
            key_marker: self.markers.as_ref().map(|(key, _)| key.clone()),
            upload_id_marker: self.markers.as_ref().map(|(_, id)| id.clone()),
            max_uploads: Some(page_size),
        };

        let output = self
            .storage
            .list_multipart_uploads(&request)
            .await
            .with_context(|| {
                S3tkError::Enumeration(format!(
                    "multipart upload listing page {} of {} failed.",
                    self.cursor.pages_fetched + 1,
                    format_uri(self.storage.bucket(), self.options.prefix.as_deref().unwrap_or_default()),
                ))
            })?;

        self.cursor.pages_fetched += 1;
        ProgressCounters::add(&self.context.counters().pages, 1);

        let mut uploads: Vec<MultipartUploadDescriptor> = output
            .uploads()
            .iter()
            .map(MultipartUploadDescriptor::from)
            .collect();
        if let Some(remaining) = remaining {
            uploads.truncate(remaining as usize);
        }
        self.cursor.yielded += uploads.len() as u64;

        let next_markers = match (output.next_key_marker(), output.next_upload_id_marker()) {
            (Some(key), Some(id)) => Some((key.to_string(), id.to_string())),
            (Some(key), None) => Some((key.to_string(), String::new())),
            _ => None,
        };

        if output.is_truncated() == Some(true) && next_markers.is_some() {
            if next_markers == self.markers {
                return Err(anyhow!(S3tkError::Enumeration(format!(
                    "multipart upload markers did not advance after page {}.",
                    self.cursor.pages_fetched
                ))));
            }
            self.markers = next_markers;
        } else {
            self.markers = None;
            self.cursor.exhausted = true;
        }
        if self.cursor.remaining(self.options.limit) == Some(0) {
            self.cursor.exhausted = true;
        }

        Ok(Some(uploads))
    }
}

/// List every part uploaded so far for one incomplete upload.
pub async fn list_upload_parts(storage: &Storage, key: &str, upload_id: &str) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let output = storage
            .list_parts(key, upload_id, marker.clone())
            .await
            .with_context(|| {
                S3tkError::Enumeration(format!(
                    "listing parts of upload {upload_id} for {} failed.",
                    format_uri(storage.bucket(), key)
                ))
            })?;
        parts.extend(output.parts().iter().cloned());

        let next = output.next_part_number_marker().map(str::to_string);
        if output.is_truncated() != Some(true) || next.is_none() {
            break;
        }
        if next == marker {
            return Err(anyhow!(S3tkError::Enumeration(format!(
                "part number marker did not advance for upload {upload_id}."
            ))));
        }
        marker = next;
    }

    Ok(parts)
}
