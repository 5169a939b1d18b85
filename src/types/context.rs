//! Per-invocation run context.
//!
//! Every command builds one [`RunContext`] and hands clones of it to the
//! engines it drives. The counters are plain atomics; each counter is written
//! by exactly one engine (the walker owns `pages`, the deleter owns
//! `matched`/`deleted`/`failed`, the transfer pipe owns `bytes`, ...) and read
//! by the reporter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tokio::time::Instant;

use crate::types::error::S3tkError;
use crate::types::token::{RunCancellationToken, create_run_cancellation_token};

#[derive(Debug, Default)]
pub struct ProgressCounters {
    pub pages: AtomicU64,
    pub scanned: AtomicU64,
    pub matched: AtomicU64,
    pub deleted: AtomicU64,
    pub failed: AtomicU64,
    pub bytes: AtomicU64,
    pub bytes_buffered: AtomicU64,
    pub bytes_delivered: AtomicU64,
    last_key: Mutex<Option<String>>,
}

/// A consistent-enough copy of the counters for one report line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub pages: u64,
    pub scanned: u64,
    pub matched: u64,
    pub deleted: u64,
    pub failed: u64,
    pub bytes: u64,
    pub bytes_buffered: u64,
    pub bytes_delivered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_key: Option<String>,
}

impl ProgressCounters {
    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn set_last_key(&self, key: &str) {
        if let Ok(mut last_key) = self.last_key.lock() {
            *last_key = Some(key.to_string());
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pages: self.pages.load(Ordering::Relaxed),
            scanned: self.scanned.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            bytes_buffered: self.bytes_buffered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            last_key: self.last_key.lock().ok().and_then(|k| k.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    counters: Arc<ProgressCounters>,
    cancellation_token: RunCancellationToken,
    dry_run: bool,
    started: Instant,
}

impl RunContext {
    pub fn new(cancellation_token: RunCancellationToken, dry_run: bool) -> Self {
        Self {
            counters: Arc::new(ProgressCounters::default()),
            cancellation_token,
            dry_run,
            started: Instant::now(),
        }
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.counters.snapshot()
    }

    pub fn cancellation_token(&self) -> &RunCancellationToken {
        &self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// `Err(Cancelled)` once the run has been cancelled. Engines stop
    /// quietly on cancellation; commands call this before reporting a run
    /// as finished.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(anyhow!(S3tkError::Cancelled));
        }
        Ok(())
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(create_run_cancellation_token(), false)
    }
}
