//! Key-path sampling of NDJSON records.
//!
//! Every record is walked down to a fixed depth and each path seen is
//! counted together with the JSON type found there, for example
//! `paths:a.b=OBJECT`. Counters live in a sorted map so reports are stable.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

/// Path segment used for the items of an inspected array.
pub const ARRAY_ITEM: &str = "$_ARRAY_ITEM_$";

pub const KEYS_SAMPLED: &str = "s3.keys.sampled";
pub const KEYS_FILTERED: &str = "s3.keys.filtered";
pub const LINES: &str = "scan.lines";
pub const RECORDS_VALID: &str = "scan.records.valid";
pub const RECORDS_INVALID: &str = "scan.records.invalid";

/// Counter name to count.
pub type SampleMetrics = BTreeMap<String, u64>;

#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Levels below the record root that are counted.
    pub depth: usize,
    /// Dotted paths whose string values hold JSON and are parsed before
    /// being walked. Shown as `$name` in the counted path.
    pub parse_paths: Vec<String>,
    pub inspect_arrays: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            depth: 3,
            parse_paths: Vec::new(),
            inspect_arrays: false,
        }
    }
}

pub fn increment(metrics: &mut SampleMetrics, name: &str) {
    *metrics.entry(name.to_string()).or_default() += 1;
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(_) => "NUMBER",
        Value::String(_) => "STRING",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

/// Count the typed paths of one record into `metrics`.
///
/// The root itself is never counted; a scalar record adds nothing.
pub fn walk_record(record: &Value, options: &SampleOptions, metrics: &mut SampleMetrics) {
    let mut path = PathStack::default();
    walk_children(record, options, 1, &mut path, metrics);
}

/// Displayed segments and raw keys, kept in step.
#[derive(Default)]
struct PathStack {
    shown: Vec<String>,
    raw: Vec<String>,
}

fn walk_children(
    value: &Value,
    options: &SampleOptions,
    level: usize,
    path: &mut PathStack,
    metrics: &mut SampleMetrics,
) {
    if level > options.depth {
        return;
    }
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                visit(child, key, options, level, path, metrics);
            }
        }
        Value::Array(items) if options.inspect_arrays => {
            for item in items {
                visit(item, ARRAY_ITEM, options, level, path, metrics);
            }
        }
        _ => {}
    }
}

fn visit(
    value: &Value,
    key: &str,
    options: &SampleOptions,
    level: usize,
    path: &mut PathStack,
    metrics: &mut SampleMetrics,
) {
    path.raw.push(key.to_string());

    let parsed = match value {
        Value::String(text) if options.parse_paths.contains(&path.raw.join(".")) => {
            match serde_json::from_str::<Value>(text) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!(path = path.raw.join("."), "string is not JSON: {e}");
                    None
                }
            }
        }
        _ => None,
    };
    let (value, segment) = match &parsed {
        Some(parsed) => (parsed, format!("${key}")),
        None => (value, key.to_string()),
    };

    path.shown.push(segment);
    increment(metrics, &format!("paths:{}={}", path.shown.join("."), type_name(value)));
    walk_children(value, options, level + 1, path, metrics);
    path.shown.pop();
    path.raw.pop();
}

/// Sink that splits what is written to it into lines and samples each
/// line as one JSON record.
///
/// Blank lines are skipped. A line that is not JSON is counted as an
/// invalid record.
pub struct RecordSampler {
    options: SampleOptions,
    metrics: Arc<Mutex<SampleMetrics>>,
    pending: Vec<u8>,
}

impl RecordSampler {
    pub fn new(options: SampleOptions, metrics: Arc<Mutex<SampleMetrics>>) -> Self {
        Self {
            options,
            metrics,
            pending: Vec::new(),
        }
    }

    pub fn count(&self, name: &str) {
        increment(&mut self.lock(), name);
    }

    /// Sample the last line of an object that does not end with a newline.
    /// Called between objects so records never span two keys.
    pub fn finish_object(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.sample_line(&line);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SampleMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sample_line(&self, line: &[u8]) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let mut metrics = self.lock();
        increment(&mut metrics, LINES);
        match serde_json::from_slice::<Value>(line) {
            Ok(record) => {
                increment(&mut metrics, RECORDS_VALID);
                walk_record(&record, &self.options, &mut metrics);
            }
            Err(e) => {
                warn!("invalid record skipped: {e}");
                increment(&mut metrics, RECORDS_INVALID);
            }
        }
    }
}

impl AsyncWrite for RecordSampler {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut start = this.pending.len();
        this.pending.extend_from_slice(buf);

        while let Some(offset) = this.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line: Vec<u8> = this.pending.drain(..=end).take(end).collect();
            this.sample_line(&line);
            start = 0;
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
