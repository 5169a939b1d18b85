//! Streaming transfer pipe.
//!
//! A reader task pulls chunks from the source into a bounded
//! `async_channel` queue; the writer drains the queue into the sink. When the
//! queue is full the reader blocks on `send`, which pauses the source until
//! the sink catches up.

use std::io;

use anyhow::{Context, Result, anyhow};
use async_compression::tokio::bufread::GzipDecoder;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::types::error::S3tkError;
use crate::types::{ProgressCounters, RunContext};

pub mod fetch;
pub mod range;

pub use fetch::{ScanSummary, fetch_object, scan_objects};
pub use range::ByteRange;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How the source bytes are decoded before they reach the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    Identity,
    Gzip,
    /// Decompress only if the stream starts with the gzip magic bytes.
    Detect,
}

/// Outcome of one pipe run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSession {
    pub bytes_transferred: u64,
    /// The source was paused at least once because the queue was full.
    pub backpressured: bool,
    pub pause_count: u64,
    /// The stdout reader went away before the source was exhausted.
    pub ended_early: bool,
}

#[derive(Debug, Clone)]
pub struct StreamingTransfer {
    context: RunContext,
    chunk_size: usize,
    queue_capacity: usize,
    stdout_sink: bool,
}

impl StreamingTransfer {
    pub fn new(context: RunContext) -> Self {
        Self {
            context,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stdout_sink: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    /// Treat `BrokenPipe` from the sink as the reader closing stdout.
    pub fn with_stdout_sink(mut self, stdout_sink: bool) -> Self {
        self.stdout_sink = stdout_sink;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Copy `source` into `sink` until EOF and flush the sink.
    ///
    /// Cancellation before EOF is an error: the sink holds a truncated copy.
    pub async fn run<R, W>(&self, source: R, sink: &mut W, decoding: Decoding) -> Result<TransferSession>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut source = decode(source, decoding).await?;
        let (sender, receiver) = async_channel::bounded::<Bytes>(self.queue_capacity);

        let chunk_size = self.chunk_size;
        let context = &self.context;
        let reader = async move {
            let mut pause_count = 0u64;
            loop {
                if context.is_cancelled() {
                    info!("transfer cancelled before the end of the source.");
                    return Err(anyhow!(S3tkError::Cancelled));
                }

                let mut chunk = BytesMut::with_capacity(chunk_size);
                let read = source
                    .read_buf(&mut chunk)
                    .await
                    .context(S3tkError::Transfer("failed to read from source.".to_string()))?;
                if read == 0 {
                    break;
                }

                if sender.is_full() {
                    pause_count += 1;
                }
                if sender.send(chunk.freeze()).await.is_err() {
                    // The writer stopped; its result explains why.
                    break;
                }
            }
            Ok::<u64, anyhow::Error>(pause_count)
        };

        let stdout_sink = self.stdout_sink;
        let writer = async move {
            let mut transferred = 0u64;
            while let Ok(chunk) = receiver.recv().await {
                if let Err(e) = sink.write_all(&chunk).await {
                    receiver.close();
                    return sink_error(e, stdout_sink).map(|()| (transferred, true));
                }
                transferred += chunk.len() as u64;
                ProgressCounters::add(&context.counters().bytes, chunk.len() as u64);
            }
            if let Err(e) = sink.flush().await {
                return sink_error(e, stdout_sink).map(|()| (transferred, true));
            }
            Ok::<(u64, bool), anyhow::Error>((transferred, false))
        };

        let (read_result, write_result) = tokio::join!(reader, writer);
        let (bytes_transferred, ended_early) = write_result?;
        let pause_count = if ended_early { read_result.unwrap_or_default() } else { read_result? };

        debug!(
            bytes = bytes_transferred,
            pause_count = pause_count,
            ended_early = ended_early,
            "transfer completed."
        );

        Ok(TransferSession {
            bytes_transferred,
            backpressured: pause_count > 0,
            pause_count,
            ended_early,
        })
    }
}

fn sink_error(e: io::Error, stdout_sink: bool) -> Result<()> {
    if stdout_sink && e.kind() == io::ErrorKind::BrokenPipe {
        debug!("stdout closed by reader.");
        return Ok(());
    }
    Err(anyhow!(e).context(S3tkError::Transfer("failed to write to sink.".to_string())))
}

fn gzip_decoder<R: AsyncBufRead>(reader: R) -> GzipDecoder<R> {
    let mut decoder = GzipDecoder::new(reader);
    decoder.multiple_members(true);
    decoder
}

async fn decode<R>(source: R, decoding: Decoding) -> Result<Box<dyn AsyncRead + Unpin + Send>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    match decoding {
        Decoding::Identity => Ok(Box::new(source)),
        Decoding::Gzip => Ok(Box::new(gzip_decoder(BufReader::new(source)))),
        Decoding::Detect => {
            let mut reader = BufReader::new(source);
            let head = reader
                .fill_buf()
                .await
                .context(S3tkError::Transfer("failed to read from source.".to_string()))?;
            if head.starts_with(&GZIP_MAGIC) {
                debug!("gzip stream detected.");
                Ok(Box::new(gzip_decoder(reader)))
            } else {
                Ok(Box::new(reader))
            }
        }
    }
}

/// `Content-Encoding` values that mean the body is gzip.
pub fn is_gzip_encoding(content_encoding: Option<&str>) -> bool {
    content_encoding.is_some_and(|encoding| {
        encoding
            .split(',')
            .any(|e| matches!(e.trim().to_ascii_lowercase().as_str(), "gzip" | "x-gzip"))
    })
}
