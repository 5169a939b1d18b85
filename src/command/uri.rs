//! `parse-uri` and `make-uri`: offline helpers for shell scripts.

use anyhow::{Result, anyhow};
use tokio::io::AsyncWrite;

use crate::locator::ResourceLocation;
use crate::types::error::S3tkError;

use super::output::write_line;

const INVALID_URI: &str = "Invalid S3 URI format";

/// Print `bucket key` for a strict `s3://bucket/key` URI.
///
/// Unlike [`crate::locator::resolve`], both bucket and key are required and
/// nothing is trimmed.
pub async fn parse_uri<W>(uri: &str, out: &mut W) -> Result<ResourceLocation>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let location = split_strict(uri)
        .ok_or_else(|| anyhow!(S3tkError::Validation(format!("{INVALID_URI}: {uri}"))))?;
    write_line(out, format!("{} {}", location.bucket, location.prefix())).await?;
    Ok(location)
}

fn split_strict(uri: &str) -> Option<ResourceLocation> {
    let clipped = uri.strip_prefix("s3://")?;
    let (bucket, key) = clipped.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(ResourceLocation::new(bucket, Some(key.to_string())))
}

pub async fn make_uri<W>(bucket: &str, key: &str, out: &mut W) -> Result<String>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    if bucket.is_empty() {
        return Err(anyhow!(S3tkError::Validation("Invalid bucket".to_string())));
    }
    if key.is_empty() {
        return Err(anyhow!(S3tkError::Validation("Invalid key".to_string())));
    }

    let uri = format!("s3://{bucket}/{key}");
    write_line(out, &uri).await?;
    Ok(uri)
}
