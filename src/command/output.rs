use std::time::Duration;

use anyhow::Result;
use byte_unit::{Byte, Unit, UnitType};
use chrono::{DateTime, Utc};
use indicatif::HumanCount;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::types::error::output_error;

pub(crate) async fn write_line<W>(out: &mut W, line: impl AsRef<str>) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    out.write_all(line.as_ref().as_bytes())
        .await
        .map_err(output_error)?;
    out.write_all(b"\n").await.map_err(output_error)?;
    Ok(())
}

/// Decimal units, e.g. `1.50 MB`; plain bytes below 1 kB.
pub(crate) fn pretty_bytes(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Decimal);
    if adjusted.get_unit() == Unit::B {
        format!("{bytes} B")
    } else {
        format!("{adjusted:.2}")
    }
}

/// Thousands separated, e.g. `12,345`.
pub(crate) fn count(value: u64) -> String {
    HumanCount(value).to_string()
}

pub(crate) fn elapsed(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

pub(crate) fn timestamp(time: Option<&DateTime<Utc>>) -> String {
    match time {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "----------   --------".to_string(),
    }
}

pub(crate) fn pad_left(width: usize, text: &str) -> String {
    format!("{text:>width$}")
}
