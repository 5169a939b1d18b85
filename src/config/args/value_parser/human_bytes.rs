use byte_unit::Byte;
use std::str::FromStr;

/// Clap value parser that validates a human-readable byte size without consuming it.
pub fn check_human_bytes(value: &str) -> Result<String, String> {
    parse_human_bytes(value)?;
    Ok(value.to_string())
}

pub fn parse_human_bytes(value: &str) -> Result<u64, String> {
    let byte = Byte::from_str(value.trim()).map_err(|e| e.to_string())?;
    u64::try_from(byte.as_u128()).map_err(|e| e.to_string())
}
