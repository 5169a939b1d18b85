use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::error::S3tkError;

/// An inclusive byte range, validated before any request is made.
///
/// Accepts `"start"` or `"start-end"` with non-negative integers and
/// `start <= end`. `"start"` normalizes to `start-start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self, S3tkError> {
        if start > end {
            return Err(S3tkError::Validation(format!(
                "Invalid range: \"{start}-{end}\" (start is after end)"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `Range` request header value.
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for ByteRange {
    type Err = S3tkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || S3tkError::Validation(format!("Invalid range: \"{s}\""));
        let parse_bound = |bound: &str| -> Result<u64, S3tkError> {
            if bound.is_empty() || !bound.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            bound.parse::<u64>().map_err(|_| invalid())
        };

        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (parse_bound(start)?, parse_bound(end)?),
            None => {
                let start = parse_bound(s)?;
                (start, start)
            }
        };

        if start > end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_closed_range() {
        let range: ByteRange = "0-499".parse().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 499 });
        assert_eq!(range.to_header(), "bytes=0-499");
    }

    #[test]
    fn single_offset_normalizes() {
        let range: ByteRange = "500".parse().unwrap();
        assert_eq!(range.to_string(), "500-500");
        assert_eq!(range, ByteRange { start: 500, end: 500 });
    }

    #[test]
    fn rejects_reversed_and_malformed() {
        for input in ["500-100", "abc", "", "-5", "5-", "1-2-3", " 1-2", "+1-2", "1.5"] {
            let err = input.parse::<ByteRange>().unwrap_err();
            assert!(
                matches!(err, S3tkError::Validation(_)),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn new_checks_order() {
        assert!(ByteRange::new(10, 9).is_err());
        assert_eq!(ByteRange::new(9, 9).unwrap(), ByteRange { start: 9, end: 9 });
    }

    proptest! {
        #[test]
        fn ordered_bounds_always_parse(start in 0u64..1_000_000, span in 0u64..1_000_000) {
            let end = start + span;
            let range: ByteRange = format!("{start}-{end}").parse().unwrap();
            prop_assert_eq!(range, ByteRange { start, end });
            prop_assert_eq!(range.to_header(), format!("bytes={start}-{end}"));
        }

        #[test]
        fn reversed_bounds_never_parse(start in 1u64..1_000_000, gap in 1u64..1_000) {
            let end = start.saturating_sub(gap);
            prop_assume!(end < start);
            let text = format!("{start}-{end}");
            prop_assert!(text.parse::<ByteRange>().is_err());
        }
    }
}
