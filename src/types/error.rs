use std::io;

use anyhow::Error;
use thiserror::Error;

/// Application-level error types for s3tk-rs.
///
/// Storage calls return `anyhow::Error`; the engines attach one of these
/// variants as context so that the binary can map any failure to an exit
/// code with [`exit_code_from_error`].
///
/// ## Exit Codes
///
/// - 0: Cancelled (user declined the confirmation prompt, or ctrl-c) and
///   OutputClosed (stdout closed by its reader)
/// - 1: Enumeration, Transfer and UploadPart failures
/// - 2: Validation errors (bad range, regex, locator or option)
/// - 3: Partial delete (some keys deleted, some rejected by the provider)
#[derive(Error, Debug, PartialEq)]
pub enum S3tkError {
    /// Malformed range, regex, locator or option. Raised before any network call.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// A listing page could not be fetched, or the cursor failed to advance.
    #[error("Enumeration failed: {0}")]
    Enumeration(String),

    /// Some keys in some delete batches were rejected.
    #[error("Partial failure: {deleted} deleted, {failed} failed")]
    PartialDelete { deleted: u64, failed: u64 },

    /// The byte source or the sink failed mid-stream.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// A multipart part failed; the upload was aborted and never committed.
    #[error("Upload of part {part_number} failed: {message}")]
    UploadPart { part_number: i32, message: String },

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The reader of the command output went away (`s3tk list ... | head`).
    #[error("Output closed by reader")]
    OutputClosed,
}

impl S3tkError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3tkError::Cancelled | S3tkError::OutputClosed => 0,
            S3tkError::Validation(_) => 2,
            S3tkError::PartialDelete { .. } => 3,
            _ => 1,
        }
    }
}

pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3tkError>() {
        return *err == S3tkError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3tkError>() {
        return err.exit_code();
    }
    1
}

/// True when the command output was closed by its reader.
///
/// Only failures tagged by [`output_error`] qualify; a broken pipe on a file
/// sink or an SDK connection stays a failure.
pub fn is_output_closed(e: &Error) -> bool {
    matches!(e.downcast_ref::<S3tkError>(), Some(S3tkError::OutputClosed))
}

/// Wrap a failed write to the command output. `BrokenPipe` is tagged as
/// [`S3tkError::OutputClosed`].
pub fn output_error(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::BrokenPipe {
        anyhow::Error::new(e).context(S3tkError::OutputClosed)
    } else {
        anyhow::Error::new(e).context("failed to write output.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn is_cancelled_error_test() {
        assert!(is_cancelled_error(&anyhow!(S3tkError::Cancelled)));
    }

    #[test]
    fn is_cancelled_error_false_for_other_errors() {
        assert!(!is_cancelled_error(&anyhow!(S3tkError::Transfer(
            "sink closed".to_string()
        ))));
        assert!(!is_cancelled_error(&anyhow!("generic error")));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(S3tkError::Cancelled.exit_code(), 0);
        assert_eq!(S3tkError::Validation("bad".to_string()).exit_code(), 2);
        assert_eq!(
            S3tkError::PartialDelete {
                deleted: 90,
                failed: 10
            }
            .exit_code(),
            3
        );
        assert_eq!(S3tkError::Enumeration("x".to_string()).exit_code(), 1);
        assert_eq!(S3tkError::Transfer("x".to_string()).exit_code(), 1);
        assert_eq!(
            S3tkError::UploadPart {
                part_number: 2,
                message: "x".to_string()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn error_display_messages() {
        assert_eq!(
            S3tkError::Validation("Invalid range: \"abc\"".to_string()).to_string(),
            "Invalid argument: Invalid range: \"abc\""
        );
        assert_eq!(
            S3tkError::PartialDelete {
                deleted: 95,
                failed: 5
            }
            .to_string(),
            "Partial failure: 95 deleted, 5 failed"
        );
        assert_eq!(
            S3tkError::UploadPart {
                part_number: 3,
                message: "timeout".to_string()
            }
            .to_string(),
            "Upload of part 3 failed: timeout"
        );
    }

    #[test]
    fn exit_code_found_through_context() {
        let err = Err::<(), _>(anyhow!("access denied"))
            .context(S3tkError::Enumeration("page 3".to_string()))
            .unwrap_err();
        assert_eq!(exit_code_from_error(&err), 1);

        let err = Err::<(), _>(anyhow!(S3tkError::Validation("x".to_string())))
            .context("while parsing --range")
            .unwrap_err();
        assert_eq!(exit_code_from_error(&err), 2);
    }

    #[test]
    fn exit_code_from_generic_anyhow_error() {
        assert_eq!(exit_code_from_error(&anyhow!("unknown error")), 1);
    }

    #[test]
    fn only_tagged_output_failures_count_as_closed_output() {
        let err = output_error(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(is_output_closed(&err));
        assert_eq!(exit_code_from_error(&err), 0);

        let err = output_error(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!is_output_closed(&err));
        assert_eq!(exit_code_from_error(&err), 1);

        let err = Err::<(), _>(io::Error::from(io::ErrorKind::BrokenPipe))
            .context(S3tkError::Transfer("failed to write to sink.".to_string()))
            .unwrap_err();
        assert!(!is_output_closed(&err));
        assert_eq!(exit_code_from_error(&err), 1);
    }
}
