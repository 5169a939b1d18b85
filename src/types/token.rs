/// A cancellation token shared by every engine of one invocation.
///
/// This is a type alias for [`tokio_util::sync::CancellationToken`]. The CLI
/// cancels it from its ctrl-c handler; walkers and transfers check it between
/// pages and chunks and stop cleanly.
pub type RunCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`RunCancellationToken`].
///
/// # Example
///
/// ```
/// use s3tk_rs::create_run_cancellation_token;
///
/// let token = create_run_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn create_run_cancellation_token() -> RunCancellationToken {
    tokio_util::sync::CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_token_follows_parent() {
        let token = create_run_cancellation_token();
        let child = token.child_token();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
