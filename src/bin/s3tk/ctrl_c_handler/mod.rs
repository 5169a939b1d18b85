// Cancels the run on ctrl-c; exits quietly once the run token is cancelled elsewhere.

use s3tk_rs::RunCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: RunCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("run cancellation token cancelled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received, stopping after the current request.");
                cancellation_token.cancel();
            }
        }
    })
}
