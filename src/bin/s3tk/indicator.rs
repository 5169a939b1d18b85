// Live progress line for the CLI.
//
// Samples the run's counters once per second and renders a single
// indicatif line on stderr. Throttled report lines from the commands are
// printed above it through `progress_sink`, so the two never interleave.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};
use s3tk_rs::command::ProgressSink;
use s3tk_rs::types::{ProgressSnapshot, RunContext};
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Moving average window in samples.
const MOVING_AVERAGE_PERIOD_SECS: usize = 10;

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub struct Indicator {
    bar: ProgressBar,
    stop: CancellationToken,
    join_handle: JoinHandle<ProgressSnapshot>,
}

impl Indicator {
    /// Starts sampling `context`. With `show_progress` unset the bar is
    /// hidden, but the final summary is still logged.
    pub fn start(context: RunContext, show_progress: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            None,
            if show_progress {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        if let Ok(style) = ProgressStyle::with_template("{wide_msg}") {
            bar.set_style(style);
        }

        let stop = CancellationToken::new();
        let join_handle = tokio::spawn(sample(context, bar.clone(), stop.clone()));

        Self {
            bar,
            stop,
            join_handle,
        }
    }

    /// Sink for throttled report lines; printed above the live line.
    pub fn progress_sink(&self) -> ProgressSink {
        let bar = self.bar.clone();
        Arc::new(move |line: &str| {
            if bar.is_hidden() {
                eprintln!("{line}");
            } else {
                bar.println(line);
            }
        })
    }

    /// Stops sampling, clears the live line and returns the last snapshot.
    pub async fn finish(self) -> Option<ProgressSnapshot> {
        self.stop.cancel();
        let snapshot = self.join_handle.await.ok();
        self.bar.finish_and_clear();
        snapshot
    }
}

async fn sample(context: RunContext, bar: ProgressBar, stop: CancellationToken) -> ProgressSnapshot {
    let mut ma_scanned = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
    let mut previous_scanned = 0;

    let mut interval = tokio::time::interval(REFRESH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = context.snapshot();
                ma_scanned.add_sample(snapshot.scanned.saturating_sub(previous_scanned));
                previous_scanned = snapshot.scanned;

                bar.set_message(live_line(&snapshot, ma_scanned.get_average(), context.elapsed()));
            }
        }
    }

    let snapshot = context.snapshot();
    let elapsed = context.elapsed();
    info!(
        message = "run summary",
        pages = snapshot.pages,
        scanned = snapshot.scanned,
        matched = snapshot.matched,
        deleted = snapshot.deleted,
        failed = snapshot.failed,
        bytes = snapshot.bytes,
        dry_run = context.is_dry_run(),
        duration_sec = elapsed.as_secs_f64(),
    );

    snapshot
}

fn live_line(snapshot: &ProgressSnapshot, scanned_per_sec: u64, elapsed: Duration) -> String {
    let mut line = format!(
        "scanned {} keys | {} keys/sec",
        HumanCount(snapshot.scanned),
        HumanCount(scanned_per_sec),
    );
    if snapshot.deleted > 0 || snapshot.failed > 0 {
        line.push_str(&format!(
            ",  deleted {},  failed {}",
            HumanCount(snapshot.deleted),
            HumanCount(snapshot.failed)
        ));
    }
    if snapshot.bytes > 0 {
        line.push_str(&format!(",  {}", HumanBytes(snapshot.bytes)));
    }
    if snapshot.bytes_delivered > 0 {
        line.push_str(&format!(",  delivered {}", HumanBytes(snapshot.bytes_delivered)));
    }
    line.push_str(&format!(",  elapsed {}", HumanDuration(elapsed)));
    line
}
