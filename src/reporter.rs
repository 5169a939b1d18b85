//! Debounce-with-maximum-latency progress scheduler.
//!
//! Engines call [`ThrottledReporter::schedule`] after every unit of work. A
//! report fires once events have been quiet for `min_delay`, or once
//! `max_delay` has elapsed since the first unreported event, whichever comes
//! first. [`ThrottledReporter::halt`] fires the final report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::config::ReporterConfig;
use crate::types::error::S3tkError;

/// Why a report fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTrigger {
    /// Events went quiet for `min_delay`.
    Quiet,
    /// Events kept arriving for `max_delay`.
    MaxDelay,
    /// [`ThrottledReporter::halt`] was called.
    Final,
}

pub type ReportFn = Arc<dyn Fn(ReportTrigger) + Send + Sync>;

#[derive(Debug)]
struct ScheduleState {
    first_pending: Option<Instant>,
    last_event: Instant,
    last_report: Option<Instant>,
    halted: bool,
}

struct Shared {
    config: ReporterConfig,
    state: Mutex<ScheduleState>,
    notify: Notify,
    report: ReportFn,
    fired: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ScheduleState> {
        // A poisoned lock only means a report callback panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deadline(&self, state: &ScheduleState) -> Option<(Instant, ReportTrigger)> {
        let first_pending = state.first_pending?;

        let quiet = state.last_event + self.config.min_delay;
        let latest = first_pending + self.config.max_delay;
        let (mut deadline, trigger) = if quiet <= latest {
            (quiet, ReportTrigger::Quiet)
        } else {
            (latest, ReportTrigger::MaxDelay)
        };

        if let Some(last_report) = state.last_report {
            deadline = deadline.max(last_report + self.config.min_delay);
        }
        Some((deadline, trigger))
    }

    /// Record the report and run the callback with the lock released, so
    /// the callback may call back into the reporter.
    fn fire(&self, mut state: MutexGuard<'_, ScheduleState>, trigger: ReportTrigger) {
        state.first_pending = None;
        state.last_report = Some(Instant::now());
        drop(state);

        self.fired.fetch_add(1, Ordering::Relaxed);
        trace!(trigger = ?trigger, "report fired.");
        (self.report)(trigger);
    }
}

pub struct ThrottledReporter {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ThrottledReporter {
    /// Start a reporter. Must be called inside a tokio runtime; the driver
    /// task lives until [`halt`](Self::halt) or drop.
    pub fn new(config: &ReporterConfig, report: ReportFn) -> Result<Self> {
        config
            .validate()
            .map_err(|message| anyhow!(S3tkError::Validation(message)))?;

        let shared = Arc::new(Shared {
            config: config.clone(),
            state: Mutex::new(ScheduleState {
                first_pending: None,
                last_event: Instant::now(),
                last_report: None,
                halted: false,
            }),
            notify: Notify::new(),
            report,
            fired: AtomicU64::new(0),
        });

        let driver = tokio::spawn(drive(Arc::clone(&shared)));

        Ok(Self {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Record one unit of work.
    pub fn schedule(&self) {
        let now = Instant::now();
        {
            let mut state = self.shared.lock();
            if state.halted {
                return;
            }
            state.last_event = now;
            if state.first_pending.is_none() {
                state.first_pending = Some(now);
            }
        }
        self.shared.notify.notify_one();
    }

    /// Fire exactly one final report and stop. Later calls do nothing.
    pub fn halt(&self) {
        let mut state = self.shared.lock();
        if state.halted {
            return;
        }
        state.halted = true;
        self.shared.fire(state, ReportTrigger::Final);

        if let Some(driver) = self.take_driver() {
            driver.abort();
        }
    }

    pub fn is_halted(&self) -> bool {
        self.shared.lock().halted
    }

    /// Number of reports fired so far, the final one included.
    pub fn reports_fired(&self) -> u64 {
        self.shared.fired.load(Ordering::Relaxed)
    }

    fn take_driver(&self) -> Option<JoinHandle<()>> {
        self.driver.lock().ok().and_then(|mut driver| driver.take())
    }
}

impl Drop for ThrottledReporter {
    fn drop(&mut self) {
        if let Some(driver) = self.take_driver() {
            driver.abort();
        }
    }
}

async fn drive(shared: Arc<Shared>) {
    loop {
        let next = {
            let state = shared.lock();
            if state.halted {
                return;
            }
            shared.deadline(&state)
        };

        match next {
            None => shared.notify.notified().await,
            Some((deadline, _)) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        let state = shared.lock();
                        if state.halted {
                            return;
                        }
                        // New events may have pushed the deadline out.
                        if let Some((deadline, trigger)) = shared.deadline(&state) {
                            if deadline <= Instant::now() {
                                shared.fire(state, trigger);
                            }
                        }
                    }
                    _ = shared.notify.notified() => {}
                }
            }
        }
    }
}
