use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

use crate::progress::sink::{SharedProgressSink, TaskProgressSink};

struct LogState {
    last_progress: Option<i64>,
    last_logged: Option<Instant>,
}

/// Logs a progress line when the value changes, or when `interval` has
/// passed since the previous line. Reports are always forwarded to the
/// delegate, logged or not.
pub struct TimeBasedLogSink {
    name: String,
    interval: Duration,
    delegate: Option<SharedProgressSink>,
    state: Mutex<LogState>,
}

impl TimeBasedLogSink {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        delegate: Option<SharedProgressSink>,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            delegate,
            state: Mutex::new(LogState {
                last_progress: None,
                last_logged: None,
            }),
        }
    }

    /// Decide whether a report should be logged, and record it if so
    fn should_log(&self, task_progress: i64, now: Instant) -> bool {
        let mut state = self.state.lock();
        let changed = state.last_progress != Some(task_progress);
        let stale = state
            .last_logged
            .map_or(true, |last| now.saturating_duration_since(last) > self.interval);

        if changed || stale {
            state.last_progress = Some(task_progress);
            state.last_logged = Some(now);
            true
        } else {
            false
        }
    }
}

impl TaskProgressSink for TimeBasedLogSink {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        if self.should_log(task_progress, Instant::now()) {
            info!(
                sink = %self.name,
                progress = task_progress,
                sub_task = current_sub_task.unwrap_or(""),
                "{}% complete: {}",
                task_progress,
                message.unwrap_or("")
            );
        }
        if let Some(delegate) = &self.delegate {
            delegate.make_progress(task_progress, current_sub_task, message);
        }
    }
}
