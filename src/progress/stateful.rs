use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::core::errors::{Result, TaskError};
use crate::progress::scaling::ScalingTaskProgressSink;
use crate::progress::sink::{SharedProgressSink, TaskProgressSink};

/// A sink that remembers the last progress it reported.
///
/// Every value is clamped to `[min_progress, max_progress]` before it is
/// stored and forwarded.
pub struct StatefulTaskProgressSink {
    min_progress: i64,
    max_progress: i64,
    current: Mutex<i64>,
    delegate: SharedProgressSink,
}

impl StatefulTaskProgressSink {
    pub fn new(
        min_progress: i64,
        max_progress: i64,
        current: i64,
        delegate: SharedProgressSink,
    ) -> Result<Self> {
        if max_progress < min_progress {
            return Err(TaskError::invalid_argument(format!(
                "max progress {} is less than min progress {}",
                max_progress, min_progress
            )));
        }
        Ok(Self {
            min_progress,
            max_progress,
            current: Mutex::new(current.clamp(min_progress, max_progress)),
            delegate,
        })
    }

    pub fn min_progress(&self) -> i64 {
        self.min_progress
    }

    pub fn max_progress(&self) -> i64 {
        self.max_progress
    }

    pub fn progress(&self) -> i64 {
        *self.current.lock()
    }

    /// Store a new value without reporting it
    pub fn set_progress(&self, progress: i64) {
        *self.current.lock() = self.clamp(progress);
    }

    /// Advance by `increment` from the last stored value and report
    pub fn make_progress_increment(
        &self,
        increment: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        let progress = {
            let mut current = self.current.lock();
            *current = self.clamp(current.saturating_add(increment));
            *current
        };
        self.delegate.make_progress(progress, current_sub_task, message);
    }

    /// Re-emit the last stored value with a new label and message
    pub fn make_progress_message(&self, current_sub_task: Option<&str>, message: Option<&str>) {
        let progress = self.progress();
        self.delegate.make_progress(progress, current_sub_task, message);
    }

    /// A child sink that splits `[start, start + length]` of this sink into
    /// `steps` discrete steps. Reporting step `n` on the child moves this sink
    /// to the matching point of the sub-range.
    pub fn create_step_sink_view(
        self: &Arc<Self>,
        start: i64,
        length: i64,
        steps: i64,
    ) -> Result<StatefulTaskProgressSink> {
        if steps <= 0 {
            return Err(TaskError::invalid_argument("number of steps must be greater than 0"));
        }
        let parent: SharedProgressSink = self.clone();
        let scaling = ScalingTaskProgressSink::new(start, start + length, 0, steps, parent)?;
        StatefulTaskProgressSink::new(0, steps, 0, Arc::new(scaling))
    }

    fn clamp(&self, progress: i64) -> i64 {
        progress.clamp(self.min_progress, self.max_progress)
    }
}

impl TaskProgressSink for StatefulTaskProgressSink {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        let progress = self.clamp(task_progress);
        *self.current.lock() = progress;
        self.delegate.make_progress(progress, current_sub_task, message);
    }
}

impl fmt::Debug for StatefulTaskProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulTaskProgressSink")
            .field("min_progress", &self.min_progress)
            .field("max_progress", &self.max_progress)
            .field("current", &self.progress())
            .finish()
    }
}
