use parking_lot::RwLock;

use crate::core::errors::Result;
use crate::progress::scaling::ScalingTaskProgressSink;
use crate::progress::sink::{SharedProgressSink, TaskProgressSink};

/// Reports "step `n` of `action_count`" as a point in `[start, end]`
pub struct StepTaskProgressSink {
    start: i64,
    end: i64,
    delegate: SharedProgressSink,
    scaling: RwLock<ScalingTaskProgressSink>,
}

impl StepTaskProgressSink {
    pub fn new(
        start: i64,
        end: i64,
        action_count: i64,
        delegate: SharedProgressSink,
    ) -> Result<Self> {
        let scaling = ScalingTaskProgressSink::new(start, end, 0, action_count, delegate.clone())?;
        Ok(Self {
            start,
            end,
            delegate,
            scaling: RwLock::new(scaling),
        })
    }

    pub fn action_count(&self) -> i64 {
        self.scaling.read().virtual_range().1
    }

    /// Re-base the mapping when the number of actions becomes known later
    pub fn set_action_count(&self, action_count: i64) -> Result<()> {
        let scaling = ScalingTaskProgressSink::new(
            self.start,
            self.end,
            0,
            action_count,
            self.delegate.clone(),
        )?;
        *self.scaling.write() = scaling;
        Ok(())
    }
}

impl TaskProgressSink for StepTaskProgressSink {
    fn make_progress(
        &self,
        current_step: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        self.scaling.read().make_progress(current_step, current_sub_task, message);
    }
}
