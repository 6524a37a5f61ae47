use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

use crate::progress::sink::{SharedProgressSink, TaskProgressSink};

/// Fans every report out to each delegate, in order.
///
/// A delegate that panics is logged and skipped; the remaining delegates
/// still receive the report.
#[derive(Clone, Default)]
pub struct CompositeProgressSink {
    delegates: Vec<SharedProgressSink>,
}

impl CompositeProgressSink {
    pub fn new(delegates: Vec<SharedProgressSink>) -> Self {
        Self { delegates }
    }

    pub fn with(mut self, delegate: SharedProgressSink) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl TaskProgressSink for CompositeProgressSink {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        for (index, delegate) in self.delegates.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                delegate.make_progress(task_progress, current_sub_task, message)
            }));
            if outcome.is_err() {
                warn!(
                    delegate = index,
                    progress = task_progress,
                    "Progress sink delegate panicked"
                );
            }
        }
    }
}
