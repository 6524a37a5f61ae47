use std::fmt;
use std::sync::Arc;

/// A destination for progress reports.
///
/// Reporting is best effort: implementations must not block for long and must
/// never surface a failure to the task doing the reporting. Progress values
/// are conventionally percentages in `0..=100`, with `-1` meaning "unknown";
/// sinks that remap ranges document their own contract.
pub trait TaskProgressSink: Send + Sync {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    );
}

impl<T: TaskProgressSink + ?Sized> TaskProgressSink for Arc<T> {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        (**self).make_progress(task_progress, current_sub_task, message)
    }
}

impl<T: TaskProgressSink + ?Sized> TaskProgressSink for Box<T> {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        (**self).make_progress(task_progress, current_sub_task, message)
    }
}

/// Discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl TaskProgressSink for NullProgressSink {
    fn make_progress(&self, _: i64, _: Option<&str>, _: Option<&str>) {}
}

/// Adapts a closure into a sink
pub struct FnProgressSink<F> {
    f: F,
}

impl<F> FnProgressSink<F>
where
    F: Fn(i64, Option<&str>, Option<&str>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> TaskProgressSink for FnProgressSink<F>
where
    F: Fn(i64, Option<&str>, Option<&str>) + Send + Sync,
{
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        (self.f)(task_progress, current_sub_task, message)
    }
}

impl<F> fmt::Debug for FnProgressSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProgressSink").finish_non_exhaustive()
    }
}

/// The shared-ownership handle sinks are composed through
pub type SharedProgressSink = Arc<dyn TaskProgressSink>;

/// A sink that drops everything, as a shared handle
pub fn null_sink() -> SharedProgressSink {
    Arc::new(NullProgressSink)
}
