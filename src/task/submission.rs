use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::progress::sink::{null_sink, SharedProgressSink, TaskProgressSink};
use crate::task::context::TaskContext;
use crate::task::descriptor::{LiveTask, TaskDescriptor};
use crate::task::TaskId;

/// Opt-in capability for bodies that report progress.
///
/// The manager hands over the task's sink before the body is queued.
pub trait ProvidesTaskProgress: Send + Sync {
    fn set_task_progress_sink(&self, sink: SharedProgressSink);
}

/// Opt-in capability for bodies that want to see their own task
pub trait RequiresTaskInformation: Send + Sync {
    fn set_task_info(&self, info: TaskInfo);
}

/// A live view of a submitted task, handed to the body that runs it
#[derive(Clone)]
pub struct TaskInfo {
    task: Arc<LiveTask>,
}

impl TaskInfo {
    pub(crate) fn new(task: Arc<LiveTask>) -> Self {
        Self { task }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.task_id()
    }

    /// Whether someone asked this task to stop. Long bodies should poll this.
    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    pub fn snapshot(&self) -> TaskDescriptor {
        self.task.snapshot()
    }
}

impl fmt::Debug for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInfo").field("task_id", &self.task_id()).finish()
    }
}

/// Holds the sink a manager installs. Reports made before installation are dropped.
#[derive(Default)]
pub struct ProgressSinkSlot {
    sink: OnceLock<SharedProgressSink>,
}

impl ProgressSinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> SharedProgressSink {
        self.sink.get().cloned().unwrap_or_else(null_sink)
    }

    pub fn is_installed(&self) -> bool {
        self.sink.get().is_some()
    }
}

impl ProvidesTaskProgress for ProgressSinkSlot {
    fn set_task_progress_sink(&self, sink: SharedProgressSink) {
        let _ = self.sink.set(sink);
    }
}

impl TaskProgressSink for ProgressSinkSlot {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        if let Some(sink) = self.sink.get() {
            sink.make_progress(task_progress, current_sub_task, message);
        }
    }
}

/// Holds the [`TaskInfo`] a manager installs
#[derive(Default)]
pub struct TaskInfoSlot {
    info: OnceLock<TaskInfo>,
}

impl TaskInfoSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&TaskInfo> {
        self.info.get()
    }

    /// False until installed
    pub fn is_cancelled(&self) -> bool {
        self.info.get().map_or(false, TaskInfo::is_cancelled)
    }
}

impl RequiresTaskInformation for TaskInfoSlot {
    fn set_task_info(&self, info: TaskInfo) {
        let _ = self.info.set(info);
    }
}

pub(crate) type Callable<V> = Box<dyn FnOnce() -> anyhow::Result<V> + Send + 'static>;

/// Everything needed to submit one task.
///
/// ```ignore
/// let slot = Arc::new(ProgressSinkSlot::new());
/// let sink = slot.clone();
/// let body = move || {
///     sink.make_progress(50, None, None);
///     Ok(())
/// };
/// let submission = TaskSubmission::new(body, "Reindex", ctx)
///     .submitted_by("admin")
///     .with_progress(slot);
/// ```
pub struct TaskSubmission<V> {
    pub(crate) callable: Callable<V>,
    pub(crate) description: String,
    pub(crate) context: Arc<dyn TaskContext>,
    pub(crate) user_name: Option<String>,
    pub(crate) cancellable: bool,
    pub(crate) progress: Option<Arc<dyn ProvidesTaskProgress>>,
    pub(crate) task_info: Option<Arc<dyn RequiresTaskInformation>>,
}

impl<V: Send + Sync + 'static> TaskSubmission<V> {
    pub fn new<F>(
        callable: F,
        description: impl Into<String>,
        context: Arc<dyn TaskContext>,
    ) -> Self
    where
        F: FnOnce() -> anyhow::Result<V> + Send + 'static,
    {
        Self {
            callable: Box::new(callable),
            description: description.into(),
            context,
            user_name: None,
            cancellable: false,
            progress: None,
            task_info: None,
        }
    }

    pub fn submitted_by(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProvidesTaskProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_task_info(mut self, task_info: Arc<dyn RequiresTaskInformation>) -> Self {
        self.task_info = Some(task_info);
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<V> fmt::Debug for TaskSubmission<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSubmission")
            .field("description", &self.description)
            .field("context", &self.context)
            .field("user_name", &self.user_name)
            .field("cancellable", &self.cancellable)
            .field("progress", &self.progress.is_some())
            .field("task_info", &self.task_info.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Ctx;

    impl TaskContext for Ctx {
        fn build_progress_url(&self, task_id: TaskId) -> String {
            format!("/progress/{}", task_id)
        }
    }

    #[test]
    fn test_progress_slot_forwards_after_install() {
        let slot = ProgressSinkSlot::new();
        slot.make_progress(5, None, None);
        assert!(!slot.is_installed());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        slot.set_task_progress_sink(Arc::new(crate::progress::sink::FnProgressSink::new(
            move |p, _, _| record.lock().push(p),
        )));
        slot.make_progress(40, None, None);
        slot.sink().make_progress(60, None, None);

        assert_eq!(*seen.lock(), vec![40, 60]);
    }

    #[test]
    fn test_task_info_slot_sees_cancellation() {
        let slot = TaskInfoSlot::new();
        assert!(!slot.is_cancelled());

        let task = LiveTask::new(7, "Export", Arc::new(Ctx), None, None, true);
        slot.set_task_info(TaskInfo::new(task.clone()));
        assert_eq!(slot.get().map(TaskInfo::task_id), Some(7));

        task.set_cancelled(true);
        assert!(slot.is_cancelled());
    }

    #[test]
    fn test_submission_builder() {
        let submission = TaskSubmission::new(|| Ok(1u8), "Bulk move", Arc::new(Ctx))
            .submitted_by("fred")
            .cancellable(true)
            .with_task_info(Arc::new(TaskInfoSlot::new()));

        assert_eq!(submission.description(), "Bulk move");
        assert_eq!(submission.user_name.as_deref(), Some("fred"));
        assert!(submission.cancellable);
        assert!(submission.progress.is_none());
        assert!(submission.task_info.is_some());
    }
}
