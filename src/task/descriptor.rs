use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::any::TaskResult;
use crate::core::errors::{Result, TaskError};
use crate::progress::indicator::{TaskProgressAdapter, TaskProgressIndicator};
use crate::task::context::TaskContext;
use crate::task::matcher::TaskMatcher;
use crate::task::TaskId;

/// A wall-clock time paired with a monotonic instant, so elapsed run time
/// never goes backwards when the system clock is adjusted.
#[derive(Debug, Clone, Copy)]
struct Stamp {
    at: DateTime<Utc>,
    instant: Instant,
}

impl Stamp {
    fn now() -> Self {
        Self {
            at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TaskState {
    started: Option<Stamp>,
    finished: Option<Stamp>,
    result: Option<TaskResult>,
    cancelled: bool,
}

fn elapsed_between(started: Option<Stamp>, finished: Option<Stamp>) -> Duration {
    match (started, finished) {
        (Some(started), Some(finished)) => {
            finished.instant.saturating_duration_since(started.instant)
        }
        (Some(started), None) => started.instant.elapsed(),
        _ => Duration::ZERO,
    }
}

/// The canonical, mutable record of a submitted task.
///
/// Owned by a task manager and shared with the worker that runs the task.
/// All mutable state sits behind one monitor; callers only ever receive
/// [`TaskDescriptor`] snapshots copied under that monitor.
pub struct LiveTask {
    task_id: TaskId,
    description: String,
    user_name: Option<String>,
    submitted: DateTime<Utc>,
    context: Arc<dyn TaskContext>,
    progress_url: String,
    cancellable: bool,
    indicator: Option<Arc<TaskProgressAdapter>>,
    state: Mutex<TaskState>,
}

impl LiveTask {
    pub fn new(
        task_id: TaskId,
        description: impl Into<String>,
        context: Arc<dyn TaskContext>,
        user_name: Option<String>,
        indicator: Option<Arc<TaskProgressAdapter>>,
        cancellable: bool,
    ) -> Arc<Self> {
        let progress_url = context.build_progress_url(task_id);
        let task = Arc::new(Self {
            task_id,
            description: description.into(),
            user_name,
            submitted: Utc::now(),
            context,
            progress_url,
            cancellable,
            indicator,
            state: Mutex::new(TaskState::default()),
        });
        if let Some(indicator) = &task.indicator {
            indicator.bind(&task);
        }
        task
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn task_context(&self) -> &Arc<dyn TaskContext> {
        &self.context
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    pub fn progress_adapter(&self) -> Option<&Arc<TaskProgressAdapter>> {
        self.indicator.as_ref()
    }

    pub fn set_started_timestamp(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.started.is_some() {
            return Err(TaskError::illegal_state(format!(
                "task {} has already been started",
                self.task_id
            )));
        }
        state.started = Some(Stamp::now());
        Ok(())
    }

    pub fn set_finished_timestamp(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.started.is_none() {
            return Err(TaskError::illegal_state(format!(
                "task {} cannot finish before it has started",
                self.task_id
            )));
        }
        if state.finished.is_some() {
            return Err(TaskError::illegal_state(format!(
                "task {} has already finished",
                self.task_id
            )));
        }
        state.finished = Some(Stamp::now());
        Ok(())
    }

    pub fn set_result(&self, result: TaskResult) {
        self.state.lock().result = Some(result);
    }

    pub fn set_cancelled(&self, cancelled: bool) {
        self.state.lock().cancelled = cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished.is_some()
    }

    pub fn elapsed_run_time(&self) -> Duration {
        let state = self.state.lock();
        elapsed_between(state.started, state.finished)
    }

    /// An immutable copy of the current state
    pub fn snapshot(&self) -> TaskDescriptor {
        let state = self.state.lock().clone();
        TaskDescriptor {
            task_id: self.task_id,
            description: self.description.clone(),
            user_name: self.user_name.clone(),
            submitted: self.submitted,
            context: self.context.clone(),
            progress_url: self.progress_url.clone(),
            cancellable: self.cancellable,
            indicator: self
                .indicator
                .clone()
                .map(|i| i as Arc<dyn TaskProgressIndicator>),
            started: state.started,
            finished: state.finished,
            result: state.result,
            cancelled: state.cancelled,
        }
    }

    /// Evaluate `matcher` against a consistent view of this task
    pub fn matches(&self, matcher: &dyn TaskMatcher) -> bool {
        matcher.matches(&self.snapshot())
    }
}

impl fmt::Debug for LiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.snapshot(), f)
    }
}

/// A point-in-time snapshot of a task.
///
/// Snapshots never change after they are taken; re-query the manager to
/// observe newer state.
#[derive(Clone)]
pub struct TaskDescriptor {
    task_id: TaskId,
    description: String,
    user_name: Option<String>,
    submitted: DateTime<Utc>,
    context: Arc<dyn TaskContext>,
    progress_url: String,
    cancellable: bool,
    indicator: Option<Arc<dyn TaskProgressIndicator>>,
    started: Option<Stamp>,
    finished: Option<Stamp>,
    result: Option<TaskResult>,
    cancelled: bool,
}

impl TaskDescriptor {
    /// Snapshot an optional live task; `None` stays `None`
    pub fn copy_of(task: Option<&LiveTask>) -> Option<TaskDescriptor> {
        task.map(LiveTask::snapshot)
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn submitted_timestamp(&self) -> DateTime<Utc> {
        self.submitted
    }

    pub fn started_timestamp(&self) -> Option<DateTime<Utc>> {
        self.started.map(|s| s.at)
    }

    pub fn finished_timestamp(&self) -> Option<DateTime<Utc>> {
        self.finished.map(|s| s.at)
    }

    /// Zero before start, growing while running, fixed once finished
    pub fn elapsed_run_time(&self) -> Duration {
        elapsed_between(self.started, self.finished)
    }

    pub fn task_context(&self) -> &Arc<dyn TaskContext> {
        &self.context
    }

    pub fn has_context(&self, context: &dyn TaskContext) -> bool {
        *self.context.as_ref() == *context
    }

    pub fn progress_url(&self) -> &str {
        &self.progress_url
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The task's return value, if it finished successfully and is a `V`
    pub fn result<V: 'static>(&self) -> Option<&V> {
        self.result.as_ref().and_then(|r| r.downcast_ref::<V>())
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn result_type_name(&self) -> Option<&'static str> {
        self.result.as_ref().map(|r| r.type_info().name())
    }

    /// Present only for tasks that opted in to progress reporting
    pub fn task_progress_indicator(&self) -> Option<&Arc<dyn TaskProgressIndicator>> {
        self.indicator.as_ref()
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("task_id", &self.task_id)
            .field("description", &self.description)
            .field("user_name", &self.user_name)
            .field("context", &self.context)
            .field("submitted", &self.submitted)
            .field("started", &self.started_timestamp())
            .field("finished", &self.finished_timestamp())
            .field("cancellable", &self.cancellable)
            .field("cancelled", &self.cancelled)
            .field("result", &self.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct ReindexContext;

    impl TaskContext for ReindexContext {
        fn build_progress_url(&self, task_id: TaskId) -> String {
            format!("/admin/reindex?taskId={}", task_id)
        }
    }

    fn live_task(id: TaskId) -> Arc<LiveTask> {
        LiveTask::new(id, "Reindex", Arc::new(ReindexContext), Some("admin".into()), None, true)
    }

    #[test]
    fn test_timestamps_set_once_and_in_order() {
        let task = live_task(1);

        assert!(matches!(task.set_finished_timestamp(), Err(TaskError::IllegalState(_))));
        task.set_started_timestamp().unwrap();
        assert!(task.set_started_timestamp().is_err());
        task.set_finished_timestamp().unwrap();
        assert!(task.set_finished_timestamp().is_err());
        assert!(task.is_finished());
    }

    #[test]
    fn test_snapshot_does_not_follow_live_task() {
        let task = live_task(2);
        task.set_started_timestamp().unwrap();
        let running = task.snapshot();

        task.set_result(TaskResult::new(17u32));
        task.set_finished_timestamp().unwrap();
        let finished = task.snapshot();

        assert!(!running.is_finished());
        assert!(running.finished_timestamp().is_none());
        assert!(running.result::<u32>().is_none());
        assert!(finished.is_finished());
        assert_eq!(finished.result::<u32>(), Some(&17));
        assert_eq!(finished.progress_url(), "/admin/reindex?taskId=2");
        assert_eq!(finished.user_name(), Some("admin"));
    }

    #[test]
    fn test_elapsed_run_time() {
        let task = live_task(3);
        assert_eq!(task.snapshot().elapsed_run_time(), Duration::ZERO);

        task.set_started_timestamp().unwrap();
        let snapshot = task.snapshot();
        let first = snapshot.elapsed_run_time();
        std::thread::sleep(Duration::from_millis(5));
        assert!(snapshot.elapsed_run_time() >= first);

        task.set_finished_timestamp().unwrap();
        let done = task.snapshot();
        let fixed = done.elapsed_run_time();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(done.elapsed_run_time(), fixed);
        assert_eq!(task.elapsed_run_time(), fixed);
    }

    #[test]
    fn test_copy_of_none() {
        assert!(TaskDescriptor::copy_of(None).is_none());
        let task = live_task(4);
        assert_eq!(TaskDescriptor::copy_of(Some(task.as_ref())).unwrap().task_id(), 4);
    }
}
