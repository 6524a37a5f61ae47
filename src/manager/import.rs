use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::any::TaskResult;
use crate::core::config::ImportTaskManagerConfig;
use crate::core::errors::{Result, TaskError};
use crate::executor::{ForkedExecutor, NamedThreadFactory};
use crate::progress::indicator::TaskProgressAdapter;
use crate::task::context::TaskContext;
use crate::task::descriptor::{LiveTask, TaskDescriptor};
use crate::task::future::TaskFuture;
use crate::task::submission::ProvidesTaskProgress;
use crate::task::TaskId;

/// The one context every import task shares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportTaskContext;

impl TaskContext for ImportTaskContext {
    fn build_progress_url(&self, task_id: TaskId) -> String {
        format!("/importprogress?taskId={}", task_id)
    }
}

struct CurrentTask {
    task: Arc<LiveTask>,
    future: Arc<TaskFuture>,
}

/// Runs data-import tasks one at a time on a private thread.
///
/// Keeps no state outside itself: no shared descriptor table, no cluster
/// messaging, no thread-local hooks. The caches those rely on may be rebuilt
/// while an import runs.
pub struct ImportTaskManager {
    executor: ForkedExecutor,
    next_id: AtomicU64,
    current: Mutex<Option<CurrentTask>>,
}

impl ImportTaskManager {
    pub fn new() -> Result<Self> {
        Self::with_config(ImportTaskManagerConfig::default())
    }

    pub fn with_config(config: ImportTaskManagerConfig) -> Result<Self> {
        if config.thread_name_prefix.trim().is_empty() {
            return Err(TaskError::configuration("thread_name_prefix cannot be empty"));
        }
        let factory = Arc::new(NamedThreadFactory::new(config.thread_name_prefix));
        Ok(Self {
            executor: ForkedExecutor::new(1, factory)?,
            next_id: AtomicU64::new(1),
            current: Mutex::new(None),
        })
    }

    /// Start `callable` unless an import is already in flight
    pub fn submit_task<V, F>(
        &self,
        callable: F,
        task_name: impl Into<String>,
        progress: Option<Arc<dyn ProvidesTaskProgress>>,
    ) -> Result<TaskDescriptor>
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<V> + Send + 'static,
    {
        let mut current = self.current.lock();
        if let Some(existing) = current.as_ref().filter(|c| !c.task.is_finished()) {
            debug!(task_id = existing.task.task_id(), "An import task is already executing");
            return Err(TaskError::already_executing(existing.task.snapshot()));
        }

        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let adapter = progress.as_ref().map(|_| Arc::new(TaskProgressAdapter::new()));
        let task = LiveTask::new(
            task_id,
            task_name,
            Arc::new(ImportTaskContext),
            None,
            adapter.clone(),
            false,
        );
        if let (Some(progress), Some(adapter)) = (progress, adapter) {
            progress.set_task_progress_sink(adapter);
        }

        let result_slot = task.clone();
        let future = Arc::new(TaskFuture::new(task_id, move || {
            let value = callable()?;
            result_slot.set_result(TaskResult::new(value));
            Ok(())
        }));

        let work_task = task.clone();
        let work_future = future.clone();
        self.executor.execute(Box::new(move || {
            if let Err(e) = work_task.set_started_timestamp() {
                warn!(
                    task_id = work_task.task_id(),
                    error = %e,
                    "Could not mark import task started"
                );
            }
            work_future.run_then(|| {
                if let Err(e) = work_task.set_finished_timestamp() {
                    warn!(
                        task_id = work_task.task_id(),
                        error = %e,
                        "Could not mark import task finished"
                    );
                }
            });
        }))?;

        let snapshot = task.snapshot();
        *current = Some(CurrentTask { task, future });
        Ok(snapshot)
    }

    /// The most recent import task, finished or not
    pub fn get_task(&self) -> Option<TaskDescriptor> {
        self.current.lock().as_ref().map(|c| c.task.snapshot())
    }

    /// Block until the current import completes. Cancellation counts as completion.
    pub fn wait_until_task_completes(&self) -> Result<()> {
        let future = match self.current.lock().as_ref() {
            Some(current) => current.future.clone(),
            None => return Ok(()),
        };
        match future.get() {
            Err(TaskError::Cancelled { .. }) => Ok(()),
            other => other,
        }
    }

    pub fn shutdown_now(&self) {
        let drained = self.executor.shutdown_now();
        if let Some(current) = self.current.lock().as_ref() {
            current.future.cancel_if_pending();
        }
        // The drained work only stamps the descriptor once its future is cancelled
        for work in drained {
            work();
        }
        info!("Import task manager shut down");
    }

    /// Stop accepting imports and wait for the current one; false on timeout
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.executor.shutdown();
        let terminated = self.executor.await_termination(timeout);
        if !terminated {
            if let Some(task) = self.get_task() {
                warn!(
                    "Shutting down import task manager while task {} - {} is still executing",
                    task.task_id(),
                    task.description()
                );
            }
        }
        terminated
    }
}

impl fmt::Debug for ImportTaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportTaskManager")
            .field("executor", &self.executor)
            .field("current", &self.get_task().map(|t| t.task_id()))
            .finish()
    }
}
