use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::any::TaskResult;
use crate::core::config::TaskManagerConfig;
use crate::core::errors::{Result, TaskError};
use crate::executor::{ForkedExecutor, NamedThreadFactory, ThreadFactory, Work};
use crate::manager::cluster::{
    ClusterMessage, ClusterMessageListener, LocalMessageHub, MessageBus, NodeId,
};
use crate::manager::counter::BlockingCounter;
use crate::manager::sequence::{AtomicSequence, IdSequence};
use crate::manager::thread_local::{NoopThreadLocalHook, ThreadLocalHook};
use crate::progress::event::TaskProgressEvent;
use crate::progress::indicator::{TaskProgressAdapter, TaskProgressIndicator, TaskProgressListener};
use crate::task::context::TaskContext;
use crate::task::descriptor::{LiveTask, TaskDescriptor};
use crate::task::future::TaskFuture;
use crate::task::matcher::TaskMatcher;
use crate::task::submission::{TaskInfo, TaskSubmission};
use crate::task::TaskId;

/// Descriptor cache, keyed by task id. Managers on different nodes that share
/// one table see each other's tasks.
pub type TaskTable = Arc<DashMap<TaskId, Arc<LiveTask>>>;

pub fn new_task_table() -> TaskTable {
    Arc::new(DashMap::new())
}

struct Inner {
    config: TaskManagerConfig,
    tasks: TaskTable,
    futures: DashMap<TaskId, Arc<TaskFuture>>,
    // Held across the context-conflict check and the insert
    admission: Mutex<()>,
    executor: RwLock<ForkedExecutor>,
    thread_factory: Arc<dyn ThreadFactory>,
    sequence: Arc<dyn IdSequence>,
    bus: Arc<dyn MessageBus>,
    hook: Arc<dyn ThreadLocalHook>,
    active: BlockingCounter,
    refresher: Arc<dyn TaskProgressListener>,
}

impl Inner {
    fn new_executor(
        config: &TaskManagerConfig,
        factory: &Arc<dyn ThreadFactory>,
    ) -> Result<ForkedExecutor> {
        ForkedExecutor::new(config.max_threads, factory.clone())
    }

    fn executor(&self) -> ForkedExecutor {
        self.executor.read().clone()
    }

    fn live_task(&self, task_id: TaskId) -> Option<Arc<LiveTask>> {
        self.tasks.get(&task_id).map(|entry| entry.value().clone())
    }

    fn future(&self, task_id: TaskId) -> Option<Arc<TaskFuture>> {
        self.futures.get(&task_id).map(|entry| entry.value().clone())
    }

    /// Every task in the table, ordered by id
    fn tasks_by_id(&self) -> Vec<Arc<LiveTask>> {
        let mut tasks: Vec<Arc<LiveTask>> =
            self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(|task| task.task_id());
        tasks
    }

    fn find_first(&self, matcher: &dyn TaskMatcher) -> Option<TaskDescriptor> {
        self.tasks_by_id()
            .into_iter()
            .map(|task| task.snapshot())
            .find(|snapshot| matcher.matches(snapshot))
    }

    fn find_all(&self, matcher: &dyn TaskMatcher) -> Vec<TaskDescriptor> {
        self.tasks_by_id()
            .into_iter()
            .map(|task| task.snapshot())
            .filter(|snapshot| matcher.matches(snapshot))
            .collect()
    }

    fn find_live_with_context(&self, context: &dyn TaskContext) -> Option<TaskDescriptor> {
        self.find_first(&|d: &TaskDescriptor| !d.is_finished() && d.has_context(context))
    }

    /// Write the task back to its table entry. In-process the entry already
    /// shares this `LiveTask`, so only a table that copies values sees a
    /// difference. Removed tasks stay removed.
    fn refresh(&self, task: &Arc<LiveTask>) {
        if let Some(mut entry) = self.tasks.get_mut(&task.task_id()) {
            *entry.value_mut() = task.clone();
        }
    }

    fn cancel_if_running_locally(&self, task_id: TaskId) -> bool {
        let Some(future) = self.future(task_id) else {
            return false;
        };
        future.cancel();
        if let Some(task) = self.live_task(task_id) {
            task.set_cancelled(true);
            self.refresh(&task);
        }
        debug!(task_id, "Cancelled local task");
        true
    }

    fn decorate(self: &Arc<Self>, task: Arc<LiveTask>, future: Arc<TaskFuture>) -> Work {
        let inner = Arc::clone(self);
        Box::new(move || inner.run_decorated(&task, &future))
    }

    fn run_decorated(&self, task: &Arc<LiveTask>, future: &TaskFuture) {
        if future.is_done() {
            // Cancelled before a worker ever picked it up
            self.mark_started(task);
            self.mark_finished(task);
            return;
        }

        self.hook.pre_call(task.user_name());
        self.mark_started(task);
        self.active.up();

        // Waiters wake only after the descriptor is stamped finished
        future.run_then(|| {
            self.mark_finished(task);
            self.active.down();
            for leaked in self.hook.post_call() {
                error!(
                    task_id = task.task_id(),
                    "Task '{}' left {} after completion",
                    task.description(),
                    leaked
                );
            }
        });
    }

    fn mark_started(&self, task: &Arc<LiveTask>) {
        if let Err(e) = task.set_started_timestamp() {
            warn!(task_id = task.task_id(), error = %e, "Could not mark task started");
        }
        self.refresh(task);
    }

    fn mark_finished(&self, task: &Arc<LiveTask>) {
        if let Err(e) = task.set_finished_timestamp() {
            warn!(task_id = task.task_id(), error = %e, "Could not mark task finished");
        }
        self.refresh(task);
    }

    fn log_running_tasks_on_shutdown(&self) {
        let running: Vec<Arc<LiveTask>> = self
            .tasks_by_id()
            .into_iter()
            .filter(|task| !task.is_finished() && self.futures.contains_key(&task.task_id()))
            .collect();
        if running.is_empty() {
            return;
        }

        warn!("Shutting down task manager while the following tasks are still executing:");
        for task in running.iter().take(self.config.shutdown_log_limit) {
            let progress = task
                .progress_adapter()
                .and_then(|adapter| adapter.last_progress_event())
                .filter(TaskProgressEvent::is_progress_known);
            match progress {
                Some(event) => warn!(
                    "Task Id {} - {}% complete - {}",
                    task.task_id(),
                    event.task_progress,
                    task.description()
                ),
                None => warn!("Task Id {} - {}", task.task_id(), task.description()),
            }
        }
        if running.len() > self.config.shutdown_log_limit {
            warn!("... and {} more", running.len() - self.config.shutdown_log_limit);
        }
    }
}

/// Refreshes a task's cached descriptor whenever it reports progress
struct CacheRefresher {
    inner: Weak<Inner>,
}

impl TaskProgressListener for CacheRefresher {
    fn on_progress_made(&self, event: &TaskProgressEvent) {
        if let Some(inner) = self.inner.upgrade() {
            if let Some(task) = inner.live_task(event.task_id) {
                inner.refresh(&task);
            }
        }
    }
}

struct CancelListener {
    inner: Weak<Inner>,
}

impl ClusterMessageListener for CancelListener {
    fn receive(&self, message: &ClusterMessage, sender: NodeId) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match message {
            ClusterMessage::CancelTask(task_id) => {
                if inner.cancel_if_running_locally(*task_id) {
                    info!(
                        task_id,
                        sender = %sender,
                        "Cancelled task at the request of another node"
                    );
                }
            }
        }
    }
}

/// Runs long tasks in the background and tracks them until removed.
///
/// At most one unfinished task may exist per [`TaskContext`]. Every query
/// returns a [`TaskDescriptor`] snapshot that never changes afterwards.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// A standalone manager with the default configuration
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> TaskManagerBuilder {
        TaskManagerBuilder::default()
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.inner.config
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.bus.node_id()
    }

    pub fn task_table(&self) -> &TaskTable {
        &self.inner.tasks
    }

    /// Submit `callable` to run in the background.
    ///
    /// Fails with [`TaskError::AlreadyExecuting`] if an unfinished task with
    /// an equal context exists.
    pub fn submit_task<V, F>(
        &self,
        callable: F,
        description: impl Into<String>,
        context: Arc<dyn TaskContext>,
        cancellable: bool,
    ) -> Result<TaskDescriptor>
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<V> + Send + 'static,
    {
        self.submit(TaskSubmission::new(callable, description, context).cancellable(cancellable))
    }

    pub fn submit<V: Send + Sync + 'static>(
        &self,
        submission: TaskSubmission<V>,
    ) -> Result<TaskDescriptor> {
        let TaskSubmission {
            callable,
            description,
            context,
            user_name,
            cancellable,
            progress,
            task_info,
        } = submission;

        let task_id = self.inner.sequence.next_id();
        debug!(task_id, "Acquired new task id");

        let adapter = progress.as_ref().map(|_| Arc::new(TaskProgressAdapter::new()));
        let task = LiveTask::new(
            task_id,
            description,
            context,
            user_name,
            adapter.clone(),
            cancellable,
        );

        let result_slot = task.clone();
        let future = Arc::new(TaskFuture::new(task_id, move || {
            let value = callable()?;
            result_slot.set_result(TaskResult::new(value));
            Ok(())
        }));
        let work = self.inner.decorate(task.clone(), future.clone());

        {
            let _admission = self.inner.admission.lock();

            // A task finishing right after this check can still block the submit; callers retry.
            let context = task.task_context().as_ref();
            if let Some(existing) = self.inner.find_live_with_context(context) {
                debug!(
                    task_id = existing.task_id(),
                    description = existing.description(),
                    "A task with this context is already executing"
                );
                return Err(TaskError::already_executing(existing));
            }

            if let (Some(progress), Some(adapter)) = (&progress, &adapter) {
                adapter.add_listener(self.inner.refresher.clone());
                progress.set_task_progress_sink(adapter.clone());
            }
            if let Some(task_info) = &task_info {
                task_info.set_task_info(TaskInfo::new(task.clone()));
            }

            self.inner.tasks.insert(task_id, task.clone());
            self.inner.futures.insert(task_id, future);
            if let Err(e) = self.inner.executor().execute(work) {
                self.inner.tasks.remove(&task_id);
                self.inner.futures.remove(&task_id);
                return Err(e);
            }
        }

        Ok(task.snapshot())
    }

    /// Ask a task to stop. Marks it cancelled wherever it runs; a task on
    /// another node is reached through the message bus.
    pub fn cancel_task(&self, task_id: TaskId) -> Result<()> {
        let task = self
            .inner
            .live_task(task_id)
            .ok_or(TaskError::TaskNotFound { task_id })?;
        if !task.is_cancellable() {
            return Err(TaskError::NotCancellable { task_id });
        }

        match self.inner.future(task_id) {
            Some(future) => {
                future.cancel();
            }
            None => {
                info!(
                    task_id,
                    node = %self.node_id(),
                    "Task is not running locally, broadcasting cancellation"
                );
                self.inner.bus.broadcast(ClusterMessage::CancelTask(task_id));
            }
        }

        task.set_cancelled(true);
        self.inner.refresh(&task);
        Ok(())
    }

    /// Cancel the task's future if this node holds it; false otherwise
    pub fn cancel_task_if_running_locally(&self, task_id: TaskId) -> bool {
        self.inner.cancel_if_running_locally(task_id)
    }

    pub fn is_cancellable(&self, task_id: TaskId) -> Result<bool> {
        self.inner
            .live_task(task_id)
            .map(|task| task.is_cancellable())
            .ok_or(TaskError::TaskNotFound { task_id })
    }

    pub fn is_cancelled(&self, task_id: TaskId) -> Result<bool> {
        self.inner
            .live_task(task_id)
            .map(|task| task.is_cancelled())
            .ok_or(TaskError::TaskNotFound { task_id })
    }

    pub fn get_task(&self, task_id: TaskId) -> Option<TaskDescriptor> {
        TaskDescriptor::copy_of(self.inner.live_task(task_id).as_deref())
    }

    /// The unfinished task with an equal context, if any
    pub fn get_live_task(&self, context: &dyn TaskContext) -> Option<TaskDescriptor> {
        self.inner.find_live_with_context(context)
    }

    pub fn get_all_tasks(&self) -> Vec<TaskDescriptor> {
        self.inner.tasks_by_id().iter().map(|task| task.snapshot()).collect()
    }

    pub fn get_live_tasks(&self) -> Vec<TaskDescriptor> {
        self.inner.find_all(&|d: &TaskDescriptor| !d.is_finished())
    }

    pub fn find_first_task(&self, matcher: &dyn TaskMatcher) -> Option<TaskDescriptor> {
        self.inner.find_first(matcher)
    }

    pub fn find_tasks(&self, matcher: &dyn TaskMatcher) -> Vec<TaskDescriptor> {
        self.inner.find_all(matcher)
    }

    /// Forget a task. Work that is already running carries on.
    pub fn remove_task(&self, task_id: TaskId) -> Option<TaskDescriptor> {
        self.inner.futures.remove(&task_id);
        self.inner.tasks.remove(&task_id).map(|(_, task)| task.snapshot())
    }

    pub fn has_task_with_context(&self, context: &dyn TaskContext) -> bool {
        self.inner
            .find_first(&|d: &TaskDescriptor| d.has_context(context))
            .is_some()
    }

    pub fn has_live_task_with_context(&self, context: &dyn TaskContext) -> bool {
        self.inner.find_live_with_context(context).is_some()
    }

    /// Replace a shut down executor so the manager accepts work again
    pub fn start(&self) -> Result<()> {
        let mut executor = self.inner.executor.write();
        if executor.is_shutdown() {
            *executor = Inner::new_executor(&self.inner.config, &self.inner.thread_factory)?;
            info!(max_threads = self.inner.config.max_threads, "Task manager started");
        }
        Ok(())
    }

    /// Stop accepting work and wait up to `timeout` for running and queued
    /// tasks. Returns whether everything finished; tasks still running are logged.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        let executor = self.inner.executor();
        executor.shutdown();
        let terminated = executor.await_termination(timeout);
        if !terminated {
            self.inner.log_running_tasks_on_shutdown();
        }
        terminated
    }

    /// Stop accepting work, interrupt running workers and cancel everything
    /// still queued. Returns the ids of the tasks that never started.
    pub fn shutdown_now(&self) -> Vec<TaskId> {
        let drained = self.inner.executor().shutdown_now();

        let mut cancelled: Vec<TaskId> = self
            .inner
            .futures
            .iter()
            .filter(|entry| entry.value().cancel_if_pending())
            .map(|entry| *entry.key())
            .collect();
        cancelled.sort_unstable();

        // Their futures are cancelled, so this only stamps the descriptors
        for work in drained {
            work();
        }

        self.inner.log_running_tasks_on_shutdown();
        cancelled
    }

    /// Wait until no task body is executing; false on timeout
    pub fn await_until_active_tasks_complete(&self, timeout: Duration) -> bool {
        self.inner.active.await_zero(timeout)
    }

    pub fn active_task_count(&self) -> usize {
        self.inner.active.count()
    }

    /// Block until the task completes. Cancellation counts as completion; a
    /// task body failure is returned.
    pub fn wait_until_task_completes(&self, task_id: TaskId) -> Result<()> {
        let Some(future) = self.inner.future(task_id) else {
            return Ok(());
        };
        match future.get() {
            Err(TaskError::Cancelled { .. }) => {
                debug!(task_id, "Task was cancelled while waiting for it");
                Ok(())
            }
            other => other,
        }
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("node_id", &self.node_id())
            .field("tasks", &self.inner.tasks.len())
            .field("executor", &self.inner.executor())
            .finish()
    }
}

/// Builder for [`TaskManager`]. Anything not supplied gets an in-process default.
#[derive(Default)]
pub struct TaskManagerBuilder {
    config: Option<TaskManagerConfig>,
    sequence: Option<Arc<dyn IdSequence>>,
    bus: Option<Arc<dyn MessageBus>>,
    hook: Option<Arc<dyn ThreadLocalHook>>,
    tasks: Option<TaskTable>,
    thread_factory: Option<Arc<dyn ThreadFactory>>,
}

impl TaskManagerBuilder {
    pub fn with_config(mut self, config: TaskManagerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_sequence(mut self, sequence: Arc<dyn IdSequence>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_message_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_thread_local_hook(mut self, hook: Arc<dyn ThreadLocalHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Share a descriptor table with other managers
    pub fn with_task_table(mut self, tasks: TaskTable) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.thread_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<TaskManager> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let thread_factory: Arc<dyn ThreadFactory> = match self.thread_factory {
            Some(factory) => factory,
            None => Arc::new(NamedThreadFactory::new(config.thread_name_prefix.clone())),
        };
        let executor = Inner::new_executor(&config, &thread_factory)?;
        let bus: Arc<dyn MessageBus> = match self.bus {
            Some(bus) => bus,
            None => LocalMessageHub::new().node(),
        };
        let sequence: Arc<dyn IdSequence> = match self.sequence {
            Some(sequence) => sequence,
            None => Arc::new(AtomicSequence::new()),
        };
        let hook: Arc<dyn ThreadLocalHook> = match self.hook {
            Some(hook) => hook,
            None => Arc::new(NoopThreadLocalHook),
        };
        let tasks = self.tasks.unwrap_or_else(new_task_table);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            tasks,
            futures: DashMap::new(),
            admission: Mutex::new(()),
            executor: RwLock::new(executor),
            thread_factory,
            sequence,
            bus: bus.clone(),
            hook,
            active: BlockingCounter::new(),
            refresher: Arc::new(CacheRefresher { inner: weak.clone() }),
            config,
        });
        bus.register_listener(Arc::new(CancelListener {
            inner: Arc::downgrade(&inner),
        }));

        info!(
            node = %bus.node_id(),
            max_threads = inner.config.max_threads,
            "Task manager started"
        );
        Ok(TaskManager { inner })
    }
}
