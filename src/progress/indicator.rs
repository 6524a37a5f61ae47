use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::progress::event::TaskProgressEvent;
use crate::progress::sink::TaskProgressSink;
use crate::task::descriptor::LiveTask;
use crate::task::TaskId;

/// Notified each time a task reports progress
pub trait TaskProgressListener: Send + Sync {
    fn on_progress_made(&self, event: &TaskProgressEvent);
}

/// Read side of a task's progress
pub trait TaskProgressIndicator: Send + Sync {
    fn last_progress_event(&self) -> Option<TaskProgressEvent>;

    fn add_listener(&self, listener: Arc<dyn TaskProgressListener>);

    fn remove_listener(&self, listener: &Arc<dyn TaskProgressListener>);

    /// A channel that always holds the latest event
    fn subscribe(&self) -> watch::Receiver<Option<TaskProgressEvent>>;
}

/// Turns raw sink reports into [`TaskProgressEvent`]s for one task.
///
/// It is handed to the task body as its sink and exposed on the task's
/// descriptor as its indicator.
pub struct TaskProgressAdapter {
    task: OnceLock<Weak<LiveTask>>,
    listeners: RwLock<Vec<Arc<dyn TaskProgressListener>>>,
    latest: watch::Sender<Option<TaskProgressEvent>>,
}

impl TaskProgressAdapter {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            task: OnceLock::new(),
            listeners: RwLock::new(Vec::new()),
            latest,
        }
    }

    /// Bind the adapter to the task it reports for. Only the first call has an effect.
    pub fn bind(&self, task: &Arc<LiveTask>) {
        let _ = self.task.set(Arc::downgrade(task));
    }

    fn task_timing(&self) -> (TaskId, Duration) {
        match self.task.get().and_then(Weak::upgrade) {
            Some(task) => (task.task_id(), task.elapsed_run_time()),
            None => (0, Duration::ZERO),
        }
    }
}

impl Default for TaskProgressAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskProgressSink for TaskProgressAdapter {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        let (task_id, elapsed) = self.task_timing();
        let event =
            TaskProgressEvent::new(task_id, elapsed, task_progress, current_sub_task, message);

        self.latest.send_replace(Some(event.clone()));

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_progress_made(&event);
        }
    }
}

impl TaskProgressIndicator for TaskProgressAdapter {
    fn last_progress_event(&self) -> Option<TaskProgressEvent> {
        self.latest.borrow().clone()
    }

    fn add_listener(&self, listener: Arc<dyn TaskProgressListener>) {
        self.listeners.write().push(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn TaskProgressListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn subscribe(&self) -> watch::Receiver<Option<TaskProgressEvent>> {
        self.latest.subscribe()
    }
}

impl fmt::Debug for TaskProgressAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskProgressAdapter")
            .field("last_event", &self.last_progress_event())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder(Mutex<Vec<i64>>);

    impl TaskProgressListener for Recorder {
        fn on_progress_made(&self, event: &TaskProgressEvent) {
            self.0.lock().push(event.task_progress);
        }
    }

    #[test]
    fn test_unbound_adapter_records_events() {
        let adapter = TaskProgressAdapter::new();
        assert!(adapter.last_progress_event().is_none());

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let listener: Arc<dyn TaskProgressListener> = recorder.clone();
        adapter.add_listener(listener.clone());

        adapter.make_progress(10, Some("Copying"), Some("1 of 10"));
        adapter.make_progress(20, None, None);
        adapter.remove_listener(&listener);
        adapter.make_progress(30, None, None);

        assert_eq!(*recorder.0.lock(), vec![10, 20]);
        let last = adapter.last_progress_event().unwrap();
        assert_eq!(last.task_progress, 30);
        assert_eq!(last.task_id, 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_event() {
        let adapter = Arc::new(TaskProgressAdapter::new());
        let mut rx = adapter.subscribe();

        let reporter = adapter.clone();
        std::thread::spawn(move || reporter.make_progress(55, Some("Indexing"), None));

        rx.changed().await.unwrap();
        let event = rx.borrow().clone().unwrap();
        assert_eq!(event.task_progress, 55);
        assert_eq!(event.current_sub_task.as_deref(), Some("Indexing"));
    }
}
