use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::Thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::core::errors::{Result, TaskError};
use crate::executor::thread_factory::ThreadFactory;

/// A unit of work handed to the executor
pub type Work = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static INTERRUPT_FLAG: RefCell<Option<Arc<AtomicBool>>> = RefCell::new(None);
}

/// Whether the executor running the current thread's work has asked it to stop.
///
/// Always false off an executor thread. Work that may run for a long time
/// should poll this alongside its task's cancelled flag.
pub fn is_interrupted() -> bool {
    INTERRUPT_FLAG.with(|flag| {
        flag.borrow()
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    })
}

struct RunningWorker {
    thread: Thread,
    interrupted: Arc<AtomicBool>,
}

#[derive(Default)]
struct ExecState {
    running: HashMap<u64, RunningWorker>,
    queue: VecDeque<Work>,
    next_worker_id: u64,
    shutdown: bool,
}

impl ExecState {
    fn is_terminated(&self) -> bool {
        self.shutdown && self.running.is_empty() && self.queue.is_empty()
    }
}

struct Inner {
    max_threads: usize,
    factory: Arc<dyn ThreadFactory>,
    state: Mutex<ExecState>,
    terminated: Condvar,
}

/// Work whose thread could not be spawned, handed back to the caller
struct SpawnFailure {
    error: TaskError,
    work: Option<Work>,
}

impl Inner {
    /// Start queued work, oldest first, until the cap is reached. Work whose
    /// thread fails to spawn goes back to the front of the queue.
    fn start_queued(self: &Arc<Self>, state: &mut ExecState) -> Result<()> {
        while state.running.len() < self.max_threads {
            let Some(work) = state.queue.pop_front() else {
                break;
            };
            if let Err(failure) = self.spawn_worker(state, work) {
                if let Some(work) = failure.work {
                    state.queue.push_front(work);
                }
                return Err(failure.error);
            }
        }
        Ok(())
    }

    fn spawn_worker(
        self: &Arc<Self>,
        state: &mut ExecState,
        work: Work,
    ) -> std::result::Result<(), SpawnFailure> {
        let id = state.next_worker_id;
        state.next_worker_id += 1;

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        let inner = Arc::clone(self);
        let pending = Arc::new(Mutex::new(Some(work)));
        let runnable = pending.clone();

        // The new thread cannot release its slot before we record it: that needs
        // the state lock we hold
        let spawned = self.factory.new_thread(Box::new(move || {
            let _slot = WorkerSlot { inner, id };
            INTERRUPT_FLAG.with(|f| *f.borrow_mut() = Some(flag));
            let work = runnable.lock().take();
            if let Some(work) = work {
                work();
            }
        }));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                return Err(SpawnFailure {
                    error: e.into(),
                    work: pending.lock().take(),
                });
            }
        };

        debug!(worker_id = id, thread = ?handle.thread().name(), "Started worker");
        state.running.insert(
            id,
            RunningWorker {
                thread: handle.thread().clone(),
                interrupted,
            },
        );
        Ok(())
    }

    fn finished_task(self: &Arc<Self>, id: u64) {
        let mut state = self.state.lock();
        state.running.remove(&id);
        if let Err(e) = self.start_queued(&mut state) {
            error!(
                error = %e,
                queued = state.queue.len(),
                "Failed to start queued work, keeping it queued"
            );
        }
        if state.is_terminated() {
            self.terminated.notify_all();
        }
    }
}

/// Releases the worker's slot however its work ends, panics included
struct WorkerSlot {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        INTERRUPT_FLAG.with(|f| f.borrow_mut().take());
        self.inner.finished_task(self.id);
    }
}

/// Runs each piece of work on its own OS thread, at most `max_threads` at a
/// time. Work submitted over the cap waits in a FIFO queue.
#[derive(Clone)]
pub struct ForkedExecutor {
    inner: Arc<Inner>,
}

impl ForkedExecutor {
    pub fn new(max_threads: usize, factory: Arc<dyn ThreadFactory>) -> Result<Self> {
        if max_threads == 0 {
            return Err(TaskError::invalid_argument("max_threads must be greater than zero"));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                max_threads,
                factory,
                state: Mutex::new(ExecState::default()),
                terminated: Condvar::new(),
            }),
        })
    }

    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    /// Run `work` now if a slot is free, otherwise queue it.
    ///
    /// A failed spawn for work that would have started immediately is
    /// returned and the work dropped. Queued work that cannot be spawned
    /// stays queued and is retried on the next `execute` or when a worker
    /// finishes.
    pub fn execute(&self, work: Work) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return Err(TaskError::rejected("executor has been shut down"));
        }
        if state.queue.is_empty() && state.running.len() < self.inner.max_threads {
            return self
                .inner
                .spawn_worker(&mut state, work)
                .map_err(|failure| failure.error);
        }
        state.queue.push_back(work);
        if let Err(e) = self.inner.start_queued(&mut state) {
            error!(
                error = %e,
                queued = state.queue.len(),
                "Failed to start queued work, keeping it queued"
            );
        }
        Ok(())
    }

    /// Stop accepting work. Running and queued work still completes.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        if state.is_terminated() {
            self.inner.terminated.notify_all();
        }
    }

    /// Stop accepting work, interrupt running workers and hand back the work
    /// that never started.
    pub fn shutdown_now(&self) -> Vec<Work> {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        for worker in state.running.values() {
            worker.interrupted.store(true, Ordering::SeqCst);
            worker.thread.unpark();
        }
        let drained: Vec<Work> = state.queue.drain(..).collect();
        if state.is_terminated() {
            self.inner.terminated.notify_all();
        }
        drained
    }

    /// Wait for all work to finish after a shutdown; false on timeout
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_terminated() {
            if self.inner.terminated.wait_until(&mut state, deadline).timed_out() {
                return state.is_terminated();
            }
        }
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().is_terminated()
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

impl fmt::Debug for ForkedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ForkedExecutor")
            .field("max_threads", &self.inner.max_threads)
            .field("running", &state.running.len())
            .field("queued", &state.queue.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::thread_factory::NamedThreadFactory;
    use std::io;
    use std::sync::atomic::AtomicU64;
    use std::sync::mpsc;
    use std::thread::JoinHandle;

    /// Refuses to spawn on the given call number, or on every call
    struct RefusingFactory {
        inner: NamedThreadFactory,
        calls: AtomicU64,
        refuse_on: Option<u64>,
    }

    impl RefusingFactory {
        fn new(refuse_on: Option<u64>) -> Self {
            Self {
                inner: NamedThreadFactory::new("Refusing"),
                calls: AtomicU64::new(0),
                refuse_on,
            }
        }
    }

    impl ThreadFactory for RefusingFactory {
        fn new_thread(
            &self,
            work: Box<dyn FnOnce() + Send + 'static>,
        ) -> io::Result<JoinHandle<()>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.refuse_on.map_or(true, |n| n == call) {
                return Err(io::Error::new(io::ErrorKind::Other, "thread limit reached"));
            }
            self.inner.new_thread(work)
        }
    }

    fn executor(max_threads: usize) -> ForkedExecutor {
        ForkedExecutor::new(max_threads, Arc::new(NamedThreadFactory::new("TestWorker"))).unwrap()
    }

    #[test]
    fn test_zero_threads_is_invalid() {
        let result = ForkedExecutor::new(0, Arc::new(NamedThreadFactory::new("x")));
        assert!(matches!(result, Err(TaskError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let exec = executor(1);
        exec.shutdown();
        assert!(exec.is_shutdown());
        assert!(matches!(exec.execute(Box::new(|| {})), Err(TaskError::Rejected { .. })));
        assert!(exec.await_termination(Duration::from_secs(1)));
    }

    #[test]
    fn test_queued_work_runs_after_slot_frees() {
        let exec = executor(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        exec.execute(Box::new(move || {
            release_rx.recv().unwrap();
        }))
        .unwrap();
        exec.execute(Box::new(move || done_tx.send("second").unwrap())).unwrap();

        assert_eq!(exec.queued_count(), 1);
        release_tx.send(()).unwrap();
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");

        exec.shutdown();
        assert!(exec.await_termination(Duration::from_secs(5)));
        assert_eq!(exec.active_count(), 0);
    }

    #[test]
    fn test_shutdown_now_interrupts_and_drains() {
        let exec = executor(1);
        let (started_tx, started_rx) = mpsc::channel();

        exec.execute(Box::new(move || {
            started_tx.send(()).unwrap();
            while !is_interrupted() {
                std::thread::park_timeout(Duration::from_millis(50));
            }
        }))
        .unwrap();
        exec.execute(Box::new(|| {})).unwrap();

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let drained = exec.shutdown_now();
        assert_eq!(drained.len(), 1);
        assert!(exec.await_termination(Duration::from_secs(5)));
        assert!(!is_interrupted());
    }

    #[test]
    fn test_panicking_work_releases_its_slot() {
        let exec = executor(1);
        exec.execute(Box::new(|| panic!("worker failure"))).unwrap();

        let (tx, rx) = mpsc::channel();
        exec.execute(Box::new(move || tx.send(()).unwrap())).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_failed_immediate_spawn_is_reported() {
        let exec = ForkedExecutor::new(2, Arc::new(RefusingFactory::new(None))).unwrap();
        assert!(matches!(exec.execute(Box::new(|| {})), Err(TaskError::Io(_))));
        assert_eq!(exec.active_count(), 0);
        assert_eq!(exec.queued_count(), 0);
    }

    #[test]
    fn test_queued_work_survives_failed_spawn() {
        let exec = ForkedExecutor::new(1, Arc::new(RefusingFactory::new(Some(2)))).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        exec.execute(Box::new(move || {
            release_rx.recv().unwrap();
        }))
        .unwrap();
        let second = done_tx.clone();
        exec.execute(Box::new(move || second.send("second").unwrap())).unwrap();
        assert_eq!(exec.queued_count(), 1);

        // The second spawn is refused when the first worker frees its slot
        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while exec.active_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(exec.active_count(), 0);
        assert_eq!(exec.queued_count(), 1);

        exec.execute(Box::new(move || done_tx.send("third").unwrap())).unwrap();
        let order: Vec<&str> = (0..2)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec!["second", "third"]);
    }
}
