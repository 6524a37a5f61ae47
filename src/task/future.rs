use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::core::errors::{Result, TaskError};
use crate::task::TaskId;

type Body = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl FutureState {
    pub fn is_done(&self) -> bool {
        !matches!(self, FutureState::Pending | FutureState::Running)
    }
}

struct Inner {
    state: FutureState,
    body: Option<Body>,
}

/// A unit of work that runs at most once and can be waited on or cancelled.
///
/// Cancelling never stops a body that is already running; it only stops a
/// pending body from starting and releases waiters immediately. A running
/// body is expected to poll its task's cancelled flag.
pub struct TaskFuture {
    task_id: TaskId,
    inner: Mutex<Inner>,
    done: Condvar,
}

impl TaskFuture {
    pub fn new<F>(task_id: TaskId, body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            task_id,
            inner: Mutex::new(Inner {
                state: FutureState::Pending,
                body: Some(Box::new(body)),
            }),
            done: Condvar::new(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Run the body on the calling thread. Returns `false` without running
    /// anything if the future was cancelled or has already run.
    pub fn run(&self) -> bool {
        self.run_then(|| {})
    }

    /// Like [`TaskFuture::run`], but calls `teardown` after the body and
    /// before any waiter is released. `teardown` is called exactly once, even
    /// when the body never starts.
    pub fn run_then<F: FnOnce()>(&self, teardown: F) -> bool {
        let body = {
            let mut inner = self.inner.lock();
            if inner.state == FutureState::Pending {
                inner.state = FutureState::Running;
                Some(inner.body.take())
            } else {
                None
            }
        };
        let Some(body) = body else {
            teardown();
            return false;
        };

        let outcome = match body {
            Some(body) => match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(())) => FutureState::Succeeded,
                Ok(Err(e)) => FutureState::Failed(format!("{:#}", e)),
                Err(payload) => {
                    FutureState::Failed(format!("task panicked: {}", panic_message(&payload)))
                }
            },
            None => FutureState::Failed("task body executed twice".to_string()),
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(teardown)) {
            Ok(()) => outcome,
            Err(payload) => FutureState::Failed(format!(
                "task teardown panicked: {}",
                panic_message(&payload)
            )),
        };

        let mut inner = self.inner.lock();
        // A cancel that landed while running wins
        if inner.state == FutureState::Running {
            inner.state = outcome;
        }
        self.done.notify_all();
        true
    }

    /// Mark the future cancelled unless it already completed. Returns whether
    /// this call changed the state.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_done() {
            return false;
        }
        inner.state = FutureState::Cancelled;
        inner.body = None;
        self.done.notify_all();
        true
    }

    /// Cancel only if the body has not started yet
    pub fn cancel_if_pending(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != FutureState::Pending {
            return false;
        }
        inner.state = FutureState::Cancelled;
        inner.body = None;
        self.done.notify_all();
        true
    }

    pub fn state(&self) -> FutureState {
        self.inner.lock().state.clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().state.is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().state == FutureState::Cancelled
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().state != FutureState::Pending
    }

    /// Block until the future completes
    pub fn get(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        while !inner.state.is_done() {
            self.done.wait(&mut inner);
        }
        self.outcome(&inner.state)
    }

    /// Block until the future completes or `timeout` elapses; `None` on timeout
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.state.is_done() {
            if self.done.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        if inner.state.is_done() {
            Some(self.outcome(&inner.state))
        } else {
            None
        }
    }

    fn outcome(&self, state: &FutureState) -> Result<()> {
        match state {
            FutureState::Succeeded => Ok(()),
            FutureState::Failed(reason) => Err(TaskError::ExecutionFailed {
                task_id: self.task_id,
                reason: reason.clone(),
            }),
            FutureState::Cancelled => Err(TaskError::Cancelled {
                task_id: self.task_id,
            }),
            FutureState::Pending | FutureState::Running => Err(TaskError::illegal_state(format!(
                "task {} has not completed",
                self.task_id
            ))),
        }
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("task_id", &self.task_id)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_run_once() {
        let future = TaskFuture::new(1, || Ok(()));
        assert!(future.run());
        assert!(!future.run());
        assert_eq!(future.state(), FutureState::Succeeded);
        assert!(future.get().is_ok());
    }

    #[test]
    fn test_failure_and_panic_are_captured() {
        let failing = TaskFuture::new(2, || Err(anyhow::anyhow!("disk full")));
        failing.run();
        match failing.get() {
            Err(TaskError::ExecutionFailed { task_id, reason }) => {
                assert_eq!(task_id, 2);
                assert!(reason.contains("disk full"));
            }
            other => panic!("expected execution failure, got {:?}", other),
        }

        let panicking = TaskFuture::new(3, || panic!("boom"));
        assert!(panicking.run());
        assert!(matches!(panicking.get(), Err(TaskError::ExecutionFailed { .. })));
    }

    #[test]
    fn test_cancel_before_start_skips_body() {
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let future = TaskFuture::new(4, move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });

        assert!(future.cancel_if_pending());
        assert!(!future.cancel());
        assert!(!future.run());
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        assert!(matches!(future.get(), Err(TaskError::Cancelled { task_id: 4 })));
    }

    #[test]
    fn test_get_timeout() {
        let future = TaskFuture::new(5, || Ok(()));
        assert!(future.get_timeout(Duration::from_millis(10)).is_none());
        future.run();
        assert!(matches!(future.get_timeout(Duration::from_millis(10)), Some(Ok(()))));
    }

    #[test]
    fn test_teardown_finishes_before_waiters_wake() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let future = Arc::new(TaskFuture::new(6, || Ok(())));
        let torn_down = Arc::new(AtomicBool::new(false));

        let waiter_future = future.clone();
        let waiter_flag = torn_down.clone();
        let waiter = std::thread::spawn(move || {
            waiter_future.get().unwrap();
            waiter_flag.load(Ordering::SeqCst)
        });

        let flag = torn_down.clone();
        assert!(future.run_then(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_teardown_runs_for_cancelled_future() {
        let future = TaskFuture::new(7, || Ok(()));
        future.cancel();
        let mut calls = 0;
        assert!(!future.run_then(|| calls += 1));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_teardown_panic_fails_the_future() {
        let future = TaskFuture::new(8, || Ok(()));
        assert!(future.run_then(|| panic!("hook blew up")));
        match future.get() {
            Err(TaskError::ExecutionFailed { reason, .. }) => {
                assert!(reason.contains("hook blew up"))
            }
            other => panic!("expected teardown failure, got {:?}", other),
        }
    }
}
