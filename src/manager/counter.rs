use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A counter that can be waited on until it drops to zero
#[derive(Debug, Default)]
pub struct BlockingCounter {
    count: Mutex<usize>,
    zero: Condvar,
}

impl BlockingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn up(&self) {
        *self.count.lock() += 1;
    }

    pub fn down(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// True if the count reached zero before `timeout`
    pub fn await_zero(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.zero.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}
