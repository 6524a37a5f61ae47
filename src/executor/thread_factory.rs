use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Creates the OS threads an executor runs its work on
pub trait ThreadFactory: Send + Sync {
    fn new_thread(&self, work: Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>>;
}

/// Spawns threads named `"{prefix}-{n}"`, numbering from 1
#[derive(Debug)]
pub struct NamedThreadFactory {
    prefix: String,
    counter: AtomicU64,
}

impl NamedThreadFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn new_thread(&self, work: Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        thread::Builder::new()
            .name(format!("{}-{}", self.prefix, n))
            .spawn(work)
    }
}
