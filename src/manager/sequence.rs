use std::sync::atomic::{AtomicU64, Ordering};

use crate::task::TaskId;

/// Source of unique task ids
pub trait IdSequence: Send + Sync {
    fn next_id(&self) -> TaskId;
}

/// In-process monotonic sequence starting at 1
#[derive(Debug)]
pub struct AtomicSequence {
    next: AtomicU64,
}

impl AtomicSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: TaskId) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSequence for AtomicSequence {
    fn next_id(&self) -> TaskId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
