//! Bounded thread-per-task execution.

pub mod forked;
pub mod thread_factory;

pub use forked::{is_interrupted, ForkedExecutor, Work};
pub use thread_factory::{NamedThreadFactory, ThreadFactory};
