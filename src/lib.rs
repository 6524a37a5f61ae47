//! Long-running task management.
//!
//! Background tasks are submitted to a [`TaskManager`], which runs them on a
//! bounded pool of OS threads, refuses a second live task for the same
//! [`TaskContext`], and hands out immutable [`TaskDescriptor`] snapshots.
//! Tasks report progress through composable [`progress`] sinks.

pub mod any;
pub mod core;
pub mod executor;
pub mod manager;
pub mod progress;
pub mod task;

pub use crate::any::{TaskResult, TypeInfo};
pub use crate::core::config::{ImportTaskManagerConfig, TaskManagerConfig};
pub use crate::core::errors::{Result, TaskError};
pub use crate::core::logging::init_tracing;
pub use crate::executor::{is_interrupted, ForkedExecutor};
pub use crate::manager::{ImportTaskManager, LocalMessageHub, TaskManager, TaskTable};
pub use crate::progress::{SharedProgressSink, TaskProgressEvent, TaskProgressSink};
pub use crate::task::{
    ProgressSinkSlot, TaskContext, TaskDescriptor, TaskId, TaskInfoSlot, TaskMatcher,
    TaskSubmission,
};
