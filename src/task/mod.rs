//! Task identity, snapshots and the units of work the managers run.

pub mod context;
pub mod descriptor;
pub mod future;
pub mod matcher;
pub mod submission;

pub type TaskId = u64;

pub use context::{ContextKey, TaskContext};
pub use descriptor::{LiveTask, TaskDescriptor};
pub use future::{FutureState, TaskFuture};
pub use matcher::{ContextMatcher, LiveContextMatcher, LiveMatcher, TaskMatcher};
pub use submission::{
    ProgressSinkSlot, ProvidesTaskProgress, RequiresTaskInformation, TaskInfo, TaskInfoSlot,
    TaskSubmission,
};
