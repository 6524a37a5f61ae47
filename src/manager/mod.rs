//! Task managers and the collaborators they are built from.

pub mod cluster;
pub mod counter;
pub mod import;
pub mod sequence;
pub mod task_manager;
pub mod thread_local;

pub use cluster::{
    ClusterMessage, ClusterMessageListener, LocalMessageHub, LocalNode, MessageBus, NodeId,
};
pub use counter::BlockingCounter;
pub use import::{ImportTaskContext, ImportTaskManager};
pub use sequence::{AtomicSequence, IdSequence};
pub use task_manager::{new_task_table, TaskManager, TaskManagerBuilder, TaskTable};
pub use thread_local::{LeakedResource, NoopThreadLocalHook, ThreadLocalHook};
