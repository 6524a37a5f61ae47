use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

use crate::task::TaskId;

/// Object-safe equality and hashing, implemented for every `Eq + Hash` type
pub trait ContextKey: Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Equal only if `other` has the same concrete type and compares equal
    fn key_eq(&self, other: &dyn Any) -> bool;

    fn key_hash(&self) -> u64;
}

impl<T> ContextKey for T
where
    T: Eq + Hash + Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn key_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().map_or(false, |other| self == other)
    }

    fn key_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Identifies "the same logical operation" for admission control.
///
/// At most one live task may exist per equal context. Equality is value
/// equality of the concrete type, so two contexts that compare equal but mean
/// different operations will block each other.
pub trait TaskContext: ContextKey + 'static {
    /// Where a user can watch the task identified by `task_id`
    fn build_progress_url(&self, task_id: TaskId) -> String;
}

impl PartialEq for dyn TaskContext {
    fn eq(&self, other: &dyn TaskContext) -> bool {
        self.key_eq(other.as_any())
    }
}

impl Eq for dyn TaskContext {}

impl Hash for dyn TaskContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.key_hash());
    }
}
