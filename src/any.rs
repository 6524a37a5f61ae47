use std::{
    any::{type_name, Any, TypeId},
    fmt::{self, Debug},
    hash::Hash,
    sync::Arc,
};

/// A [`TypeId`] and the type's name.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Gets the [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Gets the type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`TypeInfo`] of the type this generic function has been
    /// instantiated with.
    pub fn of<T: 'static>() -> Self {
        TypeInfo {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl Hash for TypeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &TypeInfo) -> bool {
        self.id.eq(&other.id)
    }
}

impl Eq for TypeInfo {}

/// The value a task body returned, with its concrete type erased.
///
/// The manager holds tasks of many result types in one table, so results are
/// kept behind `dyn Any` and recovered with [`TaskResult::downcast_ref`].
#[derive(Clone)]
pub struct TaskResult {
    value: Arc<dyn Any + Send + Sync>,
    type_info: TypeInfo,
}

impl TaskResult {
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self {
            value: Arc::new(value),
            type_info: TypeInfo::of::<V>(),
        }
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn is<V: 'static>(&self) -> bool {
        self.type_info.id() == TypeId::of::<V>()
    }

    pub fn downcast_ref<V: 'static>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }
}

impl Debug for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Print common primitive results, fall back to the type name
        if let Some(v) = self.downcast_ref::<String>() {
            return write!(f, "TaskResult({:?})", v);
        } else if let Some(v) = self.downcast_ref::<i64>() {
            return write!(f, "TaskResult({:?})", v);
        } else if let Some(v) = self.downcast_ref::<u64>() {
            return write!(f, "TaskResult({:?})", v);
        } else if let Some(v) = self.downcast_ref::<bool>() {
            return write!(f, "TaskResult({:?})", v);
        }

        write!(f, "TaskResult(<{}>)", self.type_info.name())
    }
}
