use std::sync::Arc;

use crate::task::context::TaskContext;
use crate::task::descriptor::TaskDescriptor;

/// A predicate over task snapshots, used by the manager's search queries
pub trait TaskMatcher {
    fn matches(&self, descriptor: &TaskDescriptor) -> bool;
}

impl<F> TaskMatcher for F
where
    F: Fn(&TaskDescriptor) -> bool,
{
    fn matches(&self, descriptor: &TaskDescriptor) -> bool {
        self(descriptor)
    }
}

/// Tasks with an equal context, in any state
pub struct ContextMatcher {
    context: Arc<dyn TaskContext>,
}

impl ContextMatcher {
    pub fn new(context: Arc<dyn TaskContext>) -> Self {
        Self { context }
    }
}

impl TaskMatcher for ContextMatcher {
    fn matches(&self, descriptor: &TaskDescriptor) -> bool {
        descriptor.has_context(self.context.as_ref())
    }
}

/// Unfinished tasks with an equal context
pub struct LiveContextMatcher {
    context: Arc<dyn TaskContext>,
}

impl LiveContextMatcher {
    pub fn new(context: Arc<dyn TaskContext>) -> Self {
        Self { context }
    }
}

impl TaskMatcher for LiveContextMatcher {
    fn matches(&self, descriptor: &TaskDescriptor) -> bool {
        !descriptor.is_finished() && descriptor.has_context(self.context.as_ref())
    }
}

/// Unfinished tasks
pub struct LiveMatcher;

impl TaskMatcher for LiveMatcher {
    fn matches(&self, descriptor: &TaskDescriptor) -> bool {
        !descriptor.is_finished()
    }
}
