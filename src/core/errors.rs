use std::io;
use thiserror::Error;

use crate::task::descriptor::TaskDescriptor;
use crate::task::TaskId;

/// Errors raised by the task management core
#[derive(Debug, Error)]
pub enum TaskError {
    /// A live task with an equal context already exists
    #[error("A task with this context has already been submitted (task {})", .existing.task_id())]
    AlreadyExecuting { existing: Box<TaskDescriptor> },

    /// Work was submitted after shutdown began
    #[error("Task rejected: {reason}")]
    Rejected { reason: String },

    #[error("Task not found for task id '{task_id}'")]
    TaskNotFound { task_id: TaskId },

    #[error("Task '{task_id}' is not cancellable")]
    NotCancellable { task_id: TaskId },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The task body returned an error or panicked
    #[error("Task execution failed: {task_id} - {reason}")]
    ExecutionFailed { task_id: TaskId, reason: String },

    #[error("Task cancelled: {task_id}")]
    Cancelled { task_id: TaskId },

    #[error("Configuration invalid: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn already_executing(existing: TaskDescriptor) -> Self {
        Self::AlreadyExecuting {
            existing: Box::new(existing),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// The descriptor of the conflicting task, for admission conflicts
    pub fn conflicting_task(&self) -> Option<&TaskDescriptor> {
        match self {
            Self::AlreadyExecuting { existing } => Some(existing),
            _ => None,
        }
    }

    /// Whether the caller can reasonably retry the same operation later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyExecuting { .. } | Self::Io(_) => true,

            Self::Rejected { .. }
            | Self::TaskNotFound { .. }
            | Self::NotCancellable { .. }
            | Self::IllegalState(_)
            | Self::InvalidArgument(_)
            | Self::Configuration(_) => false,

            _ => false,
        }
    }

    /// Whether the error reflects a condition that clears up on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AlreadyExecuting { .. })
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;

impl From<String> for TaskError {
    fn from(s: String) -> Self {
        TaskError::IllegalState(s)
    }
}

impl From<&str> for TaskError {
    fn from(s: &str) -> Self {
        TaskError::IllegalState(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let not_found = TaskError::TaskNotFound { task_id: 7 };
        assert!(!not_found.is_retryable());

        let rejected = TaskError::rejected("executor shut down");
        assert!(!rejected.is_retryable());
        assert!(!rejected.is_transient());

        let io_err = TaskError::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(io_err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = TaskError::ExecutionFailed {
            task_id: 123,
            reason: "out of memory".to_string(),
        };

        let display = err.to_string();
        assert!(display.contains("123"));
        assert!(display.contains("out of memory"));

        let err = TaskError::NotCancellable { task_id: 9 };
        assert_eq!(err.to_string(), "Task '9' is not cancellable");
    }

    #[test]
    fn test_conflicting_task_only_for_admission_errors() {
        assert!(TaskError::illegal_state("twice").conflicting_task().is_none());
        assert!(TaskError::Cancelled { task_id: 1 }.conflicting_task().is_none());
    }
}
