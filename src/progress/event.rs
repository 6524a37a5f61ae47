use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::task::TaskId;

/// One progress report, frozen at the moment it was made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgressEvent {
    pub task_id: TaskId,
    pub elapsed_run_time_ms: u64,
    /// `-1` when progress is unknown
    pub task_progress: i64,
    pub current_sub_task: Option<String>,
    pub message: Option<String>,
    pub creation_timestamp: DateTime<Utc>,
}

impl TaskProgressEvent {
    pub fn new(
        task_id: TaskId,
        elapsed_run_time: Duration,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) -> Self {
        Self {
            task_id,
            elapsed_run_time_ms: elapsed_run_time.as_millis() as u64,
            task_progress,
            current_sub_task: current_sub_task.map(str::to_string),
            message: message.map(str::to_string),
            creation_timestamp: Utc::now(),
        }
    }

    pub fn elapsed_run_time(&self) -> Duration {
        Duration::from_millis(self.elapsed_run_time_ms)
    }

    pub fn is_progress_known(&self) -> bool {
        self.task_progress >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_fields() {
        let event =
            TaskProgressEvent::new(3, Duration::from_millis(1500), 40, Some("Moving"), None);
        assert_eq!(event.task_id, 3);
        assert_eq!(event.elapsed_run_time(), Duration::from_millis(1500));
        assert_eq!(event.current_sub_task.as_deref(), Some("Moving"));
        assert!(event.message.is_none());
        assert!(event.is_progress_known());

        let unknown = TaskProgressEvent::new(3, Duration::ZERO, -1, None, None);
        assert!(!unknown.is_progress_known());
    }

    #[test]
    fn test_event_serializes() {
        let event = TaskProgressEvent::new(
            11,
            Duration::from_secs(2),
            75,
            Some("Indexing"),
            Some("3 of 4"),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["task_id"], 11);
        assert_eq!(json["elapsed_run_time_ms"], 2000);
        assert_eq!(json["message"], "3 of 4");
    }
}
