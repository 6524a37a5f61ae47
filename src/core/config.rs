use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, TaskError};

/// Task manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Maximum number of tasks executing concurrently
    pub max_threads: usize,
    /// Prefix for worker thread names, suffixed with `-N`
    pub thread_name_prefix: String,
    /// Maximum number of still-running tasks listed in the shutdown log
    pub shutdown_log_limit: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_threads: 5,
            thread_name_prefix: "TaskExecutionThread".to_string(),
            shutdown_log_limit: 100,
        }
    }
}

impl TaskManagerConfig {
    pub fn builder() -> TaskManagerConfigBuilder {
        TaskManagerConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(TaskError::configuration("max_threads must be greater than 0"));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(TaskError::configuration("thread_name_prefix cannot be empty"));
        }
        Ok(())
    }

    /// Small pool for development and tests
    pub fn development() -> Self {
        Self {
            max_threads: 2,
            thread_name_prefix: "DevTaskExecutionThread".to_string(),
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`TaskManagerConfig`]
#[derive(Debug, Default)]
pub struct TaskManagerConfigBuilder {
    config: TaskManagerConfig,
}

impl TaskManagerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.config.max_threads = max_threads;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn shutdown_log_limit(mut self, limit: usize) -> Self {
        self.config.shutdown_log_limit = limit;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<TaskManagerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Import task manager configuration. The import manager always runs a single thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportTaskManagerConfig {
    pub thread_name_prefix: String,
}

impl Default for ImportTaskManagerConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "ImportTaskManagerThread".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = TaskManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_threads, 5);
    }

    #[test]
    fn test_builder_rejects_zero_threads() {
        let result = TaskManagerConfig::builder().max_threads(0).build();
        assert!(matches!(result, Err(TaskError::Configuration(_))));

        let config = TaskManagerConfig::builder()
            .max_threads(3)
            .thread_name_prefix("Reindex")
            .build()
            .unwrap();
        assert_eq!(config.max_threads, 3);
        assert_eq!(config.thread_name_prefix, "Reindex");
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = TaskManagerConfig::from_json_str(r#"{"max_threads": 8}"#).unwrap();
        assert_eq!(config.max_threads, 8);
        assert_eq!(config.thread_name_prefix, "TaskExecutionThread");

        assert!(TaskManagerConfig::from_json_str(r#"{"max_threads": 0}"#).is_err());
        assert!(matches!(
            TaskManagerConfig::from_json_str("not json"),
            Err(TaskError::Json(_))
        ));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "max_threads: 4\nthread_name_prefix: BulkEdit\n";
        let config = TaskManagerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_threads, 4);
        assert_eq!(config.thread_name_prefix, "BulkEdit");
        assert_eq!(config.shutdown_log_limit, 100);
    }
}
