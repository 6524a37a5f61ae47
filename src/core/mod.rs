// Infrastructure shared by the executor, the managers and the progress sinks

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{ImportTaskManagerConfig, TaskManagerConfig, TaskManagerConfigBuilder};
pub use errors::{Result, TaskError};
