//! Tracing setup for binaries and demos embedding the task manager.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::core::errors::{Result, TaskError};

/// Install a global fmt subscriber, failing if one is already set
pub fn try_init_tracing(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TaskError::configuration(format!("tracing already initialised: {}", e)))
}

/// Install a global fmt subscriber; a second call is a no-op
pub fn init_tracing(level: Level) {
    if try_init_tracing(level).is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
