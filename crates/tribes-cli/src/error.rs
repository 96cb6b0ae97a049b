use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tribes_core::Error),
    #[error(transparent)]
    Config(#[from] tribes_core::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No acting user. Pass --as <USER_ID> or set TRIBES_USER.")]
    MissingActor,
    #[error("Sync file path is not valid UTF-8: {0}")]
    InvalidSyncPath(String),
    #[error("Background task failed: {0}")]
    Task(String),
}

impl CliError {
    /// Message shown on stderr; internal core failures stay generic
    pub fn user_message(&self) -> String {
        match self {
            Self::Core(error) => error.user_message(),
            other => other.to_string(),
        }
    }
}
