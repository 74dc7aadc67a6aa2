use crate::CommandResult;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Command timed out after {timeout:?}: {path}")]
    CommandTimeout {
        path: String,
        timeout: Duration,
        output: CommandResult,
    },

    #[error("Command failed (exit={}): {path}", output.exit_code)]
    CommandFailed { path: String, output: CommandResult },

    #[error("Command could not be started: {path}: {reason}")]
    CommandSpawn { path: String, reason: String },

    #[error("Interface not ready: {0}")]
    InterfaceNotReady(String),

    #[error("Interface error: {0}")]
    Interface(String),

    #[error("Process stop failed: {0}")]
    ProcessStop(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TunguardError {
    /// Output captured from an external command, when this error came from one.
    pub fn command_output(&self) -> Option<&CommandResult> {
        match self {
            TunguardError::CommandTimeout { output, .. }
            | TunguardError::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub type TunguardResult<T> = Result<T, TunguardError>;
