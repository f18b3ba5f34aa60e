//! Error handling module for sops-wrapper
//!
//! Provides centralized error types using thiserror.
//!
//! - `WrapperError` covers application-level failures (configuration, tool
//!   availability, discovery, export).
//! - `OperationError` covers per-file failures of a single tool invocation.
//!   These are never fatal to a batch; the orchestrator counts them.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for sops-wrapper
#[derive(Error, Debug)]
pub enum WrapperError {
    /// IO errors (file operations, directory creation, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The external sops binary is missing or not working
    #[error("sops is not installed or not in PATH: {0}")]
    ToolUnavailable(String),

    /// Invalid glob pattern given for file discovery
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// YAML parsing errors
    #[error("Invalid YAML content: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export to env format failed
    #[error("Export error: {0}")]
    Export(String),

    /// A single tool operation failed
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Result type alias for sops-wrapper operations
pub type Result<T> = std::result::Result<T, WrapperError>;

impl WrapperError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a tool-unavailable error
    pub fn tool_unavailable(msg: impl Into<String>) -> Self {
        Self::ToolUnavailable(msg.into())
    }

    /// Create an export error
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }
}

/// Failure of one sops invocation against one file.
#[derive(Error, Debug)]
pub enum OperationError {
    /// The tool could not be started at all
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool did not finish within its time budget and was killed
    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The wrapper was interrupted; the tool was not started or was stopped
    #[error("{operation} cancelled by interrupt")]
    Cancelled { operation: &'static str },

    /// The tool exited unsuccessfully
    #[error("{operation} failed (exit code {code}): {stderr}")]
    NonZeroExit {
        operation: &'static str,
        code: i32,
        stderr: String,
    },

    /// The tool reported success but the artifact is empty or malformed
    #[error("integrity check failed for {}: {detail}", path.display())]
    Integrity { path: PathBuf, detail: &'static str },

    /// Local filesystem failure while preparing or persisting an artifact
    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OperationError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn integrity(path: impl Into<PathBuf>, detail: &'static str) -> Self {
        Self::Integrity {
            path: path.into(),
            detail,
        }
    }
}
