//! sops-wrapper library
//!
//! Change-aware, parallel encryption, decryption and key rotation of YAML
//! secrets with sops, plus export of a decrypted section to an env file.

pub mod change_detector;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod env_export;
pub mod error;
pub mod operations;
pub mod orchestrator;
pub mod process_guard;
pub mod sanity;
pub mod tool_runner;
pub mod tool_traits;
pub mod validator;
pub mod worker_pool;

// Re-export main types for convenience
pub use change_detector::{ChangeDetector, Decision, DecisionReason};
pub use config::WrapperConfig;
pub use discovery::{FileMarkers, SecretFilePair, find_files};
pub use env_export::{EnvExport, to_env_format};
pub use error::{OperationError, WrapperError};
pub use operations::{OperationKind, OperationResult, OperationRunner};
pub use orchestrator::{BatchReport, Orchestrator};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use tool_runner::{ToolOutput, ToolRunner};
pub use tool_traits::{SopsCommand, ToolArgs};
