//! Type-safe sops argument contracts.
//!
//! Every sops invocation is described by a value implementing `ToolArgs`
//! instead of an ad-hoc string vector, so the exact call contract lives in
//! one place and is covered by tests.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ToolTimeouts;

/// Trait for typed tool arguments.
///
/// # Contract
///
/// - `to_cli_args()`: arguments exactly as sops expects them.
/// - `label()`: short operation name used in logs and errors.
/// - `timeout()`: time budget for this call.
pub trait ToolArgs {
    /// Convert to CLI arguments (program name excluded).
    fn to_cli_args(&self) -> Vec<OsString>;

    /// Short name of the operation (e.g. "encrypt").
    fn label(&self) -> &'static str;

    /// Time budget for this invocation.
    fn timeout(&self, timeouts: &ToolTimeouts) -> Duration;
}

/// The sops invocations this crate performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SopsCommand {
    /// `sops --version`
    Version,
    /// `sops --input-type yaml --output-type yaml -e <plaintext>`
    Encrypt(PathBuf),
    /// `sops --input-type yaml --output-type yaml -d <ciphertext>`
    Decrypt(PathBuf),
    /// Same call as `Decrypt`, used for change detection with a shorter budget
    CompareDecrypt(PathBuf),
    /// `sops updatekeys --yes <ciphertext>`
    UpdateKeys(PathBuf),
    /// `sops -d <secrets-file>`, format inferred by sops
    ExportDecrypt(PathBuf),
}

fn yaml_io(flag: &str, path: &Path) -> Vec<OsString> {
    vec![
        "--input-type".into(),
        "yaml".into(),
        "--output-type".into(),
        "yaml".into(),
        flag.into(),
        path.into(),
    ]
}

impl ToolArgs for SopsCommand {
    fn to_cli_args(&self) -> Vec<OsString> {
        match self {
            SopsCommand::Version => vec!["--version".into()],
            SopsCommand::Encrypt(path) => yaml_io("-e", path),
            SopsCommand::Decrypt(path) | SopsCommand::CompareDecrypt(path) => yaml_io("-d", path),
            SopsCommand::UpdateKeys(path) => {
                vec!["updatekeys".into(), "--yes".into(), path.into()]
            }
            SopsCommand::ExportDecrypt(path) => vec!["-d".into(), path.into()],
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SopsCommand::Version => "version check",
            SopsCommand::Encrypt(_) => "encrypt",
            SopsCommand::Decrypt(_) | SopsCommand::ExportDecrypt(_) => "decrypt",
            SopsCommand::CompareDecrypt(_) => "comparison decrypt",
            SopsCommand::UpdateKeys(_) => "updatekeys",
        }
    }

    fn timeout(&self, timeouts: &ToolTimeouts) -> Duration {
        match self {
            SopsCommand::Version => timeouts.probe(),
            SopsCommand::Encrypt(_) => timeouts.encrypt(),
            SopsCommand::Decrypt(_) | SopsCommand::ExportDecrypt(_) => timeouts.decrypt(),
            SopsCommand::CompareDecrypt(_) => timeouts.compare(),
            SopsCommand::UpdateKeys(_) => timeouts.updatekeys(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &SopsCommand) -> Vec<String> {
        cmd.to_cli_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_encrypt_args() {
        let cmd = SopsCommand::Encrypt(PathBuf::from("app.dec.yaml"));
        assert_eq!(
            args(&cmd),
            ["--input-type", "yaml", "--output-type", "yaml", "-e", "app.dec.yaml"]
        );
    }

    #[test]
    fn test_decrypt_args_match_compare_args() {
        let path = PathBuf::from("app.enc.yaml");
        assert_eq!(
            args(&SopsCommand::Decrypt(path.clone())),
            ["--input-type", "yaml", "--output-type", "yaml", "-d", "app.enc.yaml"]
        );
        assert_eq!(
            args(&SopsCommand::Decrypt(path.clone())),
            args(&SopsCommand::CompareDecrypt(path))
        );
    }

    #[test]
    fn test_updatekeys_and_version_args() {
        assert_eq!(
            args(&SopsCommand::UpdateKeys(PathBuf::from("app.enc.yaml"))),
            ["updatekeys", "--yes", "app.enc.yaml"]
        );
        assert_eq!(args(&SopsCommand::Version), ["--version"]);
        assert_eq!(
            args(&SopsCommand::ExportDecrypt(PathBuf::from("ci.enc.yaml"))),
            ["-d", "ci.enc.yaml"]
        );
    }

    #[test]
    fn test_timeouts_per_command() {
        let timeouts = ToolTimeouts::default();
        let path = PathBuf::from("x");
        assert_eq!(SopsCommand::Version.timeout(&timeouts), Duration::from_secs(10));
        assert_eq!(
            SopsCommand::CompareDecrypt(path.clone()).timeout(&timeouts),
            Duration::from_secs(30)
        );
        assert_eq!(
            SopsCommand::UpdateKeys(path).timeout(&timeouts),
            Duration::from_secs(60)
        );
    }
}
