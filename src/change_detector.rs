//! Decides whether a plaintext secrets file needs (re-)encryption.
//!
//! Rules are evaluated in a fixed order and the first applicable one wins:
//!
//! 1. plaintext missing, empty or not YAML  -> skip
//! 2. no ciphertext                         -> encrypt
//! 3. empty ciphertext                      -> encrypt
//! 4. plaintext mtime newer than ciphertext -> encrypt
//! 5. round-trip decrypt and hash compare   -> encrypt on mismatch or on any
//!    failure to verify, skip when hashes match
//!
//! Rule 5 never skips on doubt: a redundant encryption is preferred over
//! leaving a possibly stale ciphertext in place.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use strum::Display;
use tracing::debug;

use crate::discovery::SecretFilePair;
use crate::error::OperationError;
use crate::tool_runner::ToolRunner;
use crate::tool_traits::SopsCommand;
use crate::validator::{file_digest, is_non_empty, is_well_formed};

/// Why a file is or is not encrypted. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DecisionReason {
    #[strum(serialize = "source invalid or empty")]
    SourceInvalid,
    #[strum(serialize = "no encrypted file exists")]
    MissingCiphertext,
    #[strum(serialize = "encrypted file is empty")]
    EmptyCiphertext,
    #[strum(serialize = "source file is newer")]
    SourceNewer,
    #[strum(serialize = "unable to verify encrypted content")]
    Unverifiable,
    #[strum(serialize = "content has changed")]
    ContentChanged,
    #[strum(serialize = "no changes detected")]
    Unchanged,
}

impl DecisionReason {
    pub fn requires_encryption(self) -> bool {
        !matches!(self, DecisionReason::SourceInvalid | DecisionReason::Unchanged)
    }
}

/// Outcome of change detection for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub should_encrypt: bool,
    pub reason: DecisionReason,
}

impl From<DecisionReason> for Decision {
    fn from(reason: DecisionReason) -> Self {
        Self {
            should_encrypt: reason.requires_encryption(),
            reason,
        }
    }
}

/// Change detector bound to a sops runner for round-trip comparison.
pub struct ChangeDetector<'a> {
    runner: &'a ToolRunner,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(runner: &'a ToolRunner) -> Self {
        Self { runner }
    }

    pub fn decide(&self, pair: &SecretFilePair) -> Decision {
        self.evaluate(pair).into()
    }

    fn evaluate(&self, pair: &SecretFilePair) -> DecisionReason {
        if !is_well_formed(&pair.plaintext) {
            return DecisionReason::SourceInvalid;
        }

        if !pair.encrypted.exists() {
            return DecisionReason::MissingCiphertext;
        }

        if !is_non_empty(&pair.encrypted) {
            return DecisionReason::EmptyCiphertext;
        }

        if let (Some(source), Some(target)) = (modified(&pair.plaintext), modified(&pair.encrypted))
        {
            if source > target {
                return DecisionReason::SourceNewer;
            }
        }

        let Some(plaintext_digest) = file_digest(&pair.plaintext) else {
            return DecisionReason::Unverifiable;
        };

        match self.decrypted_digest(&pair.encrypted) {
            Ok(encrypted_digest) if encrypted_digest == plaintext_digest => {
                DecisionReason::Unchanged
            }
            Ok(_) => DecisionReason::ContentChanged,
            Err(e) => {
                debug!(
                    "Failed to decrypt {} for comparison: {}",
                    pair.encrypted.display(),
                    e
                );
                DecisionReason::Unverifiable
            }
        }
    }

    /// Decrypt `encrypted` into a scratch file and hash the result.
    ///
    /// The scratch file is a `NamedTempFile` (mode 0600) and is removed when
    /// it goes out of scope, on every path out of this function.
    fn decrypted_digest(&self, encrypted: &Path) -> Result<String, OperationError> {
        let output = self
            .runner
            .run(&SopsCommand::CompareDecrypt(encrypted.to_path_buf()))?
            .ensure_success("comparison decrypt")?;

        let mut scratch = tempfile::Builder::new()
            .prefix(".sops-compare-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| OperationError::filesystem(std::env::temp_dir(), e))?;

        scratch
            .write_all(&output.stdout)
            .and_then(|_| scratch.flush())
            .map_err(|e| OperationError::filesystem(scratch.path(), e))?;

        file_digest(scratch.path()).ok_or_else(|| {
            OperationError::filesystem(
                scratch.path(),
                std::io::Error::other("scratch file unreadable"),
            )
        })
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
