//! Single-file sops operations with artifact integrity checks.
//!
//! Each operation resolves to an `OperationResult`; failures are logged and
//! recorded, never raised. Artifacts are staged in a temporary file in the
//! target directory, validated there, and only then renamed into place:
//!
//! - encrypt: ciphertext must be non-empty
//! - decrypt: plaintext must be well-formed YAML
//! - updatekeys: ciphertext must still be non-empty (checked in place)
//!
//! A failed encrypt or decrypt leaves any previous artifact untouched, and
//! no zero-byte file is left at the target path.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use strum::Display;
use tracing::{error, info, warn};

use crate::discovery::SecretFilePair;
use crate::env_export::{EnvExport, PREVIEW_LIMIT};
use crate::error::{OperationError, Result, WrapperError};
use crate::tool_runner::ToolRunner;
use crate::tool_traits::SopsCommand;
use crate::validator::{is_non_empty, is_well_formed};

/// Kind of batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OperationKind {
    #[strum(serialize = "encrypt")]
    Encrypt,
    #[strum(serialize = "decrypt")]
    Decrypt,
    #[strum(serialize = "rotate-keys")]
    RotateKeys,
}

/// Result of one operation on one pair.
#[derive(Debug)]
pub struct OperationResult {
    pub kind: OperationKind,
    /// File read by the tool.
    pub source: PathBuf,
    /// File written (the same as `source` for key rotation).
    pub target: PathBuf,
    pub outcome: std::result::Result<(), OperationError>,
    /// Key rotation after encryption: `None` if not requested.
    pub rotation: Option<bool>,
}

impl OperationResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Encrypted and, if requested, rotated.
    pub fn fully_succeeded(&self) -> bool {
        self.success() && self.rotation != Some(false)
    }
}

/// Runs encrypt/decrypt/updatekeys for single files.
#[derive(Debug, Clone)]
pub struct OperationRunner {
    runner: ToolRunner,
}

impl OperationRunner {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    pub fn tool(&self) -> &ToolRunner {
        &self.runner
    }

    /// Encrypt `pair.plaintext` into `pair.encrypted`, optionally rotating
    /// keys afterwards. A rotation failure does not fail the encryption.
    pub fn encrypt(&self, pair: &SecretFilePair, update_keys: bool) -> OperationResult {
        let outcome = self.try_encrypt(pair);

        let rotation = match &outcome {
            Ok(()) => {
                info!(
                    "✅ Successfully encrypted: {} -> {}",
                    pair.plaintext.display(),
                    pair.encrypted.display()
                );
                update_keys.then(|| {
                    info!("Updating keys for: {}", pair.encrypted.display());
                    let rotated = self.rotate_in_place(&pair.encrypted);
                    if !rotated {
                        warn!(
                            "Key update failed for {}, but encryption was successful",
                            pair.encrypted.display()
                        );
                    }
                    rotated
                })
            }
            Err(e) => {
                error!("Encryption failed for {}: {}", pair.plaintext.display(), e);
                discard_if_empty(&pair.encrypted);
                None
            }
        };

        OperationResult {
            kind: OperationKind::Encrypt,
            source: pair.plaintext.clone(),
            target: pair.encrypted.clone(),
            outcome,
            rotation,
        }
    }

    /// Decrypt `pair.encrypted` into `pair.plaintext`.
    pub fn decrypt(&self, pair: &SecretFilePair) -> OperationResult {
        let outcome = self.try_decrypt(pair);

        match &outcome {
            Ok(()) => info!(
                "✅ Successfully decrypted: {} -> {}",
                pair.encrypted.display(),
                pair.plaintext.display()
            ),
            Err(e) => {
                error!("Decryption failed for {}: {}", pair.encrypted.display(), e);
                discard_if_empty(&pair.plaintext);
            }
        }

        OperationResult {
            kind: OperationKind::Decrypt,
            source: pair.encrypted.clone(),
            target: pair.plaintext.clone(),
            outcome,
            rotation: None,
        }
    }

    /// Run `sops updatekeys` on `encrypted` in place.
    pub fn rotate_keys(&self, encrypted: &Path) -> OperationResult {
        let outcome = self.try_rotate(encrypted);
        if let Err(e) = &outcome {
            error!("Key update failed for {}: {}", encrypted.display(), e);
        }

        OperationResult {
            kind: OperationKind::RotateKeys,
            source: encrypted.to_path_buf(),
            target: encrypted.to_path_buf(),
            outcome,
            rotation: None,
        }
    }

    fn rotate_in_place(&self, encrypted: &Path) -> bool {
        match self.try_rotate(encrypted) {
            Ok(()) => true,
            Err(e) => {
                error!("Key update failed for {}: {}", encrypted.display(), e);
                false
            }
        }
    }

    fn try_encrypt(&self, pair: &SecretFilePair) -> std::result::Result<(), OperationError> {
        ensure_parent_dir(&pair.encrypted)?;

        let output = self
            .runner
            .run(&SopsCommand::Encrypt(pair.plaintext.clone()))?
            .ensure_success("encrypt")?;

        write_artifact(
            &pair.encrypted,
            &output.stdout,
            is_non_empty,
            "encryption produced an empty file",
        )
    }

    fn try_decrypt(&self, pair: &SecretFilePair) -> std::result::Result<(), OperationError> {
        ensure_parent_dir(&pair.plaintext)?;

        let output = self
            .runner
            .run(&SopsCommand::Decrypt(pair.encrypted.clone()))?
            .ensure_success("decrypt")?;

        write_artifact(
            &pair.plaintext,
            &output.stdout,
            is_well_formed,
            "decryption produced invalid YAML",
        )
    }

    fn try_rotate(&self, encrypted: &Path) -> std::result::Result<(), OperationError> {
        self.runner
            .run(&SopsCommand::UpdateKeys(encrypted.to_path_buf()))?
            .ensure_success("updatekeys")?;

        if !is_non_empty(encrypted) {
            discard_if_empty(encrypted);
            return Err(OperationError::integrity(
                encrypted,
                "key update left the file empty",
            ));
        }

        info!("✅ Successfully updated keys: {}", encrypted.display());
        Ok(())
    }

    /// Decrypt `secrets_file` and write its `section` as an env file with
    /// mode 0600.
    pub fn export_env(
        &self,
        secrets_file: &Path,
        output_file: &Path,
        section: &str,
    ) -> Result<EnvExport> {
        if !secrets_file.exists() {
            return Err(WrapperError::export(format!(
                "Encrypted secrets file not found: {}",
                secrets_file.display()
            )));
        }

        info!("Decrypting: {}", secrets_file.display());
        let output = self
            .runner
            .run(&SopsCommand::ExportDecrypt(secrets_file.to_path_buf()))?
            .ensure_success("decrypt")?;
        info!("Successfully decrypted secrets");

        info!("Converting to .env format...");
        let content = String::from_utf8(output.stdout)
            .map_err(|_| WrapperError::export("decrypted secrets are not valid UTF-8"))?;
        let export = EnvExport::from_yaml_str(&content, section)?;

        if let Some(parent) = non_empty_parent(output_file) {
            fs::create_dir_all(parent)?;
        }
        write_private(output_file, export.render().as_bytes())?;

        info!("✅ Successfully created {}", output_file.display());
        info!("File contains {} environment variables", export.len());

        if !export.is_empty() {
            info!("Preview (keys only):");
            for line in export.preview(PREVIEW_LIMIT) {
                info!("  {}", line);
            }
            if export.len() > PREVIEW_LIMIT {
                info!("  ... and {} more variables", export.len() - PREVIEW_LIMIT);
            }
        }

        Ok(export)
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// `mkdir -p` for the artifact's directory; safe under concurrent callers.
fn ensure_parent_dir(path: &Path) -> std::result::Result<(), OperationError> {
    match non_empty_parent(path) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| OperationError::filesystem(parent, e))
        }
        None => Ok(()),
    }
}

/// Write `content` next to `target` and rename it into place once the
/// staged file passes `valid`. A rejected stage is deleted and `target` is
/// left as it was.
fn write_artifact(
    target: &Path,
    content: &[u8],
    valid: impl Fn(&Path) -> bool,
    detail: &'static str,
) -> std::result::Result<(), OperationError> {
    let dir = non_empty_parent(target).unwrap_or_else(|| Path::new("."));

    let mut staged = tempfile::Builder::new()
        .prefix(".sops-wrapper-")
        .tempfile_in(dir)
        .map_err(|e| OperationError::filesystem(dir, e))?;

    staged
        .write_all(content)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| OperationError::filesystem(target, e))?;

    if !valid(staged.path()) {
        return Err(OperationError::integrity(target, detail));
    }

    staged
        .persist(target)
        .map_err(|e| OperationError::filesystem(target, e.error))?;

    Ok(())
}

/// Write a file readable only by its owner, resetting permissions if it
/// already existed.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content)?;
    file.sync_all()
}

fn remove_artifact(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove invalid artifact {}: {}", path.display(), e);
    }
}

/// Remove a zero-byte regular file left at `path`, if any.
fn discard_if_empty(path: &Path) {
    let is_empty_file = fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() == 0)
        .unwrap_or(false);
    if is_empty_file {
        remove_artifact(path);
    }
}
