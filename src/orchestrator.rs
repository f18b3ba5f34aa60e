//! Batch encrypt/decrypt/rotate-keys over discovered files.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::change_detector::ChangeDetector;
use crate::discovery::{FileMarkers, SecretFilePair, find_files};
use crate::error::Result;
use crate::operations::{OperationKind, OperationResult, OperationRunner};
use crate::worker_pool::run_pool;

/// Counts for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub kind: OperationKind,
    /// Files matched by the pattern.
    pub discovered: usize,
    /// Files not submitted (up to date, invalid source, or unpairable).
    pub skipped: usize,
    pub attempted: usize,
    pub succeeded: usize,
    /// Encryptions that succeeded but whose key update did not.
    pub rotation_failures: usize,
}

impl BatchReport {
    fn empty(kind: OperationKind) -> Self {
        Self {
            kind,
            discovered: 0,
            skipped: 0,
            attempted: 0,
            succeeded: 0,
            rotation_failures: 0,
        }
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded > 0
    }

    fn record(&mut self, results: &[OperationResult]) {
        self.attempted = results.len();
        self.succeeded = results.iter().filter(|r| r.success()).count();
        self.rotation_failures = results
            .iter()
            .filter(|r| r.success() && r.rotation == Some(false))
            .count();
    }
}

/// Runs batches on a bounded worker pool.
pub struct Orchestrator {
    operations: OperationRunner,
    markers: FileMarkers,
    workers: usize,
}

impl Orchestrator {
    pub fn new(operations: OperationRunner, markers: FileMarkers, workers: usize) -> Self {
        Self {
            operations,
            markers,
            workers,
        }
    }

    pub fn operations(&self) -> &OperationRunner {
        &self.operations
    }

    /// Encrypt every plaintext matching `pattern` that the change detector
    /// flags. Decisions are made before any job is submitted.
    pub fn encrypt_files(
        &self,
        pattern: &str,
        base_dir: &Path,
        update_keys: bool,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::empty(OperationKind::Encrypt);
        let Some(files) = self.discover(pattern, base_dir, &mut report)? else {
            return Ok(report);
        };
        info!("Found {} files to process", files.len());

        let detector = ChangeDetector::new(self.operations.tool());
        let mut pending = Vec::new();
        for plaintext in files {
            let Some(pair) = self.markers.pair_from_plaintext(&plaintext) else {
                report.skipped += 1;
                continue;
            };

            let decision = detector.decide(&pair);
            if decision.should_encrypt {
                info!(
                    "Encrypting: {} -> {} ({})",
                    pair.plaintext.display(),
                    pair.encrypted.display(),
                    decision.reason
                );
                pending.push(pair);
            } else {
                info!("Skipping: {} ({})", pair.plaintext.display(), decision.reason);
                report.skipped += 1;
            }
        }

        let results = run_pool(self.workers, pending, |pair: SecretFilePair| {
            self.operations.encrypt(&pair, update_keys)
        });
        report.record(&results);

        info!(
            "Encryption completed. {}/{} files encrypted successfully",
            report.succeeded, report.attempted
        );
        if report.rotation_failures > 0 {
            warn!(
                "Key update failed for {} encrypted files",
                report.rotation_failures
            );
        }
        Ok(report)
    }

    /// Decrypt every ciphertext matching `pattern`.
    pub fn decrypt_files(&self, pattern: &str, base_dir: &Path) -> Result<BatchReport> {
        let mut report = BatchReport::empty(OperationKind::Decrypt);
        let Some(files) = self.discover(pattern, base_dir, &mut report)? else {
            return Ok(report);
        };
        info!("Found {} files to decrypt", files.len());

        let mut pending = Vec::new();
        for encrypted in files {
            match self.markers.pair_from_encrypted(&encrypted) {
                Some(pair) => {
                    info!(
                        "Decrypting: {} -> {}",
                        pair.encrypted.display(),
                        pair.plaintext.display()
                    );
                    pending.push(pair);
                }
                None => report.skipped += 1,
            }
        }

        let results = run_pool(self.workers, pending, |pair: SecretFilePair| {
            self.operations.decrypt(&pair)
        });
        report.record(&results);

        info!(
            "Decryption completed. {}/{} files decrypted successfully",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Run `sops updatekeys` on every ciphertext matching `pattern`.
    pub fn rotate_keys_files(&self, pattern: &str, base_dir: &Path) -> Result<BatchReport> {
        let mut report = BatchReport::empty(OperationKind::RotateKeys);
        let Some(files) = self.discover(pattern, base_dir, &mut report)? else {
            return Ok(report);
        };
        info!("Found {} encrypted files to update keys", files.len());

        for encrypted in &files {
            info!("Updating keys: {}", encrypted.display());
        }

        let results = run_pool(self.workers, files, |encrypted: PathBuf| {
            self.operations.rotate_keys(&encrypted)
        });
        report.record(&results);

        info!(
            "Key update completed. {}/{} files updated successfully",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// `None` when nothing matched; the outcome is already logged.
    fn discover(
        &self,
        pattern: &str,
        base_dir: &Path,
        report: &mut BatchReport,
    ) -> Result<Option<Vec<PathBuf>>> {
        let files = find_files(pattern, base_dir)?;
        report.discovered = files.len();

        if files.is_empty() {
            info!("No files found matching pattern: {}", pattern);
            return Ok(None);
        }
        Ok(Some(files))
    }
}
