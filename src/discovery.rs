//! File discovery and plaintext/ciphertext pairing.
//!
//! Discovery walks a base directory recursively and matches each regular
//! file (or symlink to one) against a glob pattern anchored at the end of
//! the path, so `secrets/*.dec.yaml` finds `<base>/**/secrets/*.dec.yaml`
//! and `secrets/**/*.dec.yaml` finds files at any depth below `secrets`.
//! Results are always sorted so logs and tests are reproducible.
//!
//! Pairing is purely name based: `app.dec.yaml` <-> `app.enc.yaml` in the
//! same directory.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, WrapperError};

/// Marker for decrypted (plaintext) file names
pub const DECRYPTED_MARKER: &str = ".dec.";

/// Marker for encrypted file names
pub const ENCRYPTED_MARKER: &str = ".enc.";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Recursively find files under `base_dir` matching `pattern`.
///
/// An empty result is not an error. Entries that cannot be read are
/// skipped.
pub fn find_files(pattern: &str, base_dir: &Path) -> Result<Vec<PathBuf>> {
    let matcher = Pattern::new(pattern.trim_start_matches("**/"))?;

    let mut matches = Vec::new();
    for entry in WalkDir::new(base_dir).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", base_dir.display(), e);
                continue;
            }
        };

        // Follows symlinks to regular files.
        if !entry.path().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(base_dir) else {
            continue;
        };

        if any_suffix_matches(&matcher, relative) {
            matches.push(entry.into_path());
        }
    }

    matches.sort();
    Ok(matches)
}

/// True when some trailing run of `relative`'s components, joined with
/// `/`, matches `matcher`. Shortest suffix first.
fn any_suffix_matches(matcher: &Pattern, relative: &Path) -> bool {
    let components: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();

    (0..components.len())
        .rev()
        .any(|start| matcher.matches_with(&components[start..].join("/"), MATCH_OPTIONS))
}

/// A plaintext file and its encrypted counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFilePair {
    pub plaintext: PathBuf,
    pub encrypted: PathBuf,
}

/// File name markers distinguishing plaintext from encrypted files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMarkers {
    pub decrypted: String,
    pub encrypted: String,
}

impl Default for FileMarkers {
    fn default() -> Self {
        Self {
            decrypted: DECRYPTED_MARKER.to_string(),
            encrypted: ENCRYPTED_MARKER.to_string(),
        }
    }
}

impl FileMarkers {
    pub fn validate(&self) -> Result<()> {
        if self.decrypted.is_empty() || self.encrypted.is_empty() {
            return Err(WrapperError::config("file markers must not be empty"));
        }
        if self.decrypted == self.encrypted {
            return Err(WrapperError::config(
                "decrypted and encrypted markers must differ",
            ));
        }
        if self.decrypted.contains('/') || self.encrypted.contains('/') {
            return Err(WrapperError::config("file markers must not contain '/'"));
        }
        Ok(())
    }

    /// Default pattern for plaintext files, e.g. `*.dec.yaml`
    pub fn decrypted_pattern(&self) -> String {
        format!("*{}yaml", self.decrypted)
    }

    /// Default pattern for encrypted files, e.g. `*.enc.yaml`
    pub fn encrypted_pattern(&self) -> String {
        format!("*{}yaml", self.encrypted)
    }

    /// Pair a discovered plaintext file with its encrypted counterpart.
    ///
    /// Returns `None` when the file name carries no decrypted marker.
    pub fn pair_from_plaintext(&self, plaintext: &Path) -> Option<SecretFilePair> {
        let encrypted = swap_marker(plaintext, &self.decrypted, &self.encrypted)?;
        Some(SecretFilePair {
            plaintext: plaintext.to_path_buf(),
            encrypted,
        })
    }

    /// Pair a discovered encrypted file with its plaintext counterpart.
    ///
    /// Returns `None` when the file name carries no encrypted marker.
    pub fn pair_from_encrypted(&self, encrypted: &Path) -> Option<SecretFilePair> {
        let plaintext = swap_marker(encrypted, &self.encrypted, &self.decrypted)?;
        Some(SecretFilePair {
            plaintext,
            encrypted: encrypted.to_path_buf(),
        })
    }
}

fn swap_marker(path: &Path, from: &str, to: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    if !name.contains(from) {
        warn!(
            "Cannot derive counterpart for {}: name lacks '{}'",
            path.display(),
            from
        );
        return None;
    }
    Some(path.with_file_name(name.replace(from, to)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "key: value\n").unwrap();
        path
    }

    #[test]
    fn test_find_files_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "b/app.dec.yaml");
        touch(root, "a/db.dec.yaml");
        touch(root, "top.dec.yaml");
        touch(root, "a/db.enc.yaml");
        touch(root, "notes.txt");

        let files = find_files("*.dec.yaml", root).unwrap();
        assert_eq!(
            files,
            vec![
                root.join("a/db.dec.yaml"),
                root.join("b/app.dec.yaml"),
                root.join("top.dec.yaml"),
            ]
        );
    }

    #[test]
    fn test_find_files_with_directory_component() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "secrets/prod/api.enc.yaml");
        touch(root, "infra/secrets/ci.enc.yaml");
        touch(root, "secrets/ci.enc.yaml");

        let files = find_files("secrets/*.enc.yaml", root).unwrap();
        assert_eq!(
            files,
            vec![root.join("infra/secrets/ci.enc.yaml"), root.join("secrets/ci.enc.yaml")]
        );

        let files = find_files("**/secrets/*.enc.yaml", root).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_find_files_recursive_wildcard_inside_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "secrets/a.dec.yaml");
        touch(root, "secrets/x/b.dec.yaml");
        touch(root, "secrets/x/y/c.dec.yaml");
        touch(root, "other/d.dec.yaml");

        let files = find_files("secrets/**/*.dec.yaml", root).unwrap();
        assert_eq!(
            files,
            vec![
                root.join("secrets/a.dec.yaml"),
                root.join("secrets/x/b.dec.yaml"),
                root.join("secrets/x/y/c.dec.yaml"),
            ]
        );
    }

    #[test]
    fn test_find_files_follows_file_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "real.yaml");
        std::os::unix::fs::symlink("real.yaml", root.join("link.dec.yaml")).unwrap();
        std::os::unix::fs::symlink("missing.yaml", root.join("dangling.dec.yaml")).unwrap();

        let files = find_files("*.dec.yaml", root).unwrap();
        assert_eq!(files, vec![root.join("link.dec.yaml")]);
    }

    #[test]
    fn test_find_files_ignores_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("weird.dec.yaml")).unwrap();

        assert!(find_files("*.dec.yaml", root).unwrap().is_empty());
    }

    #[test]
    fn test_find_files_empty_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_files("*.dec.yaml", temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_find_files_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let result = find_files("[unclosed", temp_dir.path());
        assert!(matches!(result, Err(WrapperError::Pattern(_))));
    }

    #[test]
    fn test_pairing_from_plaintext() {
        let markers = FileMarkers::default();
        let pair = markers
            .pair_from_plaintext(Path::new("secrets/ci/secrets.dec.yaml"))
            .unwrap();
        assert_eq!(pair.encrypted, PathBuf::from("secrets/ci/secrets.enc.yaml"));
    }

    #[test]
    fn test_pairing_only_touches_file_name() {
        let markers = FileMarkers::default();
        let pair = markers
            .pair_from_encrypted(Path::new("/srv/x.enc.d/app.enc.yaml"))
            .unwrap();
        assert_eq!(pair.plaintext, PathBuf::from("/srv/x.enc.d/app.dec.yaml"));
    }

    #[test]
    fn test_pairing_without_marker_is_rejected() {
        let markers = FileMarkers::default();
        assert!(markers.pair_from_plaintext(Path::new("plain.yaml")).is_none());
        assert!(markers.pair_from_encrypted(Path::new("app.dec.yaml")).is_none());
    }

    #[test]
    fn test_default_patterns() {
        let markers = FileMarkers::default();
        assert_eq!(markers.decrypted_pattern(), "*.dec.yaml");
        assert_eq!(markers.encrypted_pattern(), "*.enc.yaml");
    }

    #[test]
    fn test_marker_validation() {
        let same = FileMarkers {
            decrypted: ".x.".to_string(),
            encrypted: ".x.".to_string(),
        };
        assert!(same.validate().is_err());
        assert!(FileMarkers::default().validate().is_ok());
    }
}
