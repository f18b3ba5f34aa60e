//! Content predicates for secret files.
//!
//! All functions are side-effect free and safe to call on paths that do not
//! exist; failures are answered with `false` / `None`, never raised.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// File exists, is a regular file and has size > 0.
pub fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// File is non-empty and parses as a single YAML document.
pub fn is_well_formed(path: &Path) -> bool {
    if !is_non_empty(path) {
        return false;
    }

    match fs::read_to_string(path) {
        Ok(content) => is_well_formed_str(&content),
        Err(_) => false,
    }
}

/// Text parses as a single YAML document.
pub fn is_well_formed_str(content: &str) -> bool {
    serde_yaml::from_str::<serde_yaml::Value>(content).is_ok()
}

/// SHA-256 hex digest of a file, `None` if it cannot be read.
pub fn file_digest(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| content_digest(&bytes))
}

/// SHA-256 hex digest of a byte slice.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_non_empty() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.yaml");
        assert!(!is_non_empty(&missing));

        let empty = temp_dir.path().join("empty.yaml");
        fs::write(&empty, "").unwrap();
        assert!(!is_non_empty(&empty));

        let full = temp_dir.path().join("full.yaml");
        fs::write(&full, "key: value\n").unwrap();
        assert!(is_non_empty(&full));

        assert!(!is_non_empty(temp_dir.path()));
    }

    #[test]
    fn test_is_well_formed() {
        let temp_dir = TempDir::new().unwrap();

        let valid = temp_dir.path().join("valid.yaml");
        fs::write(&valid, "act:\n  db_user: admin\n  count: 3\n").unwrap();
        assert!(is_well_formed(&valid));

        let invalid = temp_dir.path().join("invalid.yaml");
        fs::write(&invalid, "key: [unclosed\n").unwrap();
        assert!(!is_well_formed(&invalid));

        let empty = temp_dir.path().join("empty.yaml");
        fs::write(&empty, "").unwrap();
        assert!(!is_well_formed(&empty));

        let binary = temp_dir.path().join("binary.yaml");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0x01]).unwrap();
        assert!(!is_well_formed(&binary));

        assert!(!is_well_formed(&temp_dir.path().join("missing.yaml")));
    }

    #[test]
    fn test_file_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.yaml");
        fs::write(&path, "key: value\n").unwrap();

        let first = file_digest(&path).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(Some(first.clone()), file_digest(&path));
        assert_eq!(first, content_digest(b"key: value\n"));

        fs::write(&path, "key: other\n").unwrap();
        assert_ne!(Some(first), file_digest(&path));

        assert!(file_digest(&temp_dir.path().join("missing")).is_none());
    }
}
