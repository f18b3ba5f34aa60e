//! Property-based tests for sops-wrapper
//!
//! These tests verify:
//! - env export lines always parse back to the original value
//! - discovery over an unchanged tree is deterministic and sorted

use proptest::prelude::*;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::fs;

use sops_wrapper::discovery::find_files;
use sops_wrapper::env_export::to_env_format;
use tempfile::TempDir;

// =============================================================================
// Env export
// =============================================================================

fn section_document(key: &str, value: &str) -> Value {
    let mut section = Mapping::new();
    section.insert(Value::String(key.to_string()), Value::String(value.to_string()));
    let mut root = Mapping::new();
    root.insert(Value::String("act".to_string()), Value::Mapping(section));
    Value::Mapping(root)
}

/// Reverse the escaping applied inside double quotes.
fn unescape(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

proptest! {
    /// Every value survives the quoting rules unchanged
    #[test]
    fn env_value_is_recoverable(
        key in "[a-z][a-z0-9_]{0,10}",
        value in "[ -~\t\n]{0,40}",
    ) {
        let line = to_env_format(&section_document(&key, &value), "act").unwrap();
        let prefix = format!("{}=", key.to_uppercase());
        prop_assert!(line.starts_with(&prefix));

        let rendered = &line[prefix.len()..];
        prop_assert!(!rendered.contains('\n'), "one entry must stay on one line");

        let recovered = if rendered.starts_with('"') {
            unescape(rendered).unwrap()
        } else {
            rendered.to_string()
        };
        prop_assert_eq!(recovered, value);
    }

    /// Values without whitespace or shell-special characters stay bare
    #[test]
    fn plain_values_are_not_quoted(value in "[A-Za-z0-9_./:@-]{1,30}") {
        let line = to_env_format(&section_document("key", &value), "act").unwrap();
        prop_assert_eq!(line, format!("KEY={}", value));
    }
}

// =============================================================================
// Discovery
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Discovery returns the same sorted list on repeated scans
    #[test]
    fn discovery_is_deterministic(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..12),
        nested in any::<bool>(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut expected = BTreeSet::new();
        for (i, name) in names.iter().enumerate() {
            let dir = if nested && i % 2 == 1 {
                temp_dir.path().join("sub")
            } else {
                temp_dir.path().to_path_buf()
            };
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(format!("{}.dec.yaml", name));
            fs::write(&path, "k: v\n").unwrap();
            fs::write(dir.join(format!("{}.txt", name)), "ignored").unwrap();
            expected.insert(path);
        }

        let first = find_files("*.dec.yaml", temp_dir.path()).unwrap();
        let second = find_files("*.dec.yaml", temp_dir.path()).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), names.len());
        let mut sorted = first.clone();
        sorted.sort();
        prop_assert_eq!(&first, &sorted);
        prop_assert_eq!(first.into_iter().collect::<BTreeSet<_>>(), expected);
    }
}
