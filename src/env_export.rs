//! Conversion of decrypted YAML secrets into `KEY=value` lines for `act`.
//!
//! Conversion is pure: no I/O happens here, the command layer does the
//! decrypting and writing.

use serde_yaml::{Mapping, Value};
use tracing::warn;

use crate::error::{Result, WrapperError};

/// Number of keys shown in the redacted preview
pub const PREVIEW_LIMIT: usize = 5;

/// Ordered env entries extracted from one section of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvExport {
    entries: Vec<(String, String)>,
}

impl EnvExport {
    /// Build from YAML text.
    pub fn from_yaml_str(content: &str, section: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(content)?;
        Self::from_document(&document, section)
    }

    /// Build from a parsed document.
    ///
    /// The document must be a mapping. If `section` is missing or not a
    /// mapping the whole document is exported instead. `<<` merge keys are
    /// resolved first.
    pub fn from_document(document: &Value, section: &str) -> Result<Self> {
        let mut document = document.clone();
        document.apply_merge()?;

        let Some(root) = mapping_of(&document) else {
            return Err(WrapperError::export("YAML content must be a mapping"));
        };

        let source = match root.get(section).and_then(mapping_of) {
            Some(section_map) => section_map,
            None => {
                warn!(
                    "Section '{}' not found or not a mapping, using entire document",
                    section
                );
                root
            }
        };

        let mut entries = Vec::with_capacity(source.len());
        for (key, value) in source {
            let key = render_scalar_key(key)?.to_uppercase();
            let value = quote_if_needed(render_value(value)?);
            entries.push((key, value));
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `KEY=value` line per entry, no trailing newline.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Redacted preview: `KEY=***` for the first `limit` keys.
    pub fn preview(&self, limit: usize) -> Vec<String> {
        self.entries
            .iter()
            .take(limit)
            .map(|(key, _)| format!("{}=***", key))
            .collect()
    }
}

/// Convert a decrypted document to env-file text.
pub fn to_env_format(document: &Value, section: &str) -> Result<String> {
    Ok(EnvExport::from_document(document, section)?.render())
}

fn mapping_of(value: &Value) -> Option<&Mapping> {
    match value {
        Value::Mapping(map) => Some(map),
        Value::Tagged(tagged) => mapping_of(&tagged.value),
        _ => None,
    }
}

fn render_scalar_key(key: &Value) -> Result<String> {
    match key {
        Value::Sequence(_) | Value::Mapping(_) => {
            Err(WrapperError::export("mapping keys must be scalars"))
        }
        other => render_value(other),
    }
}

/// One rule per YAML value variant.
fn render_value(value: &Value) -> Result<String> {
    let rendered = match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value)?,
        Value::Tagged(tagged) => render_value(&tagged.value)?,
    };
    Ok(rendered)
}

fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '$' | '`' | '\\'))
}

/// Wrap in double quotes when the value has whitespace or shell-special
/// characters. Inside the quotes `\`, `"` and newlines are escaped so the
/// line stays parseable.
fn quote_if_needed(value: String) -> String {
    if !needs_quotes(&value) {
        return value;
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}
