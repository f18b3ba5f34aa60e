//! Runtime configuration for sops-wrapper.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. Precedence is: built-in defaults, then the JSON config file,
//! then command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::FileMarkers;

/// Default sops binary, resolved through PATH
pub const DEFAULT_SOPS_BINARY: &str = "sops";

/// Environment variable sops (through the AWS SDK) reads the profile from
pub const DEFAULT_PROFILE_ENV_VAR: &str = "AWS_PROFILE";

/// Default number of parallel workers per batch
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Path or name of the sops executable
    pub sops_binary: PathBuf,
    /// Name of the variable carrying the credentials profile
    pub profile_env_var: String,
    /// Credentials profile handed to every sops invocation (unset if None)
    pub aws_profile: Option<String>,
    /// Worker pool width
    pub max_workers: usize,
    /// File name markers used to pair plaintext and encrypted files
    pub markers: FileMarkers,
    /// Per-operation time budgets
    pub timeouts: ToolTimeouts,
    /// Defaults for the `export` command
    pub export: ExportDefaults,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            sops_binary: PathBuf::from(DEFAULT_SOPS_BINARY),
            profile_env_var: DEFAULT_PROFILE_ENV_VAR.to_string(),
            aws_profile: None,
            max_workers: DEFAULT_MAX_WORKERS,
            markers: FileMarkers::default(),
            timeouts: ToolTimeouts::default(),
            export: ExportDefaults::default(),
        }
    }
}

/// Timeouts for each kind of sops invocation, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolTimeouts {
    pub probe_secs: u64,
    pub encrypt_secs: u64,
    pub decrypt_secs: u64,
    pub updatekeys_secs: u64,
    pub compare_secs: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe_secs: 10,
            encrypt_secs: 60,
            decrypt_secs: 60,
            updatekeys_secs: 60,
            compare_secs: 30,
        }
    }
}

impl ToolTimeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn encrypt(&self) -> Duration {
        Duration::from_secs(self.encrypt_secs)
    }

    pub fn decrypt(&self) -> Duration {
        Duration::from_secs(self.decrypt_secs)
    }

    pub fn updatekeys(&self) -> Duration {
        Duration::from_secs(self.updatekeys_secs)
    }

    /// Budget for the round-trip decrypt done by change detection
    pub fn compare(&self) -> Duration {
        Duration::from_secs(self.compare_secs)
    }

    fn all(&self) -> [(&'static str, u64); 5] {
        [
            ("probe_secs", self.probe_secs),
            ("encrypt_secs", self.encrypt_secs),
            ("decrypt_secs", self.decrypt_secs),
            ("updatekeys_secs", self.updatekeys_secs),
            ("compare_secs", self.compare_secs),
        ]
    }
}

/// Defaults for converting a secrets file to the `act` env format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    pub secrets_file: PathBuf,
    pub output_file: PathBuf,
    pub section: String,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            secrets_file: PathBuf::from("secrets/ci/secrets.enc.yaml"),
            output_file: PathBuf::from(".act/.secrets"),
            section: "act".to_string(),
        }
    }
}

impl WrapperConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sops_binary.as_os_str().is_empty() {
            anyhow::bail!("sops_binary must not be empty");
        }

        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be at least 1");
        }

        if self.profile_env_var.trim().is_empty() {
            anyhow::bail!("profile_env_var must not be empty");
        }

        if self.aws_profile.as_deref().is_some_and(|p| p.trim().is_empty()) {
            anyhow::bail!("aws_profile must not be blank when set");
        }

        self.markers.validate()?;

        for (name, secs) in self.timeouts.all() {
            if secs == 0 {
                anyhow::bail!("timeouts.{} must be greater than zero", name);
            }
        }

        if self.export.section.trim().is_empty() {
            anyhow::bail!("export.section must not be empty");
        }

        Ok(())
    }

    /// Environment handed to every sops subprocess
    pub fn tool_env(&self) -> Vec<(String, String)> {
        match &self.aws_profile {
            Some(profile) => vec![(self.profile_env_var.clone(), profile.clone())],
            None => Vec::new(),
        }
    }
}
