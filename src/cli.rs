use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sops-wrapper - change-aware, parallel sops encryption for YAML secrets
#[derive(Parser)]
#[command(name = "sops-wrapper")]
#[command(about = "Encrypt, decrypt and rotate keys of YAML secrets with sops")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "SOPS_WRAPPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// sops executable to use
    #[arg(long, global = true)]
    pub sops_binary: Option<PathBuf>,

    /// AWS profile passed to sops as AWS_PROFILE
    #[arg(long, global = true)]
    pub aws_profile: Option<String>,

    /// Maximum number of parallel workers
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encrypt changed plaintext files (default pattern: *.dec.yaml)
    Encrypt {
        /// File name pattern, matched recursively
        pattern: Option<String>,
        /// Directory to search (default: current directory)
        base_dir: Option<PathBuf>,
        /// Run `sops updatekeys` on each file after encrypting it
        #[arg(long)]
        update_keys: bool,
    },
    /// Decrypt encrypted files (default pattern: *.enc.yaml)
    Decrypt {
        /// File name pattern, matched recursively
        pattern: Option<String>,
        /// Directory to search (default: current directory)
        base_dir: Option<PathBuf>,
    },
    /// Update the keys of encrypted files (default pattern: *.enc.yaml)
    #[command(alias = "updatekeys")]
    RotateKeys {
        /// File name pattern, matched recursively
        pattern: Option<String>,
        /// Directory to search (default: current directory)
        base_dir: Option<PathBuf>,
    },
    /// Decrypt a secrets file into an env file for `act`
    #[command(alias = "to-act")]
    Export {
        /// Encrypted secrets file (default: secrets/ci/secrets.enc.yaml)
        secrets_file: Option<PathBuf>,
        /// Output env file (default: .act/.secrets)
        output_file: Option<PathBuf>,
        /// Top-level section to export (default: act)
        section: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
