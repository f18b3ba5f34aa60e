//! sops-wrapper - main entry point

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use sops_wrapper::cli::{Cli, Commands};
use sops_wrapper::config::WrapperConfig;
use sops_wrapper::operations::OperationRunner;
use sops_wrapper::orchestrator::Orchestrator;
use sops_wrapper::process_guard::{self, ProcessGuard};
use sops_wrapper::sanity;
use sops_wrapper::tool_runner::ToolRunner;

/// Initialize tracing; `RUST_LOG` overrides the level chosen by `-v`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}

/// Built-in defaults, then the config file, then command-line flags.
fn resolve_config(cli: &Cli) -> Result<WrapperConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            WrapperConfig::load_from_file(path)?
        }
        None => WrapperConfig::default(),
    };

    if let Some(binary) = &cli.sops_binary {
        config.sops_binary = binary.clone();
    }
    if let Some(profile) = &cli.aws_profile {
        config.aws_profile = Some(profile.clone());
    }
    if let Some(workers) = cli.max_workers {
        config.max_workers = workers;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn base_dir_or_cwd(base_dir: Option<PathBuf>) -> Result<PathBuf> {
    match base_dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

/// Run the selected command. `Ok(true)` means at least one operation
/// succeeded.
fn run_command(command: Commands, config: &WrapperConfig, runner: ToolRunner) -> Result<bool> {
    let orchestrator = Orchestrator::new(
        OperationRunner::new(runner),
        config.markers.clone(),
        config.max_workers,
    );

    let report = match command {
        Commands::Encrypt {
            pattern,
            base_dir,
            update_keys,
        } => {
            let pattern = pattern.unwrap_or_else(|| config.markers.decrypted_pattern());
            let base_dir = base_dir_or_cwd(base_dir)?;
            orchestrator.encrypt_files(&pattern, &base_dir, update_keys)?
        }
        Commands::Decrypt { pattern, base_dir } => {
            let pattern = pattern.unwrap_or_else(|| config.markers.encrypted_pattern());
            let base_dir = base_dir_or_cwd(base_dir)?;
            orchestrator.decrypt_files(&pattern, &base_dir)?
        }
        Commands::RotateKeys { pattern, base_dir } => {
            let pattern = pattern.unwrap_or_else(|| config.markers.encrypted_pattern());
            let base_dir = base_dir_or_cwd(base_dir)?;
            orchestrator.rotate_keys_files(&pattern, &base_dir)?
        }
        Commands::Export {
            secrets_file,
            output_file,
            section,
        } => {
            let secrets_file = secrets_file.unwrap_or_else(|| config.export.secrets_file.clone());
            let output_file = output_file.unwrap_or_else(|| config.export.output_file.clone());
            let section = section.unwrap_or_else(|| config.export.section.clone());
            return run_export(&orchestrator, &secrets_file, &output_file, &section);
        }
    };

    debug!("Batch report: {:?}", report);
    Ok(report.any_succeeded())
}

fn run_export(
    orchestrator: &Orchestrator,
    secrets_file: &Path,
    output_file: &Path,
    section: &str,
) -> Result<bool> {
    match orchestrator
        .operations()
        .export_env(secrets_file, output_file, section)
    {
        Ok(_) => Ok(true),
        Err(e) => {
            error!("Error converting to act format: {}", e);
            Ok(false)
        }
    }
}

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };
    debug!("Resolved configuration: {:?}", config);

    let runner = ToolRunner::from_config(&config);
    if let Err(e) = sanity::run_preflight_checks(&runner) {
        sanity::print_error_and_exit(&e);
    }

    let guard = ProcessGuard::new();
    let succeeded = match run_command(cli.command, &config, runner) {
        Ok(succeeded) => succeeded,
        Err(e) => {
            error!("{:#}", e);
            false
        }
    };
    drop(guard);

    if let Some(sig) = process_guard::interrupted_signal() {
        std::process::exit(128 + sig);
    }
    std::process::exit(if succeeded { 0 } else { 1 });
}
