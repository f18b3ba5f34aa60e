//! Pre-flight availability check for the sops binary
//!
//! Every command is gated on `sops --version` succeeding. A missing binary,
//! a hung version query and a non-zero exit all mean "unavailable"; the CLI
//! then exits before any cryptographic call is attempted.

use tracing::{debug, info};

use crate::error::{Result, WrapperError};
use crate::tool_runner::ToolRunner;
use crate::tool_traits::SopsCommand;

/// Check whether sops answers `--version` within the probe timeout.
pub fn check_tool_available(runner: &ToolRunner) -> bool {
    match runner.run(&SopsCommand::Version) {
        Ok(output) if output.success => {
            let version = String::from_utf8_lossy(&output.stdout);
            info!("Using {}", version.trim());
            true
        }
        Ok(output) => {
            debug!(
                "{} --version exited with {:?}: {}",
                runner.program().display(),
                output.exit_code,
                output.stderr.trim()
            );
            false
        }
        Err(e) => {
            debug!("sops availability check failed: {}", e);
            false
        }
    }
}

/// Fail with `WrapperError::ToolUnavailable` unless sops is usable.
pub fn run_preflight_checks(runner: &ToolRunner) -> Result<()> {
    debug!("Running pre-flight check for {}", runner.program().display());

    if !check_tool_available(runner) {
        return Err(WrapperError::tool_unavailable(
            runner.program().display().to_string(),
        ));
    }

    Ok(())
}

/// Print a boxed diagnostic to stderr and exit with status 1
pub fn print_error_and_exit(err: &WrapperError) -> ! {
    eprintln!();
    eprintln!("╔══════════════════════════════════════════════════════════════════╗");
    eprintln!("║              sops-wrapper - Pre-flight Check Failed              ║");
    eprintln!("╚══════════════════════════════════════════════════════════════════╝");
    eprintln!();
    eprintln!("❌ ERROR: {}", err);
    eprintln!();
    eprintln!("   Install sops (https://github.com/getsops/sops) and make sure it");
    eprintln!("   is on PATH, or point --sops-binary at the executable.");
    eprintln!();

    std::process::exit(1);
}
