//! Bounded sops execution
//!
//! `ToolRunner::run` is the only place that spawns sops. Every call:
//!
//! - runs in its own process group and is registered with
//!   `ChildRegistry::global()` for cleanup on interrupt;
//! - gets the configured credentials profile in its environment (the
//!   wrapper's own environment is never mutated);
//! - is bounded by a timeout, after which the whole process group is
//!   killed and `OperationError::Timeout` is returned;
//! - is refused, or stopped, once the interrupt flag is raised, returning
//!   `OperationError::Cancelled`.
//!
//! A non-zero exit is not an `Err` here; callers decide with
//! `ToolOutput::ensure_success`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::AtomicI32;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{ToolTimeouts, WrapperConfig};
use crate::error::OperationError;
use crate::process_guard::{
    ChildRegistry, CommandProcessGroup, interrupt_state, kill_process_group, signal_in,
};
use crate::tool_traits::ToolArgs;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output captured from one sops invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Raw standard output, written verbatim to artifacts.
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ToolOutput {
    /// Turn a non-zero exit into `OperationError::NonZeroExit`.
    pub fn ensure_success(self, operation: &'static str) -> Result<Self, OperationError> {
        if self.success {
            Ok(self)
        } else {
            Err(OperationError::NonZeroExit {
                operation,
                code: self.exit_code.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Spawns sops with a fixed program, environment and timeout table.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
    env: Vec<(String, String)>,
    timeouts: ToolTimeouts,
    interrupt: Arc<AtomicI32>,
}

impl ToolRunner {
    pub fn new(
        program: impl Into<PathBuf>,
        env: Vec<(String, String)>,
        timeouts: ToolTimeouts,
    ) -> Self {
        Self {
            program: program.into(),
            env,
            timeouts,
            interrupt: interrupt_state(),
        }
    }

    /// Watch `interrupt` instead of the process-wide flag.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicI32>) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn interrupted(&self) -> bool {
        signal_in(&self.interrupt).is_some()
    }

    pub fn from_config(config: &WrapperConfig) -> Self {
        Self::new(config.sops_binary.clone(), config.tool_env(), config.timeouts)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run one sops invocation with its configured timeout.
    pub fn run<T: ToolArgs>(&self, args: &T) -> Result<ToolOutput, OperationError> {
        self.run_with_timeout(args, args.timeout(&self.timeouts))
    }

    /// Run one sops invocation with an explicit timeout.
    pub fn run_with_timeout<T: ToolArgs>(
        &self,
        args: &T,
        timeout: Duration,
    ) -> Result<ToolOutput, OperationError> {
        let cli_args = args.to_cli_args();
        let operation = args.label();

        if self.interrupted() {
            return Err(OperationError::Cancelled { operation });
        }

        debug!(
            "run: {} {:?} (timeout {}s)",
            self.program.display(),
            cli_args,
            timeout.as_secs()
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&cli_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| OperationError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let waited = wait_with_deadline(&mut child, timeout, &self.interrupt);
        if !matches!(waited, Ok(Some(_))) {
            kill_process_group(pid);
            let _ = child.wait();
        }

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if self.interrupted() {
            return Err(OperationError::Cancelled { operation });
        }

        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => return Err(OperationError::Timeout { operation, timeout }),
            Err(source) => {
                return Err(OperationError::Spawn {
                    program: self.program.display().to_string(),
                    source,
                });
            }
        };

        let output = ToolOutput {
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
            success: status.success(),
        };

        debug!(
            "{} finished with exit code {:?} ({} bytes of output)",
            operation,
            output.exit_code,
            output.stdout.len()
        );

        Ok(output)
    }
}

/// Read a pipe to the end on a separate thread so a chatty child cannot
/// block on a full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Poll until the child exits; `Ok(None)` means the deadline passed or the
/// interrupt flag was raised.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    interrupt: &AtomicI32,
) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout || signal_in(interrupt).is_some() {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
