//! Lifecycle management for sops child processes
//!
//! Every sops invocation runs in its own process group and is tracked in a
//! global registry. This gives us two things:
//!
//! - a hung invocation can be killed together with anything it spawned
//!   (KMS helpers, credential processes) when its timeout expires;
//! - on SIGINT/SIGTERM/SIGHUP the interrupt flag is raised and all
//!   in-flight invocations are terminated. Workers then unwind normally
//!   (so staged temp files are cleaned up) and `main` exits with
//!   `128 + signo`. A second signal, or workers that fail to unwind within
//!   `UNWIND_GRACE_PERIOD`, forces the exit.
//!
//! Children get `PR_SET_PDEATHSIG` so they also die if the wrapper crashes.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL when the wrapper is interrupted
pub const INTERRUPT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// How long workers get to unwind after an interrupt before a forced exit
pub const UNWIND_GRACE_PERIOD: Duration = Duration::from_secs(10);

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();
static INTERRUPT_STATE: OnceLock<Arc<AtomicI32>> = OnceLock::new();

/// Process-wide interrupt flag: the received signal number, 0 if none.
pub fn interrupt_state() -> Arc<AtomicI32> {
    INTERRUPT_STATE
        .get_or_init(|| Arc::new(AtomicI32::new(0)))
        .clone()
}

/// The signal that interrupted the wrapper, if any.
pub fn interrupted_signal() -> Option<i32> {
    signal_in(&interrupt_state())
}

/// Read a signal number out of an interrupt flag.
pub fn signal_in(state: &AtomicI32) -> Option<i32> {
    match state.load(Ordering::SeqCst) {
        0 => None,
        sig => Some(sig),
    }
}

/// Registry tracking all running sops processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Set once cleanup ran, so concurrent signal + drop do not double-kill
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered sops process PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered sops process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked child processes.
    /// Sends SIGTERM first, waits up to `grace_period`, then SIGKILL.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            debug!("No sops processes to terminate");
            return;
        }

        info!("Terminating {} sops process(es)...", self.pids.len());

        let pids_to_kill: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids_to_kill {
            signal_group_or_process(pid, Signal::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids_to_kill.iter().all(|&pid| !is_process_alive(pid)) {
                info!("All sops processes terminated gracefully");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids_to_kill {
            if is_process_alive(pid) {
                warn!("Process group {} did not terminate, sending SIGKILL", pid);
                signal_group_or_process(pid, Signal::SIGKILL);
            }
        }

        self.pids.clear();
        info!("Child process cleanup complete");
    }
}

/// Kill a timed-out invocation and everything in its process group.
pub fn kill_process_group(pid: u32) {
    signal_group_or_process(pid, Signal::SIGKILL);
}

/// Signal the whole group, falling back to the single process.
fn signal_group_or_process(pid: u32, sig: Signal) {
    if let Err(e) = send_signal_to_group(pid, sig) {
        debug!("Failed to send {:?} to process group {}: {}", sig, pid, e);
        if let Err(e2) = send_signal(pid, sig) {
            debug!("Failed to send {:?} to PID {}: {}", sig, pid, e2);
        }
    } else {
        debug!("Sent {:?} to process group {}", sig, pid);
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID addresses the whole process group
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (zombies count as dead)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// RAII guard that terminates all tracked sops processes on drop.
/// Held by `main` for the lifetime of a command.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        debug!("ProcessGuard dropped, initiating cleanup");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(Duration::from_secs(5));
        }
    }
}

/// Install handlers for SIGINT (Ctrl+C), SIGTERM and SIGHUP.
///
/// The handler thread raises the interrupt flag and terminates in-flight
/// sops processes. `main` is expected to exit with `128 + signo` once the
/// batch unwinds, so Ctrl+C yields the conventional 130. Call once at
/// program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        let mut received = signals.forever();
        if let Some(sig) = received.next() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            if sig == SIGINT {
                eprintln!("\nOperation cancelled by user");
            }
            warn!("Received {}, aborting batch", signal_name);

            interrupt_state().store(sig, Ordering::SeqCst);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(INTERRUPT_GRACE_PERIOD);
            }

            thread::spawn(move || {
                thread::sleep(UNWIND_GRACE_PERIOD);
                warn!("Workers did not stop in time, exiting");
                std::process::exit(128 + sig);
            });

            if received.next().is_some() {
                std::process::exit(128 + sig);
            }
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of its own process group, with a parent
    /// death signal set.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe functions
        // (setpgid, prctl) between fork and exec.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
