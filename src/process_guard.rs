//! Lifecycle of the phase process currently running.
//!
//! Phases run one at a time, so at most one child process group is alive at
//! any moment. It is tracked in a global slot so that a SIGINT/SIGTERM/SIGHUP
//! delivered to phasebook also stops the playbook (and everything it
//! spawned) instead of leaving it orphaned.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

static RUNNING: OnceLock<Mutex<Option<RunningChild>>> = OnceLock::new();

/// Process group of the phase being executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningChild {
    pub pid: u32,
    pub phase: String,
}

fn slot() -> &'static Mutex<Option<RunningChild>> {
    RUNNING.get_or_init(|| Mutex::new(None))
}

/// Serializes unit tests that spawn registered processes
#[cfg(test)]
pub(crate) fn lock_registry_for_test() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Global handle on the running phase process
pub struct ChildRegistry;

impl ChildRegistry {
    /// Remember `pid` as the running process for `phase`.
    pub fn register(pid: u32, phase: &str) {
        if let Ok(mut running) = slot().lock() {
            tracing::debug!("Registered PID {} for phase {}", pid, phase);
            *running = Some(RunningChild {
                pid,
                phase: phase.to_string(),
            });
        }
    }

    /// Forget `pid` once it has exited.
    pub fn unregister(pid: u32) {
        if let Ok(mut running) = slot().lock() {
            if running.as_ref().is_some_and(|child| child.pid == pid) {
                *running = None;
                tracing::debug!("Unregistered PID {}", pid);
            }
        }
    }

    pub fn current() -> Option<RunningChild> {
        slot().lock().ok().and_then(|running| running.clone())
    }

    /// Stop the running process group: SIGTERM, wait up to `grace_period`,
    /// then SIGKILL. Does nothing when no phase is running.
    pub fn terminate_running(grace_period: Duration) {
        let Some(child) = slot().lock().ok().and_then(|mut running| running.take()) else {
            return;
        };
        tracing::warn!(
            "Terminating phase {} (process group {})",
            child.phase,
            child.pid
        );
        terminate_group(child.pid, grace_period);
    }
}

fn terminate_group(pgid: u32, grace_period: Duration) {
    if let Err(e) = signal_group(pgid, Signal::SIGTERM) {
        tracing::warn!("Failed to send SIGTERM to process group {}: {}", pgid, e);
    }

    let start = Instant::now();
    while start.elapsed() < grace_period {
        if !is_process_alive(pgid) {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    if is_process_alive(pgid) {
        tracing::warn!("Process group {} did not terminate, sending SIGKILL", pgid);
        let _ = signal_group(pgid, Signal::SIGKILL);
    }
}

/// Negative PID targets the whole group, reaching ansible's own children.
fn signal_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Alive means the PID exists and is not a zombie.
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // Field 3 is the state; Z and X are not running
        if let Some(state) = stat.split_whitespace().nth(2) {
            return !matches!(state, "Z" | "X");
        }
    }
    true
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that stop the running phase and
/// exit with 128 + signal number. Call once at startup.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::info!("Received signal {}, stopping current phase", sig);
            ChildRegistry::terminate_running(Duration::from_secs(3));
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for spawning a command as the leader of its own group
pub trait CommandProcessGroup {
    /// Put the child in a new process group and have it receive SIGTERM if
    /// phasebook dies.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe setpgid and prctl
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_terminate_group_kills_real_process() {
        let mut child = Command::new("bash")
            .args(["-c", "sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn bash sleep process");
        let pid = child.id();

        assert!(is_process_alive(pid));
        terminate_group(pid, Duration::from_millis(500));

        let status = child.wait().expect("wait for child");
        assert!(!status.success());
    }

    #[test]
    fn test_terminate_running_stops_registered_group() {
        let _guard = lock_registry_for_test();
        let mut child = Command::new("bash")
            .args(["-c", "sleep 60 & wait"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn bash sleep process");
        let pid = child.id();

        ChildRegistry::register(pid, "setup");
        assert_eq!(
            ChildRegistry::current(),
            Some(RunningChild {
                pid,
                phase: "setup".to_string()
            })
        );

        ChildRegistry::terminate_running(Duration::from_millis(500));
        assert_eq!(ChildRegistry::current(), None);
        let status = child.wait().expect("wait for child");
        assert!(!status.success());
    }

    #[test]
    fn test_unregister_keeps_other_pid() {
        let _guard = lock_registry_for_test();
        ChildRegistry::register(4242, "run");
        ChildRegistry::unregister(4343);
        assert_eq!(ChildRegistry::current().map(|c| c.pid), Some(4242));
        ChildRegistry::unregister(4242);
        assert_eq!(ChildRegistry::current(), None);
    }

    #[test]
    fn test_terminate_running_without_child_is_noop() {
        let _guard = lock_registry_for_test();
        ChildRegistry::terminate_running(Duration::from_millis(10));
        assert_eq!(ChildRegistry::current(), None);
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999_999));
    }
}
