//! Lifecycle of step-script child processes.
//!
//! Each step runs in its own process group and is tracked in a global
//! registry. When the installer is interrupted (SIGINT, SIGTERM, SIGHUP) the
//! whole group of every tracked child gets SIGTERM, then SIGKILL after a
//! grace period, and the installer exits with `128 + signal`.
//!
//! Unelevated children also get SIGTERM if the installer dies without running
//! its handlers. Steps launched through sudo do not: the kernel clears the
//! parent-death signal when sudo's setuid image is executed, so those only
//! stop through the handlers above.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL on interrupt
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// PIDs (and process group ids) of running step scripts
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    terminating: bool,
}

impl ChildRegistry {
    /// The process-wide registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        log::debug!("Tracking child PID {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        log::debug!("Child PID {} finished", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Stop every tracked process group.
    ///
    /// Runs at most once per registry.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.terminating {
            return;
        }
        self.terminating = true;

        if self.pids.is_empty() {
            return;
        }

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        log::warn!("Stopping {} running step(s)", pids.len());

        for &pid in &pids {
            signal_tree(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in pids.iter().filter(|&&pid| is_process_alive(pid)) {
            log::warn!("PID {} ignored SIGTERM, sending SIGKILL", pid);
            signal_tree(pid, Signal::SIGKILL);
        }
        self.pids.clear();
    }
}

/// Signal the process group led by `pid`, falling back to the process itself.
fn signal_tree(pid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(-raw), sig) {
        log::debug!("Group signal {} to {} failed: {}", sig, pid, e);
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            log::warn!("Failed to send {} to PID {}: {}", sig, pid, e);
        }
    }
}

/// Whether `pid` exists and is not a zombie
fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if signal::kill(Pid::from_raw(raw), None).is_err() {
        return false;
    }

    // Third field of /proc/<pid>/stat is the state letter
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(|state| !matches!(state, "Z" | "X"))
            .unwrap_or(true),
        Err(_) => true,
    }
}

/// Terminates tracked children when dropped.
///
/// `main` holds one for the duration of the run so an early return or panic
/// unwinding through it still stops running steps.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(INTERRUPT_GRACE);
        }
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handling. Call once at start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let name = Signal::try_from(sig).map(|s| s.as_str()).unwrap_or("signal");
            log::warn!("Interrupted by {}", name);
            eprintln!("\nInterrupted ({}). Stopping running steps.", name);

            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(INTERRUPT_GRACE);
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Process group setup for step-script commands
pub trait CommandProcessGroup {
    /// Start the command as leader of a new process group. Unless the
    /// command is setuid (sudo), its leader gets SIGTERM when the spawning
    /// thread dies.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        self.process_group(0);
        // SAFETY: the closure only makes a single async-signal-safe prctl call
        unsafe {
            self.pre_exec(|| {
                nix::sys::prctl::set_pdeathsig(Signal::SIGTERM)
                    .map_err(std::io::Error::from)
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn wait_for_exit(child: &mut std::process::Child, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234);
        registry.register(5678);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_all_stops_process_group() {
        let mut child = Command::new("bash")
            .args(["-c", "sleep 60 & wait"])
            .in_new_process_group()
            .spawn()
            .unwrap();

        let mut registry = ChildRegistry::default();
        registry.register(child.id());
        std::thread::sleep(Duration::from_millis(50));

        registry.terminate_all(Duration::from_millis(500));

        assert!(wait_for_exit(&mut child, Duration::from_secs(3)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_terminate_all_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.register(999_999);

        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.terminating);

        registry.register(999_998);
        registry.terminate_all(Duration::from_millis(10));
        // Second call was a no-op
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_all_tolerates_reaped_child() {
        let mut child = Command::new("bash").args(["-c", "exit 0"]).spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        registry.terminate_all(Duration::from_millis(100));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_is_process_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(999_999));
    }
}
