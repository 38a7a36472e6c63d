//! Cleanup of `ssh`/`scp` children when the controller stops.
//!
//! Each child runs as leader of its own process group and is registered
//! while it runs. On SIGINT/SIGTERM/SIGHUP, or when a [`ProcessGuard`] drops,
//! every registered group is killed in one pass.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Process groups of the children currently running.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    groups: HashSet<u32>,
}

impl ChildRegistry {
    pub fn global() -> &'static Mutex<ChildRegistry> {
        CHILD_REGISTRY.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    pub fn register(&mut self, pgid: u32) {
        self.groups.insert(pgid);
        debug!("Tracking process group {}", pgid);
    }

    pub fn unregister(&mut self, pgid: u32) {
        self.groups.remove(&pgid);
    }

    /// SIGKILL every tracked group and forget it.
    pub fn kill_all(&mut self) {
        if self.groups.is_empty() {
            return;
        }
        info!("Killing {} child process group(s)", self.groups.len());
        for pgid in self.groups.drain() {
            // Negative PID addresses the whole group
            if let Err(e) = signal::kill(Pid::from_raw(-(pgid as i32)), Signal::SIGKILL) {
                warn!("Failed to kill process group {}: {}", pgid, e);
            }
        }
    }
}

/// Kills all registered children when dropped.
#[derive(Debug, Default)]
pub struct ProcessGuard;

impl ProcessGuard {
    pub fn new() -> Self {
        Self
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.kill_all();
        }
    }
}

/// Kill children on SIGINT, SIGTERM or SIGHUP, then exit with 128 + signal.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping provisioning", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.kill_all();
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}
