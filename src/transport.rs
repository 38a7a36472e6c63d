//! How plan steps reach a host.
//!
//! The sequencer only talks to a [`Transport`]. [`crate::ssh::SshTransport`]
//! drives a real guest; [`DryRunTransport`] logs what would happen and
//! always succeeds.

use crate::error::Result;
use crate::script_runner::ScriptOutput;
use crate::step::ScriptStep;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Delivery of steps to one host.
pub trait Transport {
    /// Name of the target, used in logs and errors.
    fn target(&self) -> &str;

    /// Run one script step in the context its privilege flag selects.
    ///
    /// A script that runs and exits non-zero is `Ok` with `success == false`;
    /// `Err` means the step could not be delivered at all.
    fn run_script(&self, step: &ScriptStep) -> Result<ScriptOutput>;

    /// Ask the host to restart. Returns once the request has been issued.
    /// A refused request is an error.
    fn request_reboot(&self) -> Result<()>;

    /// Whether the host currently accepts connections.
    fn is_reachable(&self) -> bool;

    /// Identifier of the host's current boot, or `None` if the transport
    /// cannot tell. A reboot only counts once this value has changed.
    fn boot_id(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Logs steps without executing anything.
#[derive(Debug, Clone)]
pub struct DryRunTransport {
    target: String,
}

impl DryRunTransport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Transport for DryRunTransport {
    fn target(&self) -> &str {
        &self.target
    }

    fn run_script(&self, step: &ScriptStep) -> Result<ScriptOutput> {
        let mode = if step.privileged() { "privileged" } else { "unprivileged" };
        info!(
            "[DRY RUN] {}: {} ({}) args={:?} env={:?}",
            self.target,
            step.path().display(),
            mode,
            step.display_args(),
            step.display_env()
        );
        Ok(ScriptOutput::ok(format!(
            "[DRY RUN] Skipped: {}\n",
            step.script_name()
        )))
    }

    fn request_reboot(&self) -> Result<()> {
        info!("[DRY RUN] {}: reboot", self.target);
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        true
    }
}

/// TCP connect check against every address `host:port` resolves to.
pub fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("Cannot resolve {}:{}: {}", host, port, e);
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => {
                debug!("{} is accepting connections", addr);
                return true;
            }
            Err(e) => debug!("{} not reachable: {}", addr, e),
        }
    }
    false
}
