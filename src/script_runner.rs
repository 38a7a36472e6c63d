//! Child process execution for transports.
//!
//! Every `ssh`/`scp` invocation goes through [`run_captured`] so that:
//!
//! - the child runs in its own process group
//! - its PID is registered for cleanup while it runs
//! - stdout/stderr are captured for the step report
//!
//! Commands are always built as argv lists; nothing here goes through a
//! local shell.

use crate::error::{ProvisionError, Result};
use crate::process_guard::ChildRegistry;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Output from a child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ScriptOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }

    /// Turn a failed run of plan step `index` into [`ProvisionError::StepFailed`].
    pub fn ensure_success(&self, index: usize, script: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(ProvisionError::StepFailed {
                index,
                script: script.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Spawn `cmd`, wait for it and capture its output.
///
/// A non-zero exit is reported in the returned [`ScriptOutput`], not as an
/// error; only spawn/wait failures are errors.
pub fn run_captured(cmd: &mut Command, label: &str) -> Result<ScriptOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| ProvisionError::transport(format!("Failed to spawn {}: {}", label, e)))?;
    let pid = child.id();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }

    let output = child.wait_with_output();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }

    let output = output
        .map_err(|e| ProvisionError::transport(format!("Failed waiting for {}: {}", label, e)))?;

    let result = ScriptOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        success: output.status.success(),
    };

    if result.success {
        debug!("{} exited successfully", label);
    } else {
        info!("{} failed with exit code {:?}", label, result.exit_code);
    }
    Ok(result)
}
