//! SSH transport for Windows guests.
//!
//! Each script step is copied to the guest's staging directory with `scp`
//! and invoked with `ssh`. The guest's OpenSSH default shell must be
//! PowerShell; the remote command is a single PowerShell statement list in
//! which every argument and environment value is a single-quoted literal.
//!
//! The privilege flag picks the login: privileged steps use the
//! connection's `admin_user`, the rest use `user` when one is configured.

use crate::config_file::Connection;
use crate::error::{ProvisionError, Result};
use crate::script_runner::{ScriptOutput, run_captured};
use crate::step::ScriptStep;
use crate::transport::{Transport, tcp_reachable};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exit status `ssh` reports when the connection itself fails.
const SSH_CONNECTION_LOST: i32 = 255;

/// Prints the guest's last boot time; it changes with every restart.
const BOOT_ID_COMMAND: &str =
    "(Get-CimInstance Win32_OperatingSystem).LastBootUpTime.ToUniversalTime().ToString('o')";

/// Quote `value` as a PowerShell single-quoted string literal.
///
/// Inside single quotes PowerShell expands nothing; the only special
/// character is `'` itself, written as `''`.
pub fn ps_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        // PowerShell also treats typographic single quotes as quote chars
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Whether `name` can be written as `$env:<name>` without braces.
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Guest path of a staged script: `<staging_dir>\<file>`.
pub fn staged_path(staging_dir: &str, script_name: &str) -> String {
    format!("{}\\{}", staging_dir.trim_end_matches(['\\', '/']), script_name)
}

/// PowerShell statements that run `script_path` with the step's env and args.
pub fn remote_invocation(step: &ScriptStep, script_path: &str) -> Result<String> {
    let mut command = String::from("$ErrorActionPreference = 'Stop'; ");
    for (key, value) in step.env() {
        if !is_valid_env_name(key) {
            return Err(ProvisionError::validation(format!(
                "Environment variable name '{}' is not a valid identifier",
                key
            )));
        }
        command.push_str(&format!("$env:{} = {}; ", key, ps_quote(value)));
    }
    command.push_str("& ");
    command.push_str(&ps_quote(script_path));
    for arg in step.args() {
        command.push(' ');
        command.push_str(&ps_quote(arg));
    }
    command.push_str("; exit $LASTEXITCODE");
    Ok(command)
}

/// Runs steps on a guest over SSH.
#[derive(Debug, Clone)]
pub struct SshTransport {
    name: String,
    connection: Connection,
    staging_dir: String,
    connect_timeout: Duration,
    ssh_program: PathBuf,
    scp_program: PathBuf,
}

impl SshTransport {
    pub fn new(
        name: impl Into<String>,
        connection: Connection,
        staging_dir: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            connection,
            staging_dir: staging_dir.into(),
            connect_timeout,
            ssh_program: PathBuf::from("ssh"),
            scp_program: PathBuf::from("scp"),
        }
    }

    /// Use different `ssh`/`scp` executables.
    pub fn with_programs(mut self, ssh: impl Into<PathBuf>, scp: impl Into<PathBuf>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    fn common_options(&self) -> Vec<String> {
        let mut opts = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(identity) = &self.connection.identity_file {
            opts.push("-i".to_string());
            opts.push(identity.display().to_string());
        }
        opts
    }

    fn destination(&self, privileged: bool) -> String {
        format!("{}@{}", self.connection.user_for(privileged), self.connection.host)
    }

    /// argv for `ssh` running `remote_command`.
    pub fn ssh_args(&self, privileged: bool, remote_command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.connection.port.to_string());
        args.push(self.destination(privileged));
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    /// argv for `scp` copying `step`'s script to its staged path.
    pub fn scp_args(&self, step: &ScriptStep) -> Vec<String> {
        let remote = staged_path(&self.staging_dir, &step.script_name()).replace('\\', "/");
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(self.connection.port.to_string());
        args.push(step.path().display().to_string());
        args.push(format!("{}:{}", self.destination(step.privileged()), remote));
        args
    }

    fn ssh(&self, privileged: bool, remote_command: &str, label: &str) -> Result<ScriptOutput> {
        let mut cmd = Command::new(&self.ssh_program);
        cmd.args(self.ssh_args(privileged, remote_command));
        run_captured(&mut cmd, label)
    }

    fn upload(&self, step: &ScriptStep) -> Result<()> {
        if !step.path().is_file() {
            return Err(ProvisionError::transport(format!(
                "Script not found: {}",
                step.path().display()
            )));
        }

        let mkdir = format!(
            "New-Item -ItemType Directory -Force -Path {} | Out-Null",
            ps_quote(&self.staging_dir)
        );
        let output = self.ssh(step.privileged(), &mkdir, "ssh mkdir")?;
        if !output.success {
            return Err(ProvisionError::transport(format!(
                "{}: cannot create staging directory {}: {}",
                self.name,
                self.staging_dir,
                output.stderr.trim()
            )));
        }

        let mut cmd = Command::new(&self.scp_program);
        cmd.args(self.scp_args(step));
        let output = run_captured(&mut cmd, "scp")?;
        if !output.success {
            return Err(ProvisionError::transport(format!(
                "{}: upload of {} failed: {}",
                self.name,
                step.script_name(),
                output.stderr.trim()
            )));
        }
        debug!("{}: uploaded {}", self.name, step.script_name());
        Ok(())
    }
}

impl Transport for SshTransport {
    fn target(&self) -> &str {
        &self.name
    }

    fn run_script(&self, step: &ScriptStep) -> Result<ScriptOutput> {
        self.upload(step)?;
        let remote_path = staged_path(&self.staging_dir, &step.script_name());
        let invocation = remote_invocation(step, &remote_path)?;
        info!(
            "{}: running {} as {}",
            self.name,
            step.script_name(),
            self.connection.user_for(step.privileged())
        );
        self.ssh(step.privileged(), &invocation, &step.script_name())
    }

    fn request_reboot(&self) -> Result<()> {
        info!("{}: requesting reboot", self.name);
        let output = self.ssh(true, "Restart-Computer -Force", "ssh reboot")?;
        match output.exit_code {
            Some(0) => Ok(()),
            // Connection cut by the restart; the boot id check decides
            Some(SSH_CONNECTION_LOST) => {
                warn!(
                    "{}: connection dropped during reboot request: {}",
                    self.name,
                    output.stderr.trim()
                );
                Ok(())
            }
            code => Err(ProvisionError::transport(format!(
                "{}: reboot request refused (exit code {:?}): {}",
                self.name,
                code,
                output.stderr.trim()
            ))),
        }
    }

    fn is_reachable(&self) -> bool {
        tcp_reachable(
            &self.connection.host,
            self.connection.port,
            self.connect_timeout,
        )
    }

    fn boot_id(&self) -> Result<Option<String>> {
        let output = self.ssh(true, BOOT_ID_COMMAND, "ssh boot id")?;
        let id = output.stdout.trim();
        if !output.success || id.is_empty() {
            return Err(ProvisionError::transport(format!(
                "{}: cannot read last boot time (exit code {:?}): {}",
                self.name,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        debug!("{}: boot id {}", self.name, id);
        Ok(Some(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_traits::ScriptLayout;
    use crate::scripts::powershell_universal::{CreateServiceAccountArgs, DownloadPsuArgs};
    use crate::settings::ServiceAccount;
    use std::collections::BTreeMap;

    fn connection() -> Connection {
        Connection {
            host: "192.168.56.11".into(),
            port: 2222,
            admin_user: "vagrant".into(),
            user: Some("labuser".into()),
            identity_file: Some(PathBuf::from("/keys/lab")),
        }
    }

    fn transport() -> SshTransport {
        SshTransport::new(
            "psu01",
            connection(),
            "C:\\Windows\\Temp\\labprov",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_ps_quote() {
        assert_eq!(ps_quote("plain"), "'plain'");
        assert_eq!(ps_quote("it's"), "'it''s'");
        assert_eq!(ps_quote(""), "''");
        assert_eq!(ps_quote("$(rm -rf /); `n"), "'$(rm -rf /); `n'");
        assert_eq!(ps_quote("a\u{2019}b"), "'a\u{2019}\u{2019}b'");
    }

    #[test]
    fn test_env_name_validation() {
        assert!(is_valid_env_name("labdomain"));
        assert!(is_valid_env_name("_X1"));
        assert!(!is_valid_env_name("1X"));
        assert!(!is_valid_env_name("A-B"));
        assert!(!is_valid_env_name(""));
    }

    #[test]
    fn test_remote_invocation() {
        let layout = ScriptLayout::new("src");
        let mut env = BTreeMap::new();
        env.insert("labdomain".to_string(), "corp.test".to_string());
        let step = ScriptStep::from_args(
            &layout,
            &CreateServiceAccountArgs {
                account: ServiceAccount::new("svc", "p'w"),
            },
            &env,
        );
        let cmd = remote_invocation(&step, "C:\\stage\\create-domainserviceaccount.ps1").unwrap();
        assert_eq!(
            cmd,
            "$ErrorActionPreference = 'Stop'; $env:labdomain = 'corp.test'; \
             & 'C:\\stage\\create-domainserviceaccount.ps1' 'svc' 'p''w'; exit $LASTEXITCODE"
        );
    }

    #[test]
    fn test_remote_invocation_rejects_bad_env_name() {
        let layout = ScriptLayout::new("src");
        let mut env = BTreeMap::new();
        env.insert("bad name".to_string(), "x".to_string());
        let step = ScriptStep::from_args(&layout, &DownloadPsuArgs, &env);
        assert!(remote_invocation(&step, "C:\\x.ps1").is_err());
    }

    #[test]
    fn test_ssh_args_pick_user_by_privilege() {
        let t = transport();
        let args = t.ssh_args(true, "hostname");
        assert_eq!(
            args,
            [
                "-o", "BatchMode=yes", "-o", "ConnectTimeout=5", "-i", "/keys/lab", "-p", "2222",
                "vagrant@192.168.56.11", "--", "hostname",
            ]
        );
        let args = t.ssh_args(false, "hostname");
        assert!(args.contains(&"labuser@192.168.56.11".to_string()));
    }

    #[test]
    fn test_scp_args() {
        let t = transport();
        let step = ScriptStep::from_args(&ScriptLayout::new("src"), &DownloadPsuArgs, &BTreeMap::new());
        let args = t.scp_args(&step);
        assert_eq!(args[args.len() - 3], "2222");
        assert_eq!(
            args[args.len() - 2],
            "src/roles/powershell-universal/scripts/download-powershelluniversal.ps1"
        );
        assert_eq!(
            args[args.len() - 1],
            "labuser@192.168.56.11:C:/Windows/Temp/labprov/download-powershelluniversal.ps1"
        );
    }

    #[test]
    fn test_staged_path_trims_separator() {
        assert_eq!(staged_path("C:\\stage\\", "a.ps1"), "C:\\stage\\a.ps1");
        assert_eq!(staged_path("C:/stage/", "a.ps1"), "C:/stage\\a.ps1");
    }

    #[test]
    fn test_missing_script_is_transport_error() {
        let t = transport().with_programs("/nonexistent/ssh", "/nonexistent/scp");
        let step = ScriptStep::from_args(
            &ScriptLayout::new("/nonexistent-root"),
            &DownloadPsuArgs,
            &BTreeMap::new(),
        );
        let err = t.run_script(&step).unwrap_err();
        assert!(matches!(err, ProvisionError::Transport(_)));
    }

    fn fake_ssh(dir: &std::path::Path, name: &str, body: &str) -> SshTransport {
        use std::os::unix::fs::PermissionsExt;
        let program = dir.join(name);
        std::fs::write(&program, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        transport().with_programs(program, dir.join("scp"))
    }

    #[test]
    fn test_reboot_exit_codes() {
        let dir = tempfile::TempDir::new().unwrap();

        let t = fake_ssh(dir.path(), "ssh-ok", "exit 0");
        assert!(t.request_reboot().is_ok());

        let t = fake_ssh(dir.path(), "ssh-dropped", "echo 'Connection closed' >&2; exit 255");
        assert!(t.request_reboot().is_ok());

        let t = fake_ssh(dir.path(), "ssh-denied", "echo 'Access denied' >&2; exit 1");
        let err = t.request_reboot().unwrap_err();
        assert!(matches!(err, ProvisionError::Transport(ref m) if m.contains("Access denied")));
    }

    #[test]
    fn test_boot_id_is_trimmed_stdout() {
        let dir = tempfile::TempDir::new().unwrap();

        let t = fake_ssh(dir.path(), "ssh-boot", "echo '2026-01-02T03:04:05.0000000Z'");
        assert_eq!(
            t.boot_id().unwrap().as_deref(),
            Some("2026-01-02T03:04:05.0000000Z")
        );

        let t = fake_ssh(dir.path(), "ssh-silent", "exit 0");
        assert!(t.boot_id().is_err());
    }
}
