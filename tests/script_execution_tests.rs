//! Tests for script delivery over SSH
//!
//! These tests verify:
//! - ScriptOutput structure and error conversion
//! - The exact ssh/scp invocations a plan produces
//! - A failing remote script stops the run with its exit code
//! - A restart the guest refuses or never performs stops the run
//!
//! `ssh` and `scp` are replaced with shell scripts that append their argv
//! to a log file, so no guest is needed.

use labprov::{
    Connection, ProvisionError, RebootPolicy, RolePlan, ScriptOutput, Sequencer, SshTransport,
    plan_for_server, Environment, LabConfig,
};
use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// ScriptOutput Tests
// =============================================================================

#[test]
fn test_script_output_success() {
    let output = ScriptOutput::ok("Success output");
    assert!(output.success);
    assert_eq!(output.exit_code, Some(0));
    assert!(output.stderr.is_empty());
    assert!(output.ensure_success(0, "install-adds.ps1").is_ok());
}

#[test]
fn test_script_output_failure_becomes_step_error() {
    let output = ScriptOutput::failed(Some(3), "  access denied\n");
    let err = output.ensure_success(4, "install-psmodules.ps1").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Step 4 (install-psmodules.ps1) failed with exit code 3: access denied"
    );
}

#[test]
fn test_signal_termination_has_no_exit_code() {
    let output = ScriptOutput::failed(None, "");
    match output.ensure_success(0, "x.ps1").unwrap_err() {
        ProvisionError::StepFailed { exit_code, .. } => assert_eq!(exit_code, None),
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Fake ssh/scp
// =============================================================================

/// What the fake guest does when asked to restart.
#[derive(Clone, Copy)]
enum RebootBehaviour {
    Restarts,
    Denied,
    Ignored,
}

struct FakeGuest {
    dir: TempDir,
    listener: TcpListener,
}

impl FakeGuest {
    fn new() -> Self {
        Self::with_reboot(RebootBehaviour::Restarts)
    }

    fn with_reboot(behaviour: RebootBehaviour) -> Self {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let boot = dir.path().join("boot");
        fs::write(&boot, "1\n").unwrap();

        let restart = match behaviour {
            RebootBehaviour::Restarts => {
                format!("echo $(( $(cat '{b}') + 1 )) > '{b}'", b = boot.display())
            }
            RebootBehaviour::Denied => "echo 'Access denied' >&2; exit 1".to_string(),
            RebootBehaviour::Ignored => ":".to_string(),
        };
        write_program(
            &dir.path().join("ssh"),
            &format!(
                "#!/bin/sh\n\
                 printf 'ssh %s\\n' \"$*\" >> '{log}'\n\
                 case \"$*\" in\n\
                   *LastBootUpTime*) cat '{boot}' ;;\n\
                   *Restart-Computer*) {restart} ;;\n\
                   *importusers*) echo 'import failed' >&2; exit 7 ;;\n\
                 esac\n\
                 exit 0\n",
                log = log.display(),
                boot = boot.display(),
            ),
        );
        write_program(
            &dir.path().join("scp"),
            &format!(
                "#!/bin/sh\nprintf 'scp %s\\n' \"$*\" >> '{log}'\nexit 0\n",
                log = log.display()
            ),
        );

        let scripts = dir.path().join("roles/domain-controller/scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("install-adds.ps1"), "param($d, $n, $p)\n").unwrap();
        fs::write(scripts.join("importusers.ps1"), "exit 0\n").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        Self { dir, listener }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn lab(&self) -> LabConfig {
        let json = format!(
            r#"{{
                "scripts_root": "{root}",
                "staging_dir": "C:\\Temp\\lab",
                "vars": {{ "domainname": "corp.test", "netbiosname": "CORP", "safemodepassword": "It's1!" }},
                "servers": [
                    {{ "name": "dc01", "role": "domain-controller",
                       "connection": {{ "host": "127.0.0.1", "port": {port},
                                        "admin_user": "Administrator", "user": "labuser" }} }}
                ]
            }}"#,
            root = self.root().display(),
            port = self.port()
        );
        serde_json::from_str(&json).unwrap()
    }

    fn transport(&self, lab: &LabConfig) -> SshTransport {
        let server = &lab.servers[0];
        SshTransport::new(
            &server.name,
            server.connection.clone(),
            &lab.staging_dir,
            Duration::from_secs(1),
        )
        .with_programs(self.root().join("ssh"), self.root().join("scp"))
    }
}

fn write_program(path: &PathBuf, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn dc_plan(lab: &LabConfig) -> RolePlan {
    plan_for_server(lab, &lab.servers[0], &Environment::new()).unwrap()
}

fn fast_policy() -> RebootPolicy {
    RebootPolicy {
        grace: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
    }
}

// =============================================================================
// SSH delivery
// =============================================================================

#[test]
fn test_ssh_delivery_sequence() {
    let guest = FakeGuest::new();
    let lab = guest.lab();
    let transport = guest.transport(&lab);

    let (report, result) = Sequencer::new(&transport, fast_policy()).run_with_report(&dc_plan(&lab));

    // importusers.ps1 fails on the fake guest
    match result.unwrap_err() {
        ProvisionError::StepFailed { index, script, exit_code, stderr } => {
            assert_eq!(index, 2);
            assert_eq!(script, "importusers.ps1");
            assert_eq!(exit_code, Some(7));
            assert_eq!(stderr, "import failed");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(report.failed_step(), Some(2));

    let calls = guest.calls();
    let port = guest.port();
    let admin = format!("-p {port} Administrator@127.0.0.1 --");
    let user = format!("-p {port} labuser@127.0.0.1 --");

    assert_eq!(calls.len(), 9, "calls: {calls:#?}");

    // install-adds: mkdir, upload, run, all as the admin account
    assert!(calls[0].starts_with("ssh ") && calls[0].contains(&admin));
    assert!(calls[0].contains("New-Item -ItemType Directory -Force -Path 'C:\\Temp\\lab'"));
    assert!(calls[1].starts_with("scp "));
    assert!(calls[1].contains(&format!("-P {port}")));
    assert!(calls[1].ends_with("Administrator@127.0.0.1:C:/Temp/lab/install-adds.ps1"));
    assert!(calls[2].contains(&admin));
    assert!(calls[2].contains(
        "& 'C:\\Temp\\lab\\install-adds.ps1' 'corp.test' 'CORP' 'It''s1!'; exit $LASTEXITCODE"
    ));

    // reboot as admin, bracketed by boot id reads
    assert!(calls[3].contains(&admin) && calls[3].contains("LastBootUpTime"));
    assert!(calls[4].contains(&admin) && calls[4].ends_with("Restart-Computer -Force"));
    assert!(calls[5].contains(&admin) && calls[5].contains("LastBootUpTime"));

    // importusers: unprivileged login
    assert!(calls[6].contains(&user));
    assert!(calls[7].starts_with("scp ") && calls[7].contains("labuser@127.0.0.1:"));
    assert!(calls[8].contains(&user) && calls[8].contains("importusers.ps1"));
}

#[test]
fn test_denied_reboot_stops_the_run() {
    // The listener stays up, so only the refused restart can stop the run
    let guest = FakeGuest::with_reboot(RebootBehaviour::Denied);
    let lab = guest.lab();
    let transport = guest.transport(&lab);

    let (report, result) = Sequencer::new(&transport, fast_policy()).run_with_report(&dc_plan(&lab));

    match result.unwrap_err() {
        ProvisionError::Transport(message) => {
            assert!(message.contains("reboot request refused"), "{message}");
            assert!(message.contains("Access denied"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(report.failed_step(), Some(1));
    assert!(!guest.calls().iter().any(|c| c.contains("importusers")));
}

#[test]
fn test_reboot_that_never_happens_times_out() {
    let guest = FakeGuest::with_reboot(RebootBehaviour::Ignored);
    let lab = guest.lab();
    let transport = guest.transport(&lab);
    let policy = RebootPolicy {
        grace: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(200),
    };

    let err = Sequencer::new(&transport, policy)
        .run(&dc_plan(&lab))
        .unwrap_err();
    assert!(matches!(err, ProvisionError::RebootTimeout { index: 1, .. }));
    assert!(!guest.calls().iter().any(|c| c.contains("importusers")));
}

#[test]
fn test_missing_script_is_a_transport_error() {
    let guest = FakeGuest::new();
    fs::remove_file(guest.root().join("roles/domain-controller/scripts/install-adds.ps1")).unwrap();
    let lab = guest.lab();
    let transport = guest.transport(&lab);

    let err = Sequencer::new(&transport, fast_policy())
        .run(&dc_plan(&lab))
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Transport(ref m) if m.contains("Script not found")));
    assert!(guest.calls().is_empty());
}

#[test]
fn test_unreachable_host_times_out() {
    let guest = FakeGuest::new();
    let mut lab = guest.lab();
    // Nothing listens on the freed port
    let closed = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    lab.servers[0].connection = Connection {
        port: closed,
        ..lab.servers[0].connection.clone()
    };
    let transport = guest.transport(&lab);
    let policy = RebootPolicy {
        grace: Duration::ZERO,
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(100),
    };

    let err = Sequencer::new(&transport, policy)
        .run(&dc_plan(&lab))
        .unwrap_err();
    assert!(matches!(err, ProvisionError::RebootTimeout { index: 1, .. }));
    // importusers never reached the guest
    assert!(!guest.calls().iter().any(|c| c.contains("importusers")));
}
