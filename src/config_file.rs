//! Lab configuration file handling.
//!
//! A lab file is a JSON document naming the servers to provision, their
//! roles and connection details, plus the `vars` override layer and the
//! `env` block handed to scripts. Structural checks run in
//! [`LabConfig::validate`] right after loading; resolved setting values are
//! checked when role settings are built (see `settings`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{PartialCredentialPolicy, Role};

fn default_scripts_root() -> PathBuf {
    PathBuf::from("src")
}

fn default_staging_dir() -> String {
    "C:\\Windows\\Temp\\labprov".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Whole lab definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// Directory containing `roles/<role>/scripts/` on the controller
    #[serde(default = "default_scripts_root")]
    pub scripts_root: PathBuf,

    /// Guest directory scripts are copied to before they run
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Explicit overrides, highest resolution priority
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Script environment; also the base of the environment layer
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub partial_credentials: PartialCredentialPolicy,

    #[serde(default)]
    pub reboot: RebootSettings,

    pub servers: Vec<ServerConfig>,
}

/// One machine to provision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub role: Role,

    /// Service account block for the PowerShell Universal role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irms: Option<IrmsBlock>,

    pub connection: Connection,
}

/// Optional service-account credentials. Both halves or neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IrmsBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_pw: Option<String>,
}

/// How to reach a server over SSH.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Account used for privileged steps and reboots
    pub admin_user: String,
    /// Account used for unprivileged steps; falls back to `admin_user`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
}

impl Connection {
    /// Login account for a step with the given privilege.
    pub fn user_for(&self, privileged: bool) -> &str {
        if privileged {
            &self.admin_user
        } else {
            self.user.as_deref().unwrap_or(&self.admin_user)
        }
    }
}

/// Reboot barrier timing, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RebootSettings {
    pub grace_secs: u64,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RebootSettings {
    fn default() -> Self {
        Self {
            grace_secs: 15,
            poll_interval_secs: 5,
            timeout_secs: 600,
            connect_timeout_secs: 5,
        }
    }
}

impl RebootSettings {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl LabConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize lab configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write lab configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read lab configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse lab configuration JSON")?;

        Ok(config)
    }

    /// Merge command-line overrides over the file's `vars`.
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.vars.extend(overrides);
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Validate the structure of the configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            anyhow::bail!("At least one server must be declared");
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            let name = server.name.trim();
            if name.is_empty() {
                anyhow::bail!("Server name must be specified");
            }
            if !seen.insert(name) {
                anyhow::bail!("Duplicate server name: {}", name);
            }
            if server.connection.host.trim().is_empty() {
                anyhow::bail!("Server '{}': host must be specified", name);
            }
            if server.connection.port == 0 {
                anyhow::bail!("Server '{}': port must be non-zero", name);
            }
            if server.connection.admin_user.trim().is_empty() {
                anyhow::bail!("Server '{}': admin_user must be specified", name);
            }
            if let Some(user) = &server.connection.user {
                if user.trim().is_empty() {
                    anyhow::bail!("Server '{}': user cannot be empty when given", name);
                }
            }
            if server.irms.is_some() && server.role != Role::PowershellUniversal {
                tracing::warn!(
                    "Server '{}': irms block is ignored for role {}",
                    name,
                    server.role
                );
            }
        }

        if self.reboot.timeout_secs == 0 {
            anyhow::bail!("Reboot timeout must be non-zero");
        }
        if self.reboot.poll_interval_secs == 0 {
            anyhow::bail!("Reboot poll interval must be non-zero");
        }
        if self.staging_dir.trim().is_empty() {
            anyhow::bail!("Staging directory must be specified");
        }

        Ok(())
    }
}
