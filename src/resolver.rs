//! Layered setting resolution.
//!
//! Every named setting is looked up in three layers, first hit wins:
//!
//! 1. an explicit override (`vars` in the lab file, `--var` on the command line)
//! 2. the environment snapshot
//! 3. the setting's default literal
//!
//! The environment is an explicit [`Environment`] value handed in by the
//! caller. Nothing in this module reads process state on its own, so plan
//! construction is a pure function of its inputs.

use crate::error::{ProvisionError, Result};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Snapshot of environment variables used as the middle resolution layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    ///
    /// Called once by the binary; library code receives the snapshot.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build an environment from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a new environment with `self` layered over `base`.
    ///
    /// Keys present in `self` win.
    pub fn layered_over(&self, base: &BTreeMap<String, String>) -> Self {
        let mut vars = base.clone();
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Which layer supplied a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Override,
    Environment,
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Override => "override",
            Self::Environment => "environment",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

/// A value together with the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: Source,
}

/// Resolve one setting.
///
/// Returns the override if present, else the environment value if
/// `env_var` is given and set, else the default. Empty strings count as
/// present. `None` only when all three layers are empty.
pub fn resolve(
    name: &str,
    override_value: Option<&str>,
    env: &Environment,
    env_var: Option<&str>,
    default: Option<&str>,
) -> Option<Resolved> {
    let resolved = if let Some(value) = override_value {
        Some(Resolved {
            value: value.to_string(),
            source: Source::Override,
        })
    } else if let Some(value) = env_var.and_then(|var| env.get(var)) {
        Some(Resolved {
            value: value.to_string(),
            source: Source::Environment,
        })
    } else {
        default.map(|value| Resolved {
            value: value.to_string(),
            source: Source::Default,
        })
    };

    match &resolved {
        Some(r) => debug!("setting '{}' resolved from {}", name, r.source),
        None => debug!("setting '{}' has no value in any layer", name),
    }
    resolved
}

/// Static description of a named setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    /// Human-facing name used in logs and errors.
    pub name: &'static str,
    /// Key looked up in the override map.
    pub override_key: &'static str,
    /// Environment variable consulted when no override is given.
    pub env_var: Option<&'static str>,
    /// Value used when neither layer has one.
    pub default: Option<&'static str>,
}

/// Directory Services Restore Mode password for domain promotion.
pub const SAFE_MODE_PASSWORD: Setting = Setting {
    name: "safe-mode password",
    override_key: "safemodepassword",
    env_var: Some("safemodepassword"),
    default: Some("Password1234!"),
};

/// DNS name of the lab forest.
pub const DOMAIN_NAME: Setting = Setting {
    name: "domain name",
    override_key: "domainname",
    env_var: Some("labdomain"),
    default: Some("lab.local"),
};

/// NetBIOS name of the lab domain.
pub const NETBIOS_NAME: Setting = Setting {
    name: "netbios name",
    override_key: "netbiosname",
    env_var: Some("lablabnetbiosname"),
    default: Some("LAB"),
};

/// Resolves [`Setting`]s against an override map and an environment.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    overrides: &'a BTreeMap<String, String>,
    env: &'a Environment,
}

impl<'a> Resolver<'a> {
    pub fn new(overrides: &'a BTreeMap<String, String>, env: &'a Environment) -> Self {
        Self { overrides, env }
    }

    fn lookup(&self, setting: &Setting) -> Option<Resolved> {
        resolve(
            setting.name,
            self.overrides.get(setting.override_key).map(String::as_str),
            self.env,
            setting.env_var,
            setting.default,
        )
    }

    /// Resolve a setting that must have a value.
    pub fn required(&self, setting: &Setting) -> Result<Resolved> {
        self.lookup(setting)
            .ok_or_else(|| ProvisionError::MissingSetting {
                name: setting.override_key.to_string(),
                env_var: setting.env_var.unwrap_or(setting.override_key).to_string(),
            })
    }

    /// Resolve a setting that may be absent; absence is logged at warn level.
    pub fn optional(&self, setting: &Setting) -> Option<Resolved> {
        let resolved = self.lookup(setting);
        if resolved.is_none() {
            warn!("optional setting '{}' is not set", setting.name);
        }
        resolved
    }
}
