//! Provisioning step descriptors.
//!
//! A step is either a script invocation or a reboot barrier. Steps are built
//! by the plan builder and never change afterwards: fields are private and
//! only exposed through accessors.

use crate::script_traits::{ScriptArgs, ScriptLayout};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const REDACTED: &str = "<redacted>";

/// One script invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptStep {
    path: PathBuf,
    privileged: bool,
    args: Vec<String>,
    env: Vec<(String, String)>,
    #[serde(skip)]
    sensitive: bool,
}

impl ScriptStep {
    /// Build a step from typed script arguments.
    ///
    /// `extra_env` entries are appended after the script's own variables.
    pub fn from_args<T: ScriptArgs>(
        layout: &ScriptLayout,
        args: &T,
        extra_env: &BTreeMap<String, String>,
    ) -> Self {
        let mut env = args.get_env_vars();
        env.extend(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            path: layout.path(args.location(), args.script_name()),
            privileged: args.privileged(),
            args: args.to_cli_args(),
            env,
            sensitive: args.sensitive(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the script, used in logs and errors.
    pub fn script_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn sensitive(&self) -> bool {
        self.sensitive
    }

    /// Arguments safe to print: every argument is masked for sensitive steps.
    pub fn display_args(&self) -> Vec<String> {
        if self.sensitive {
            self.args.iter().map(|_| REDACTED.to_string()).collect()
        } else {
            self.args.clone()
        }
    }

    /// Environment safe to print: values are always masked.
    pub fn display_env(&self) -> Vec<String> {
        self.env.iter().map(|(k, _)| format!("{}={}", k, REDACTED)).collect()
    }

    /// Same step with arguments masked, for serialised plan output.
    pub fn redacted(&self) -> Self {
        Self {
            args: self.display_args(),
            env: self
                .env
                .iter()
                .map(|(k, _)| (k.clone(), REDACTED.to_string()))
                .collect(),
            ..self.clone()
        }
    }
}

/// One entry of a role plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProvisionStep {
    Script(ScriptStep),
    /// Restart the guest and wait until it is reachable again
    Reboot,
}

impl ProvisionStep {
    pub fn is_reboot(&self) -> bool {
        matches!(self, Self::Reboot)
    }

    pub fn as_script(&self) -> Option<&ScriptStep> {
        match self {
            Self::Script(s) => Some(s),
            Self::Reboot => None,
        }
    }

    /// Short label: the script file name, or `reboot`.
    pub fn label(&self) -> String {
        match self {
            Self::Script(s) => s.script_name(),
            Self::Reboot => "reboot".to_string(),
        }
    }

    pub fn redacted(&self) -> Self {
        match self {
            Self::Script(s) => Self::Script(s.redacted()),
            Self::Reboot => Self::Reboot,
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(s) => {
                let mode = if s.privileged { "privileged" } else { "unprivileged" };
                write!(f, "{} [{}]", s.path.display(), mode)?;
                let args = s.display_args();
                if !args.is_empty() {
                    write!(f, " args={:?}", args)?;
                }
                Ok(())
            }
            Self::Reboot => f.write_str("reboot"),
        }
    }
}
