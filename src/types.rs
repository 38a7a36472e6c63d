//! Type-safe enums for lab configuration values.
//!
//! Using enums instead of strings provides compile-time validation and
//! prevents typos in role names and policy selections.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Machine role; selects which fixed step sequence a server receives.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    /// Active Directory domain controller
    DomainController,
    /// PowerShell Universal server
    PowershellUniversal,
}

impl Role {
    /// Directory name of this role's scripts under `<scripts_root>/roles/`.
    pub fn scripts_dir_name(self) -> &'static str {
        self.into()
    }
}

/// What to do when only one half of a credential pair is configured.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PartialCredentialPolicy {
    /// Fail plan construction with a configuration error
    #[default]
    Reject,
    /// Treat both halves as absent and skip the dependent steps
    Omit,
}
