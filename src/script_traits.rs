//! Type-safe script argument contracts.
//!
//! This module provides the `ScriptArgs` trait for ensuring compile-time correctness
//! of script arguments. Instead of interpolating values into a command string,
//! each provisioning script gets a struct that produces its positional argument
//! list, its privilege level and where the script lives.
//!
//! # Design Goals
//!
//! 1. **Compile-Time Safety**: A script's positional contract is the struct
//!    definition; argument order cannot drift between call sites.
//! 2. **Single Source of Truth**: Privilege level and script location are
//!    declared next to the arguments.
//! 3. **No Shell Re-interpretation**: Arguments stay a `Vec<String>` until the
//!    transport encodes them for the guest.

use crate::types::Role;
use std::path::PathBuf;

/// Where a script lives relative to the scripts root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLocation {
    /// `roles/<role>/scripts/`
    Role(Role),
    /// `roles/default/scripts/`, shared by every role
    Shared,
}

/// Resolves [`ScriptLocation`]s to paths on the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLayout {
    root: PathBuf,
}

impl ScriptLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding scripts for `location`.
    pub fn dir(&self, location: ScriptLocation) -> PathBuf {
        let role_dir = match location {
            ScriptLocation::Role(role) => role.scripts_dir_name(),
            ScriptLocation::Shared => "default",
        };
        self.root.join("roles").join(role_dir).join("scripts")
    }

    /// Full path of a script.
    pub fn path(&self, location: ScriptLocation, script_name: &str) -> PathBuf {
        self.dir(location).join(script_name)
    }
}

/// Trait for typed script arguments.
///
/// # Contract
///
/// - `to_cli_args()`: Positional arguments exactly as the script's `param()`
///   block expects them.
/// - `get_env_vars()`: Environment variables the script requires.
/// - `script_name()`: The script filename (e.g., "install-adds.ps1").
/// - `location()`: Which scripts directory holds it.
/// - `privileged()`: Whether it runs in the elevated context.
///
/// # Example
///
/// ```
/// use labprov::script_traits::ScriptArgs;
/// use labprov::scripts::domain_controller::InstallAddsArgs;
///
/// let args = InstallAddsArgs {
///     domain: "corp.test".into(),
///     netbios: "CORP".into(),
///     safe_mode_password: "Pw1!".into(),
/// };
/// assert_eq!(args.to_cli_args(), ["corp.test", "CORP", "Pw1!"]);
/// assert!(args.privileged());
/// ```
pub trait ScriptArgs {
    /// Convert struct fields to positional arguments.
    fn to_cli_args(&self) -> Vec<String>;

    /// Get required environment variables.
    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    /// Get the script filename.
    fn script_name(&self) -> &'static str;

    /// Get the directory the script lives in.
    fn location(&self) -> ScriptLocation;

    /// Whether the script needs the elevated context.
    fn privileged(&self) -> bool;

    /// Whether the arguments carry secrets and must be redacted in logs.
    fn sensitive(&self) -> bool {
        false
    }
}
