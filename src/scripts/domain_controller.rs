//! Type-safe arguments for domain controller scripts.
//!
//! - `InstallAddsArgs` for `install-adds.ps1`
//! - `ImportUsersArgs` for `importusers.ps1`

use crate::script_traits::{ScriptArgs, ScriptLocation};
use crate::types::Role;

const LOCATION: ScriptLocation = ScriptLocation::Role(Role::DomainController);

// ============================================================================
// Install AD DS
// ============================================================================

/// Type-safe arguments for `install-adds.ps1`.
///
/// Installs the AD DS role and promotes the machine to the first domain
/// controller of a new forest.
///
/// # Field to Parameter Mapping
///
/// | Rust Field           | Position | Notes |
/// |----------------------|----------|-------|
/// | `domain`             | 0        | DNS name of the forest |
/// | `netbios`            | 1        | NetBIOS domain name |
/// | `safe_mode_password` | 2        | DSRM password |
#[derive(Debug, Clone)]
pub struct InstallAddsArgs {
    pub domain: String,
    pub netbios: String,
    pub safe_mode_password: String,
}

impl ScriptArgs for InstallAddsArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.domain.clone(),
            self.netbios.clone(),
            self.safe_mode_password.clone(),
        ]
    }

    fn script_name(&self) -> &'static str {
        "install-adds.ps1"
    }

    fn location(&self) -> ScriptLocation {
        LOCATION
    }

    fn privileged(&self) -> bool {
        true
    }

    fn sensitive(&self) -> bool {
        true
    }
}

// ============================================================================
// Import Users
// ============================================================================

/// Type-safe arguments for `importusers.ps1`. Takes no parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportUsersArgs;

impl ScriptArgs for ImportUsersArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![]
    }

    fn script_name(&self) -> &'static str {
        "importusers.ps1"
    }

    fn location(&self) -> ScriptLocation {
        LOCATION
    }

    fn privileged(&self) -> bool {
        false
    }
}
