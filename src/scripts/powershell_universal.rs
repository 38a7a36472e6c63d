//! Type-safe arguments for PowerShell Universal scripts.
//!
//! - `AddRsatAdPoshArgs` for the shared `add-rsatadposh.ps1`
//! - `InstallPsModulesArgs` for `install-psmodules.ps1`
//! - `CreateServiceAccountArgs` for `create-domainserviceaccount.ps1`
//! - `GrantServiceAccountRightsArgs` for `grant-serviceaccountrights.ps1`
//! - `DownloadPsuArgs` for `download-powershelluniversal.ps1`
//! - `CreateFirewallRuleArgs` for `create-pwshufirewallrule.ps1`
//! - `InstallPsuArgs` for `install-powershelluniversal.ps1`

use crate::script_traits::{ScriptArgs, ScriptLocation};
use crate::settings::ServiceAccount;
use crate::types::Role;

const LOCATION: ScriptLocation = ScriptLocation::Role(Role::PowershellUniversal);

/// Declares a parameterless script.
macro_rules! no_arg_script {
    ($(#[$meta:meta])* $name:ident, $file:literal, $location:expr, privileged = $privileged:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ScriptArgs for $name {
            fn to_cli_args(&self) -> Vec<String> {
                vec![]
            }

            fn script_name(&self) -> &'static str {
                $file
            }

            fn location(&self) -> ScriptLocation {
                $location
            }

            fn privileged(&self) -> bool {
                $privileged
            }
        }
    };
}

no_arg_script!(
    /// Installs the RSAT Active Directory PowerShell module. Shared by roles.
    AddRsatAdPoshArgs,
    "add-rsatadposh.ps1",
    ScriptLocation::Shared,
    privileged = true
);

no_arg_script!(
    /// Installs the PowerShell modules PowerShell Universal depends on.
    InstallPsModulesArgs,
    "install-psmodules.ps1",
    LOCATION,
    privileged = true
);

no_arg_script!(
    /// Fetches the PowerShell Universal installer.
    DownloadPsuArgs,
    "download-powershelluniversal.ps1",
    LOCATION,
    privileged = false
);

no_arg_script!(
    /// Opens the PowerShell Universal listener port.
    CreateFirewallRuleArgs,
    "create-pwshufirewallrule.ps1",
    LOCATION,
    privileged = true
);

// ============================================================================
// Service account
// ============================================================================

/// Type-safe arguments for `create-domainserviceaccount.ps1`.
///
/// Positions: 0 = account name, 1 = password.
#[derive(Debug, Clone)]
pub struct CreateServiceAccountArgs {
    pub account: ServiceAccount,
}

impl ScriptArgs for CreateServiceAccountArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            self.account.name().to_string(),
            self.account.password().to_string(),
        ]
    }

    fn script_name(&self) -> &'static str {
        "create-domainserviceaccount.ps1"
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

/// Type-safe arguments for `grant-serviceaccountrights.ps1`.
///
/// Position 0 = account name.
#[derive(Debug, Clone)]
pub struct GrantServiceAccountRightsArgs {
    pub account_name: String,
}

impl ScriptArgs for GrantServiceAccountRightsArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![self.account_name.clone()]
    }

    fn script_name(&self) -> &'static str {
        "grant-serviceaccountrights.ps1"
    }

    fn location(&self) -> ScriptLocation {
        LOCATION
    }

    fn privileged(&self) -> bool {
        true
    }
}

// ============================================================================
// Install PowerShell Universal
// ============================================================================

/// Type-safe arguments for `install-powershelluniversal.ps1`.
///
/// Always passes two positions (account, password). Without a service
/// account both are empty strings and the installer runs the service as
/// its default identity.
#[derive(Debug, Clone, Default)]
pub struct InstallPsuArgs {
    pub account: Option<ServiceAccount>,
}

impl ScriptArgs for InstallPsuArgs {
    fn to_cli_args(&self) -> Vec<String> {
        match &self.account {
            Some(account) => vec![account.name().to_string(), account.password().to_string()],
            None => vec![String::new(), String::new()],
        }
    }

    fn script_name(&self) -> &'static str {
        "install-powershelluniversal.ps1"
    }

    fn location(&self) -> ScriptLocation {
        LOCATION
    }

    fn privileged(&self) -> bool {
        true
    }

    fn sensitive(&self) -> bool {
        self.account.is_some()
    }
}
