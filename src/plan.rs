//! Role plan construction.
//!
//! Each role has one fixed step sequence. The only branch is the optional
//! service-account pair on the PowerShell Universal role, included only when
//! both credential fields resolved.
//!
//! # Domain controller
//!
//! ```text
//! install-adds.ps1   (privileged, domain netbios safe-mode-password)
//! reboot
//! importusers.ps1    (unprivileged)
//! ```
//!
//! # PowerShell Universal
//!
//! ```text
//! add-rsatadposh.ps1                 (privileged, shared scripts dir)
//! install-psmodules.ps1              (privileged)
//! reboot
//! create-domainserviceaccount.ps1    (privileged, account password)   ┐ only with a
//! grant-serviceaccountrights.ps1     (privileged, account)            ┘ service account
//! download-powershelluniversal.ps1   (unprivileged)
//! create-pwshufirewallrule.ps1       (privileged)
//! install-powershelluniversal.ps1    (privileged, account password)
//! reboot
//! ```

use crate::config_file::{LabConfig, ServerConfig};
use crate::error::Result;
use crate::resolver::{Environment, Resolver};
use crate::script_traits::ScriptLayout;
use crate::scripts::domain_controller::{ImportUsersArgs, InstallAddsArgs};
use crate::scripts::powershell_universal::{
    AddRsatAdPoshArgs, CreateFirewallRuleArgs, CreateServiceAccountArgs, DownloadPsuArgs,
    GrantServiceAccountRightsArgs, InstallPsModulesArgs, InstallPsuArgs,
};
use crate::settings::{DomainControllerSettings, PsuSettings, RoleSettings};
use crate::step::{ProvisionStep, ScriptStep};
use crate::types::Role;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Ordered steps for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePlan {
    server: String,
    role: Role,
    steps: Vec<ProvisionStep>,
}

impl RolePlan {
    pub fn new(server: impl Into<String>, role: Role, steps: Vec<ProvisionStep>) -> Self {
        Self {
            server: server.into(),
            role,
            steps,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn steps(&self) -> &[ProvisionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn reboot_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_reboot()).count()
    }

    /// Step labels in order, e.g. `["install-adds.ps1", "reboot", ...]`.
    pub fn labels(&self) -> Vec<String> {
        self.steps.iter().map(ProvisionStep::label).collect()
    }

    /// Copy with every secret masked, for printing.
    pub fn redacted(&self) -> Self {
        Self {
            steps: self.steps.iter().map(ProvisionStep::redacted).collect(),
            ..self.clone()
        }
    }
}

/// Inputs shared by every plan of a lab.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub layout: &'a ScriptLayout,
    /// Environment handed to scripts that take the lab environment
    pub script_env: &'a BTreeMap<String, String>,
}

/// Domain controller: promote, reboot, import users.
pub fn domain_controller_steps(
    ctx: PlanContext<'_>,
    settings: &DomainControllerSettings,
) -> Vec<ProvisionStep> {
    let adds = InstallAddsArgs {
        domain: settings.domain.clone(),
        netbios: settings.netbios.clone(),
        safe_mode_password: settings.safe_mode_password.clone(),
    };
    vec![
        ProvisionStep::Script(ScriptStep::from_args(ctx.layout, &adds, ctx.script_env)),
        ProvisionStep::Reboot,
        ProvisionStep::Script(ScriptStep::from_args(
            ctx.layout,
            &ImportUsersArgs,
            ctx.script_env,
        )),
    ]
}

/// PowerShell Universal: prerequisites, reboot, optional service account,
/// download and install, reboot.
pub fn powershell_universal_steps(
    ctx: PlanContext<'_>,
    settings: &PsuSettings,
) -> Vec<ProvisionStep> {
    let none = BTreeMap::new();
    let script = |args: &dyn ErasedArgs| ProvisionStep::Script(args.to_step(ctx.layout, &none));

    let mut steps = vec![
        script(&AddRsatAdPoshArgs),
        script(&InstallPsModulesArgs),
        ProvisionStep::Reboot,
    ];

    if let Some(account) = &settings.service_account {
        steps.push(script(&CreateServiceAccountArgs {
            account: account.clone(),
        }));
        steps.push(script(&GrantServiceAccountRightsArgs {
            account_name: account.name().to_string(),
        }));
    }

    steps.push(script(&DownloadPsuArgs));
    steps.push(script(&CreateFirewallRuleArgs));
    steps.push(script(&InstallPsuArgs {
        account: settings.service_account.clone(),
    }));
    steps.push(ProvisionStep::Reboot);
    steps
}

/// Object-safe bridge so heterogeneous argument structs share one closure.
trait ErasedArgs {
    fn to_step(&self, layout: &ScriptLayout, env: &BTreeMap<String, String>) -> ScriptStep;
}

impl<T: crate::script_traits::ScriptArgs> ErasedArgs for T {
    fn to_step(&self, layout: &ScriptLayout, env: &BTreeMap<String, String>) -> ScriptStep {
        ScriptStep::from_args(layout, self, env)
    }
}

/// Build the plan for already-resolved settings.
pub fn build_plan(server: &str, settings: &RoleSettings, ctx: PlanContext<'_>) -> RolePlan {
    let steps = match settings {
        RoleSettings::DomainController(dc) => domain_controller_steps(ctx, dc),
        RoleSettings::PowershellUniversal(psu) => powershell_universal_steps(ctx, psu),
    };
    info!(
        "Built {} plan for '{}': {} steps",
        settings.role(),
        server,
        steps.len()
    );
    RolePlan::new(server, settings.role(), steps)
}

/// Resolve one server's settings and build its plan.
pub fn plan_for_server(
    config: &LabConfig,
    server: &ServerConfig,
    env: &Environment,
) -> Result<RolePlan> {
    let resolver = Resolver::new(&config.vars, env);
    let settings = RoleSettings::resolve(server, &resolver, config.partial_credentials)?;
    let layout = ScriptLayout::new(&config.scripts_root);
    let ctx = PlanContext {
        layout: &layout,
        script_env: &config.env,
    };
    Ok(build_plan(&server.name, &settings, ctx))
}

/// Plans for every server, in declaration order. Fails on the first
/// configuration error.
pub fn plan_lab(config: &LabConfig, env: &Environment) -> Result<Vec<RolePlan>> {
    config
        .servers
        .iter()
        .map(|server| plan_for_server(config, server, env))
        .collect()
}
