//! Typed, validated settings per role.
//!
//! Settings are resolved and checked once, before any plan is built. Plan
//! construction then works only with these structs and never looks at the
//! raw override map or the environment.

use crate::config_file::{IrmsBlock, ServerConfig};
use crate::error::{ProvisionError, Result};
use crate::resolver::{DOMAIN_NAME, NETBIOS_NAME, Resolver, SAFE_MODE_PASSWORD};
use crate::types::{PartialCredentialPolicy, Role};
use std::fmt;
use tracing::{debug, warn};

/// Maximum length of a NetBIOS domain name.
pub const NETBIOS_MAX_LEN: usize = 15;

/// Domain service account used by PowerShell Universal.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    name: String,
    password: String,
}

impl ServiceAccount {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Inputs of the domain controller plan.
#[derive(Clone, PartialEq, Eq)]
pub struct DomainControllerSettings {
    pub domain: String,
    pub netbios: String,
    pub safe_mode_password: String,
}

impl fmt::Debug for DomainControllerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainControllerSettings")
            .field("domain", &self.domain)
            .field("netbios", &self.netbios)
            .field("safe_mode_password", &"<redacted>")
            .finish()
    }
}

impl DomainControllerSettings {
    /// Resolve and validate the three domain settings.
    pub fn resolve(resolver: &Resolver<'_>) -> Result<Self> {
        let settings = Self {
            domain: resolver.required(&DOMAIN_NAME)?.value,
            netbios: resolver.required(&NETBIOS_NAME)?.value,
            safe_mode_password: resolver.required(&SAFE_MODE_PASSWORD)?.value,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        validate_domain_name(&self.domain)?;
        validate_netbios_name(&self.netbios)?;
        if self.safe_mode_password.is_empty() {
            return Err(ProvisionError::validation(
                "Safe-mode password cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Inputs of the PowerShell Universal plan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PsuSettings {
    pub service_account: Option<ServiceAccount>,
}

/// Resolved settings for one server, tagged by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSettings {
    DomainController(DomainControllerSettings),
    PowershellUniversal(PsuSettings),
}

impl RoleSettings {
    pub fn role(&self) -> Role {
        match self {
            Self::DomainController(_) => Role::DomainController,
            Self::PowershellUniversal(_) => Role::PowershellUniversal,
        }
    }

    /// Resolve everything the server's role needs.
    pub fn resolve(
        server: &ServerConfig,
        resolver: &Resolver<'_>,
        policy: PartialCredentialPolicy,
    ) -> Result<Self> {
        debug!("Resolving settings for server '{}' ({})", server.name, server.role);
        match server.role {
            Role::DomainController => Ok(Self::DomainController(
                DomainControllerSettings::resolve(resolver)?,
            )),
            Role::PowershellUniversal => Ok(Self::PowershellUniversal(PsuSettings {
                service_account: resolve_service_account(
                    &server.name,
                    server.irms.as_ref(),
                    policy,
                )?,
            })),
        }
    }
}

/// Resolve the optional service-account pair.
///
/// Both fields present yields an account, even if either is an empty string.
/// Both absent yields `None`. With
/// only one present, `Reject` fails and `Omit` yields `None`; a half pair is
/// never returned.
pub fn resolve_service_account(
    server: &str,
    irms: Option<&IrmsBlock>,
    policy: PartialCredentialPolicy,
) -> Result<Option<ServiceAccount>> {
    let Some(block) = irms else {
        debug!("Server '{}': no irms block, service account steps skipped", server);
        return Ok(None);
    };

    match (&block.service_account, &block.account_pw) {
        // Presence decides, not content: empty strings still count
        (Some(name), Some(password)) => {
            Ok(Some(ServiceAccount::new(name.clone(), password.clone())))
        }
        (None, None) => {
            warn!("Server '{}': irms block has no credentials", server);
            Ok(None)
        }
        (Some(_), None) => partial(server, "irms.service_account", "irms.account_pw", policy),
        (None, Some(_)) => partial(server, "irms.account_pw", "irms.service_account", policy),
    }
}

fn partial(
    server: &str,
    present: &str,
    missing: &str,
    policy: PartialCredentialPolicy,
) -> Result<Option<ServiceAccount>> {
    match policy {
        PartialCredentialPolicy::Reject => Err(ProvisionError::PartialCredentials {
            server: server.to_string(),
            present: present.to_string(),
            missing: missing.to_string(),
        }),
        PartialCredentialPolicy::Omit => {
            warn!(
                "Server '{}': {} set without {}; treating service account as absent",
                server, present, missing
            );
            Ok(None)
        }
    }
}

pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(ProvisionError::validation("Domain name cannot be empty"));
    }
    if domain.contains(char::is_whitespace) {
        return Err(ProvisionError::validation(
            "Domain name cannot contain whitespace",
        ));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(ProvisionError::validation(format!(
            "Domain name '{}' must be a dotted DNS name",
            domain
        )));
    }
    Ok(())
}

pub fn validate_netbios_name(netbios: &str) -> Result<()> {
    if netbios.is_empty() {
        return Err(ProvisionError::validation("NetBIOS name cannot be empty"));
    }
    if netbios.chars().count() > NETBIOS_MAX_LEN {
        return Err(ProvisionError::validation(format!(
            "NetBIOS name '{}' exceeds {} characters",
            netbios, NETBIOS_MAX_LEN
        )));
    }
    if netbios.contains('.') || netbios.contains(char::is_whitespace) {
        return Err(ProvisionError::validation(format!(
            "NetBIOS name '{}' cannot contain dots or whitespace",
            netbios
        )));
    }
    Ok(())
}
