//! labprov library
//!
//! Builds ordered provisioning plans for lab machines from layered settings
//! and runs them against guests with reboot barriers.

pub mod cli;
pub mod config_file;
pub mod error;
pub mod plan;
pub mod process_guard;
pub mod resolver;
pub mod run_state;
pub mod script_runner;
pub mod script_traits;
pub mod scripts;
pub mod sequencer;
pub mod settings;
pub mod ssh;
pub mod step;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config_file::{Connection, IrmsBlock, LabConfig, RebootSettings, ServerConfig};
pub use error::ProvisionError;
pub use plan::{RolePlan, build_plan, plan_for_server, plan_lab};
pub use process_guard::{ChildRegistry, ProcessGuard};
pub use resolver::{Environment, Resolved, Resolver, Setting, Source, resolve};
pub use run_state::{RunContext, RunStage, RunTransitionError};
pub use script_runner::ScriptOutput;
pub use script_traits::{ScriptArgs, ScriptLayout, ScriptLocation};
pub use sequencer::{RebootPolicy, RunReport, Sequencer, StepOutcome, StepReport, run_all};
pub use settings::{DomainControllerSettings, PsuSettings, RoleSettings, ServiceAccount};
pub use ssh::SshTransport;
pub use step::{ProvisionStep, ScriptStep};
pub use transport::{DryRunTransport, Transport};
pub use types::{PartialCredentialPolicy, Role};
