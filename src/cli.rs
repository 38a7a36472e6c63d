use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::types::PartialCredentialPolicy;

/// labprov - ordered provisioning of lab domain controllers and PowerShell Universal servers
#[derive(Parser)]
#[command(name = "labprov")]
#[command(about = "Provision lab Windows machines by running role scripts in order")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: log every step without connecting to any host.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a lab file and resolve every server's settings
    Validate {
        /// Path to the lab configuration file
        config: PathBuf,

        /// Override a setting (repeatable), e.g. --var domainname=corp.test
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Handling of a half-configured service account (reject, omit)
        #[arg(long)]
        partial_credentials: Option<PartialCredentialPolicy>,
    },
    /// Print the step plan of one or all servers
    Plan {
        /// Path to the lab configuration file
        config: PathBuf,

        /// Only plan these servers (repeatable; default: all)
        #[arg(short, long)]
        server: Vec<String>,

        /// Override a setting (repeatable), e.g. --var domainname=corp.test
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Handling of a half-configured service account (reject, omit)
        #[arg(long)]
        partial_credentials: Option<PartialCredentialPolicy>,

        /// Print plans as JSON (secrets redacted)
        #[arg(long)]
        json: bool,
    },
    /// Run the plans against the servers
    Provision {
        /// Path to the lab configuration file
        config: PathBuf,

        /// Only provision these servers (repeatable; default: all)
        #[arg(short, long)]
        server: Vec<String>,

        /// Override a setting (repeatable), e.g. --var domainname=corp.test
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Handling of a half-configured service account (reject, omit)
        #[arg(long)]
        partial_credentials: Option<PartialCredentialPolicy>,

        /// Provision servers concurrently, one thread per server
        #[arg(long)]
        parallel: bool,

        /// Seconds to wait for a host after a reboot (overrides the lab file)
        #[arg(long)]
        reboot_timeout: Option<u64>,

        /// Print run reports as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse a `KEY=VALUE` override. The value may be empty or contain `=`.
pub fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
