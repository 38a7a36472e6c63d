//! labprov - Main entry point
//!
//! Loads a lab file, resolves settings, builds role plans and runs them.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use labprov::cli::{Cli, Commands};
use labprov::{
    DryRunTransport, Environment, LabConfig, PartialCredentialPolicy, ProcessGuard, RebootPolicy,
    RolePlan, SshTransport, Transport, plan_for_server, process_guard, run_all,
};

/// Initialize tracing; `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    debug!("CLI arguments parsed");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Validate {
            config,
            vars,
            partial_credentials,
        } => {
            let lab = load_lab(&config, vars, partial_credentials)?;
            let env = script_environment(&lab);
            for server in &lab.servers {
                let plan = plan_for_server(&lab, server, &env)
                    .with_context(|| format!("Server '{}'", server.name))?;
                println!(
                    "✓ {} ({}): {} steps, {} reboot(s)",
                    plan.server(),
                    plan.role(),
                    plan.len(),
                    plan.reboot_count()
                );
                println!("    {}", plan.labels().join(" → "));
            }
            println!("✓ Configuration file is valid: {:?}", config);
            Ok(true)
        }
        Commands::Plan {
            config,
            server,
            vars,
            partial_credentials,
            json,
        } => {
            let lab = load_lab(&config, vars, partial_credentials)?;
            let plans = build_plans(&lab, &server)?;
            if json {
                let redacted: Vec<RolePlan> = plans.iter().map(RolePlan::redacted).collect();
                println!("{}", serde_json::to_string_pretty(&redacted)?);
            } else {
                for plan in &plans {
                    print_plan(plan);
                }
            }
            Ok(true)
        }
        Commands::Provision {
            config,
            server,
            vars,
            partial_credentials,
            parallel,
            reboot_timeout,
            json,
        } => {
            let mut lab = load_lab(&config, vars, partial_credentials)?;
            if let Some(secs) = reboot_timeout {
                anyhow::ensure!(secs > 0, "--reboot-timeout must be non-zero");
                lab.reboot.timeout_secs = secs;
            }
            // Every plan is built before any host is touched
            let plans = build_plans(&lab, &server)?;
            provision(&lab, &plans, parallel, cli.dry_run, json)
        }
    }
}

fn load_lab(
    path: &Path,
    vars: Vec<(String, String)>,
    partial_credentials: Option<PartialCredentialPolicy>,
) -> Result<LabConfig> {
    info!("Loading lab configuration from {:?}", path);
    let mut lab = LabConfig::load_from_file(path)?;
    lab.apply_overrides(vars);
    if let Some(policy) = partial_credentials {
        lab.partial_credentials = policy;
    }
    lab.validate()
        .with_context(|| format!("Invalid lab configuration {:?}", path))?;
    Ok(lab)
}

/// Process environment layered over the lab file's `env` block.
fn script_environment(lab: &LabConfig) -> Environment {
    let env = Environment::from_process().layered_over(&lab.env);
    if env.is_empty() {
        debug!("Environment layer is empty");
    } else {
        debug!("Environment layer holds {} variable(s)", env.len());
    }
    env
}

fn build_plans(lab: &LabConfig, only: &[String]) -> Result<Vec<RolePlan>> {
    for name in only {
        anyhow::ensure!(lab.server(name).is_some(), "Unknown server: {}", name);
    }
    let env = script_environment(lab);
    lab.servers
        .iter()
        .filter(|s| only.is_empty() || only.contains(&s.name))
        .map(|s| {
            plan_for_server(lab, s, &env).with_context(|| format!("Server '{}'", s.name))
        })
        .collect()
}

fn print_plan(plan: &RolePlan) {
    println!("{} ({})", plan.server(), plan.role());
    for (i, step) in plan.steps().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, step);
    }
}

fn provision(
    lab: &LabConfig,
    plans: &[RolePlan],
    parallel: bool,
    dry_run: bool,
    json: bool,
) -> Result<bool> {
    let _guard = ProcessGuard::new();

    let results = run_all(plans, parallel, |plan| {
        let transport: Box<dyn Transport> = match (dry_run, lab.server(plan.server())) {
            (false, Some(server)) => Box::new(SshTransport::new(
                &server.name,
                server.connection.clone(),
                &lab.staging_dir,
                lab.reboot.connect_timeout(),
            )),
            _ => Box::new(DryRunTransport::new(plan.server())),
        };
        let policy = if dry_run {
            RebootPolicy::immediate()
        } else {
            RebootPolicy::from(&lab.reboot)
        };
        (transport, policy)
    });

    let all_ok = results.iter().all(|(_, result)| result.is_ok());

    if json {
        let reports: Vec<_> = results.iter().map(|(report, _)| report).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (report, result) in &results {
            match result {
                Ok(()) => println!("✓ {}: {}", report.server, report.stage),
                Err(e) => println!("✗ {}: {}", report.server, e),
            }
        }
    }

    Ok(all_ok)
}
