//! Plan execution.
//!
//! [`Sequencer`] runs a [`RolePlan`] against one [`Transport`], strictly in
//! order. A reboot step is a barrier: the host's boot id is read, the
//! reboot is requested, then the sequencer waits out the grace period and
//! polls until the host answers with a new boot id or the timeout elapses.
//! A refused reboot request fails the step. The first failing step ends
//! the run; later steps are reported as skipped and never executed.

use crate::config_file::RebootSettings;
use crate::error::{ProvisionError, Result};
use crate::plan::RolePlan;
use crate::run_state::{RunContext, RunStage};
use crate::step::ProvisionStep;
use crate::transport::Transport;
use crate::types::Role;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timing of the wait after a reboot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootPolicy {
    /// Pause before the first reachability check so the pre-reboot host is not mistaken
    /// for the restarted one
    pub grace: Duration,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl RebootPolicy {
    /// No waiting; for dry runs and tests.
    pub fn immediate() -> Self {
        Self {
            grace: Duration::ZERO,
            poll_interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }
}

impl From<&RebootSettings> for RebootPolicy {
    fn from(settings: &RebootSettings) -> Self {
        Self {
            grace: settings.grace(),
            poll_interval: settings.poll_interval(),
            timeout: settings.timeout(),
        }
    }
}

/// Outcome of one step in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    Succeeded,
    Rebooted,
    Failed,
    /// Not attempted because an earlier step failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub label: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Summary of one plan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub server: String,
    pub role: Role,
    pub steps: Vec<StepReport>,
    /// Final run stage, e.g. `completed` or `failed at step 2`
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Index of the failed step, if any.
    pub fn failed_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.outcome == StepOutcome::Failed)
            .map(|s| s.index)
    }
}

/// Runs plans against one transport.
pub struct Sequencer<'t, T: Transport + ?Sized> {
    transport: &'t T,
    policy: RebootPolicy,
}

impl<'t, T: Transport + ?Sized> Sequencer<'t, T> {
    pub fn new(transport: &'t T, policy: RebootPolicy) -> Self {
        Self { transport, policy }
    }

    /// Run `plan`; `Err` carries the first failure.
    pub fn run(&self, plan: &RolePlan) -> Result<RunReport> {
        let (report, result) = self.run_with_report(plan);
        result.map(|()| report)
    }

    /// Run `plan` and always return a report, plus the failure if any.
    pub fn run_with_report(&self, plan: &RolePlan) -> (RunReport, Result<()>) {
        let mut ctx = RunContext::new(plan.len());
        let mut reports = Vec::with_capacity(plan.len());
        let mut failure: Option<ProvisionError> = None;

        info!(
            "{}: starting {} plan ({} steps, {} reboot(s))",
            plan.server(),
            plan.role(),
            plan.len(),
            plan.reboot_count()
        );

        for (index, step) in plan.steps().iter().enumerate() {
            if failure.is_some() {
                reports.push(StepReport {
                    index,
                    label: step.label(),
                    outcome: StepOutcome::Skipped,
                    exit_code: None,
                    duration_ms: 0,
                });
                continue;
            }

            let started = Instant::now();
            let (outcome, exit_code, result) = self.run_step(&mut ctx, index, step, plan.len());
            reports.push(StepReport {
                index,
                label: step.label(),
                outcome,
                exit_code,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            if let Err(e) = result {
                error!("{}: {}", plan.server(), e);
                if let Err(te) = ctx.fail() {
                    warn!("{}: {}", plan.server(), te);
                }
                failure = Some(e);
            }
        }

        if failure.is_none() {
            if let Err(e) = ctx.complete() {
                failure = Some(e.into());
            } else {
                info!("{}: plan completed", plan.server());
            }
        }

        let report = RunReport {
            server: plan.server().to_string(),
            role: plan.role(),
            steps: reports,
            stage: ctx.current().to_string(),
            error: failure.as_ref().map(ToString::to_string),
        };
        (report, failure.map_or(Ok(()), Err))
    }

    fn run_step(
        &self,
        ctx: &mut RunContext,
        index: usize,
        step: &ProvisionStep,
        total: usize,
    ) -> (StepOutcome, Option<i32>, Result<()>) {
        match step {
            ProvisionStep::Script(script) => {
                if let Err(e) = ctx.begin_step(index) {
                    return (StepOutcome::Failed, None, Err(e.into()));
                }
                info!(
                    "{}: step {}/{}: {}",
                    self.transport.target(),
                    index + 1,
                    total,
                    step
                );
                match self.transport.run_script(script) {
                    Ok(output) => {
                        let result = output.ensure_success(index, &script.script_name());
                        let outcome = if result.is_ok() {
                            StepOutcome::Succeeded
                        } else {
                            StepOutcome::Failed
                        };
                        (outcome, output.exit_code, result)
                    }
                    Err(e) => (StepOutcome::Failed, None, Err(e)),
                }
            }
            ProvisionStep::Reboot => {
                if let Err(e) = ctx.begin_reboot(index) {
                    return (StepOutcome::Failed, None, Err(e.into()));
                }
                info!(
                    "{}: step {}/{}: reboot",
                    self.transport.target(),
                    index + 1,
                    total
                );
                let result = self.transport.boot_id().and_then(|before| {
                    self.transport.request_reboot()?;
                    self.wait_for_host(index, before.as_deref())
                });
                let outcome = if result.is_ok() {
                    StepOutcome::Rebooted
                } else {
                    StepOutcome::Failed
                };
                (outcome, None, result)
            }
        }
    }

    /// Block until the host is reachable again or the timeout elapses.
    ///
    /// With a `previous_boot` id the host must also report a different boot
    /// id, so a machine that never went down does not pass the barrier.
    fn wait_for_host(&self, index: usize, previous_boot: Option<&str>) -> Result<()> {
        if !self.policy.grace.is_zero() {
            debug!(
                "{}: waiting {:?} before checking reachability",
                self.transport.target(),
                self.policy.grace
            );
            std::thread::sleep(self.policy.grace);
        }

        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if self.transport.is_reachable() && self.restarted(previous_boot) {
                info!(
                    "{}: back online after {} check(s)",
                    self.transport.target(),
                    attempts
                );
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed >= self.policy.timeout {
                return Err(ProvisionError::RebootTimeout {
                    host: self.transport.target().to_string(),
                    index,
                    timeout: self.policy.timeout,
                });
            }
            let remaining = self.policy.timeout - elapsed;
            std::thread::sleep(self.policy.poll_interval.min(remaining));
        }
    }

    fn restarted(&self, previous_boot: Option<&str>) -> bool {
        let Some(previous) = previous_boot else {
            return true;
        };
        match self.transport.boot_id() {
            Ok(Some(current)) if current != previous => true,
            Ok(Some(_)) => {
                debug!(
                    "{}: still on the boot before the reboot request",
                    self.transport.target()
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                debug!("{}: boot id not readable yet: {}", self.transport.target(), e);
                false
            }
        }
    }
}

/// Run several plans, each against the transport `connect` builds for it.
///
/// Plans are independent: one failing does not stop the others. With
/// `parallel` each plan runs on its own scoped thread; reports come back in
/// plan order either way.
pub fn run_all<F>(plans: &[RolePlan], parallel: bool, connect: F) -> Vec<(RunReport, Result<()>)>
where
    F: Fn(&RolePlan) -> (Box<dyn Transport>, RebootPolicy) + Sync,
{
    let run_one = |plan: &RolePlan| {
        let (transport, policy) = connect(plan);
        Sequencer::new(transport.as_ref(), policy).run_with_report(plan)
    };

    if !parallel || plans.len() < 2 {
        return plans.iter().map(run_one).collect();
    }

    let run_one = &run_one;
    std::thread::scope(|scope| {
        let handles: Vec<_> = plans
            .iter()
            .map(|plan| (plan, scope.spawn(move || run_one(plan))))
            .collect();
        handles
            .into_iter()
            .map(|(plan, handle)| {
                handle.join().unwrap_or_else(|_| {
                    let err = ProvisionError::transport(format!(
                        "{}: provisioning thread panicked",
                        plan.server()
                    ));
                    let report = RunReport {
                        server: plan.server().to_string(),
                        role: plan.role(),
                        steps: Vec::new(),
                        stage: RunStage::Failed(None).to_string(),
                        error: Some(err.to_string()),
                    };
                    (report, Err(err))
                })
            })
            .collect()
    })
}
