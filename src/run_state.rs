//! Plan run state machine
//!
//! Tracks one server's progress through its plan and enforces that steps run
//! strictly in order: a step can only begin after the previous one, nothing
//! can be skipped, and nothing moves once the run is terminal.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Running(0) | AwaitingReboot(0)
//!     ↓
//! Running(1) | AwaitingReboot(1)
//!     ↓
//!    ...
//!     ↓
//! Completed
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStage {
    NotStarted,
    /// Script step `n` is executing
    Running(usize),
    /// Reboot step `n` was issued; waiting for the host
    AwaitingReboot(usize),
    Completed,
    /// Failed while at step `n` (`None` if no step had begun)
    Failed(Option<usize>),
}

impl RunStage {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Index of the step in progress, if any.
    pub const fn step_index(self) -> Option<usize> {
        match self {
            Self::Running(i) | Self::AwaitingReboot(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::Running(i) => write!(f, "running step {}", i),
            Self::AwaitingReboot(i) => write!(f, "awaiting reboot at step {}", i),
            Self::Completed => f.write_str("completed"),
            Self::Failed(Some(i)) => write!(f, "failed at step {}", i),
            Self::Failed(None) => f.write_str("failed before first step"),
        }
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunTransitionError {
    /// Step index is not the immediate successor
    #[error("Cannot begin step {requested} while {current} (steps run strictly in order)")]
    OutOfOrder { current: RunStage, requested: usize },

    /// Step index is past the end of the plan
    #[error("Step {requested} is out of range for a plan of {total} steps")]
    OutOfRange { requested: usize, total: usize },

    /// Tried to finish before the last step began
    #[error("Cannot complete run while {current}; {remaining} step(s) remain")]
    Incomplete { current: RunStage, remaining: usize },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state: {from}")]
    FromTerminalState { from: RunStage },
}

impl From<RunTransitionError> for crate::error::ProvisionError {
    fn from(err: RunTransitionError) -> Self {
        crate::error::ProvisionError::transition(err.to_string())
    }
}

/// Owns the run stage of one plan and validates transitions.
///
/// # Example
///
/// ```
/// use labprov::run_state::{RunContext, RunStage};
///
/// let mut ctx = RunContext::new(2);
/// ctx.begin_step(0).unwrap();
/// assert!(ctx.begin_step(0).is_err());
/// ctx.begin_reboot(1).unwrap();
/// ctx.complete().unwrap();
/// assert_eq!(ctx.current(), RunStage::Completed);
/// ```
#[derive(Debug, Clone)]
pub struct RunContext {
    total: usize,
    current: RunStage,
}

impl RunContext {
    pub fn new(total_steps: usize) -> Self {
        Self {
            total: total_steps,
            current: RunStage::NotStarted,
        }
    }

    #[inline]
    pub fn current(&self) -> RunStage {
        self.current
    }

    fn check_next(&self, index: usize) -> Result<(), RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalState { from: self.current });
        }
        if index >= self.total {
            return Err(RunTransitionError::OutOfRange {
                requested: index,
                total: self.total,
            });
        }
        let expected = match self.current {
            RunStage::NotStarted => 0,
            other => other.step_index().map_or(0, |i| i + 1),
        };
        if index != expected {
            return Err(RunTransitionError::OutOfOrder {
                current: self.current,
                requested: index,
            });
        }
        Ok(())
    }

    /// Begin script step `index`.
    pub fn begin_step(&mut self, index: usize) -> Result<RunStage, RunTransitionError> {
        self.check_next(index)?;
        self.record(RunStage::Running(index));
        Ok(self.current)
    }

    /// Begin reboot step `index`.
    pub fn begin_reboot(&mut self, index: usize) -> Result<RunStage, RunTransitionError> {
        self.check_next(index)?;
        self.record(RunStage::AwaitingReboot(index));
        Ok(self.current)
    }

    /// Mark the run complete. Only valid once the last step has begun.
    pub fn complete(&mut self) -> Result<(), RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalState { from: self.current });
        }
        let begun = match self.current {
            RunStage::NotStarted => 0,
            other => other.step_index().map_or(0, |i| i + 1),
        };
        if begun < self.total {
            return Err(RunTransitionError::Incomplete {
                current: self.current,
                remaining: self.total - begun,
            });
        }
        self.record(RunStage::Completed);
        Ok(())
    }

    /// Mark the run failed at the current step.
    pub fn fail(&mut self) -> Result<(), RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalState { from: self.current });
        }
        let failed = RunStage::Failed(self.current.step_index());
        self.record(failed);
        Ok(())
    }

    fn record(&mut self, stage: RunStage) {
        debug!("Run stage: {} -> {}", self.current, stage);
        self.current = stage;
    }
}
