// ABOUTME: The Step contract: a forward action plus a compensating cleanup.
// ABOUTME: Also defines the per-run outcome reported by the Runner.

use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// What the Runner should do after a step's forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop the sequence without reporting an error.
    Halt,
}

/// A unit of pipeline work over shared state `S`, failing with `E`.
///
/// `cleanup` runs for every step whose `run` was started, even when `run`
/// failed half-way, so it must cope with partially created resources and
/// with nothing having been created at all.
#[async_trait]
pub trait Step<S, E>: Send {
    /// Short name used in logs and pause prompts.
    fn name(&self) -> &'static str;

    /// Forward action.
    async fn run(&mut self, cancel: &CancellationToken, state: &mut S) -> Result<StepAction, E>;

    /// Compensating action. `status` is the final status of the whole run.
    async fn cleanup(&mut self, state: &mut S, status: RunStatus) -> Result<(), E>;
}

/// Lets the Runner tell a cancelled wait apart from a genuine failure.
pub trait StepFailure {
    fn is_cancellation(&self) -> bool;
}

/// Terminal result of a pipeline run. Exactly one is produced per run.
#[derive(Debug)]
pub enum Outcome<E> {
    Success,
    Halted,
    Cancelled,
    Errored(E),
}

impl<E> Outcome<E> {
    pub fn status(&self) -> RunStatus {
        match self {
            Outcome::Success => RunStatus::Success,
            Outcome::Halted => RunStatus::Halted,
            Outcome::Cancelled => RunStatus::Cancelled,
            Outcome::Errored(_) => RunStatus::Errored,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Payload-free view of an [`Outcome`], handed to cleanups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Halted,
    Cancelled,
    Errored,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        self == RunStatus::Success
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Halted => "halted",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}
