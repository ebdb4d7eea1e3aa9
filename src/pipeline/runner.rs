// ABOUTME: Executes steps in order against shared state, then cleans up in reverse.
// ABOUTME: Short-circuits on halt, error, cancellation, or a declined pause.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::pause::{NoPause, PauseHook};
use super::step::{Outcome, Step, StepAction, StepFailure};
use crate::diagnostics::{Diagnostics, Warning};

/// Runs an ordered list of steps.
///
/// State machine per run: every step is attempted in order until one halts,
/// fails, or the run is cancelled. Whatever the outcome, `cleanup` is then
/// called on each step that was started, last started first.
pub struct Runner<'a, S, E> {
    steps: Vec<Box<dyn Step<S, E> + 'a>>,
    pause: Arc<dyn PauseHook>,
}

impl<'a, S, E> Runner<'a, S, E>
where
    S: Send,
    E: StepFailure + fmt::Display,
{
    pub fn new(steps: Vec<Box<dyn Step<S, E> + 'a>>) -> Self {
        Self {
            steps,
            pause: Arc::new(NoPause),
        }
    }

    /// Consult `pause` between steps.
    pub fn with_pause(mut self, pause: Arc<dyn PauseHook>) -> Self {
        self.pause = pause;
        self
    }

    /// Run every step, then every applicable cleanup.
    ///
    /// Cleanup failures are recorded in `diag` and never change the outcome.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
        state: &mut S,
        diag: &mut Diagnostics,
    ) -> Outcome<E> {
        let total = self.steps.len();
        let mut started = 0;
        let mut outcome = Outcome::Success;

        for (index, step) in self.steps.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(step = step.name(), "cancelled before step");
                outcome = Outcome::Cancelled;
                break;
            }

            started = index + 1;
            tracing::info!(step = step.name(), "running step");

            match step.run(cancel, state).await {
                Ok(StepAction::Continue) => {
                    tracing::debug!(step = step.name(), "step finished");
                }
                Ok(StepAction::Halt) => {
                    tracing::info!(step = step.name(), "step halted the run");
                    outcome = Outcome::Halted;
                    break;
                }
                Err(e) if e.is_cancellation() => {
                    tracing::info!(step = step.name(), "step interrupted by cancellation");
                    outcome = Outcome::Cancelled;
                    break;
                }
                Err(e) => {
                    tracing::error!(step = step.name(), error = %e, "step failed");
                    outcome = Outcome::Errored(e);
                    break;
                }
            }

            if index + 1 < total {
                let proceed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    answer = self.pause.should_continue(step.name()) => answer,
                };
                if !proceed {
                    tracing::info!(step = step.name(), "run aborted at pause");
                    outcome = Outcome::Cancelled;
                    break;
                }
            }
        }

        let status = outcome.status();
        for step in self.steps[..started].iter_mut().rev() {
            tracing::debug!(step = step.name(), %status, "cleaning up step");
            if let Err(e) = step.cleanup(state, status).await {
                diag.warn(Warning::cleanup_failed(step.name(), e.to_string()));
            }
        }

        outcome
    }
}
