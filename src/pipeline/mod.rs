// ABOUTME: Sequential step pipeline with compensating cleanup.
// ABOUTME: Exports the Step contract, the Runner, run outcomes, and pause hooks.

mod pause;
mod runner;
mod step;

pub use pause::{ConfirmPause, NoPause, PauseHook};
pub use runner::Runner;
pub use step::{Outcome, RunStatus, Step, StepAction, StepFailure};
