// ABOUTME: Hooks consulted between pipeline steps.
// ABOUTME: Used for interactive step-by-step debugging of a publish run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ui::Ui;

/// Consulted after each step that completed with `Continue`, before the next
/// one starts. Never invoked mid-step. The runner stops waiting on the hook
/// once the run is cancelled.
#[async_trait]
pub trait PauseHook: Send + Sync {
    /// Return `false` to abort the run. The run is then reported as cancelled.
    async fn should_continue(&self, completed_step: &str) -> bool;
}

/// Never pauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPause;

#[async_trait]
impl PauseHook for NoPause {
    async fn should_continue(&self, _completed_step: &str) -> bool {
        true
    }
}

/// Asks the user for confirmation after every step.
pub struct ConfirmPause {
    ui: Arc<dyn Ui>,
}

impl ConfirmPause {
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self { ui }
    }
}

#[async_trait]
impl PauseHook for ConfirmPause {
    async fn should_continue(&self, completed_step: &str) -> bool {
        self.ui
            .confirm(&format!("Pausing after {completed_step} step. Continue?"))
            .await
    }
}
