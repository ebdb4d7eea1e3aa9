// ABOUTME: Copies the home-zone template into each additional zone, in order.
// ABOUTME: Undoes created copies newest first when the run does not succeed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::error::StepError;
use super::state::PublishState;
use crate::pipeline::{RunStatus, Step, StepAction};
use crate::registry::{ImageRecord, TemplateRegistry};
use crate::types::{DeleteStatus, Zone};

pub struct ReplicateStep {
    registry: Arc<dyn TemplateRegistry>,
    zones: Vec<Zone>,
    undo: Vec<ImageRecord>,
    interrupted: Option<Zone>,
}

impl ReplicateStep {
    pub fn new(registry: Arc<dyn TemplateRegistry>, zones: Vec<Zone>) -> Self {
        Self {
            registry,
            zones,
            undo: Vec::new(),
            interrupted: None,
        }
    }
}

#[async_trait]
impl Step<PublishState, StepError> for ReplicateStep {
    fn name(&self) -> &'static str {
        "replicate"
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
        state: &mut PublishState,
    ) -> Result<StepAction, StepError> {
        if self.zones.is_empty() {
            return Ok(StepAction::Continue);
        }
        let home = state
            .images
            .first()
            .cloned()
            .ok_or(StepError::MissingHomeImage)?;

        for zone in &self.zones {
            state
                .ui
                .say(&format!("Copying template {} to {zone}", home.id()));
            let request = self.registry.start_copy(&home, zone);
            let Ok(started) = cancellable(cancel, request).await else {
                self.interrupted = Some(zone.clone());
                return Err(StepError::Cancelled);
            };
            let pending = started.map_err(|source| StepError::Copy {
                zone: zone.clone(),
                source,
            })?;
            self.undo.push(pending.record().clone());

            let copy = cancellable(cancel, self.registry.wait(&pending))
                .await?
                .map_err(|source| StepError::Copy {
                    zone: zone.clone(),
                    source,
                })?;

            tracing::info!(template = %copy, "template copied");
            if let Some(last) = self.undo.last_mut() {
                *last = copy.clone();
            }
            state.images.push(copy);
        }

        Ok(StepAction::Continue)
    }

    async fn cleanup(
        &mut self,
        state: &mut PublishState,
        status: RunStatus,
    ) -> Result<(), StepError> {
        if status.is_success() {
            self.undo.clear();
            return Ok(());
        }

        let mut first_error = None;
        while let Some(record) = self.undo.pop() {
            state.ui.say(&format!("Deleting template {record}"));
            match self.registry.delete(&record).await {
                Ok(DeleteStatus::Deleted) => {
                    tracing::debug!(template = %record, "template deleted")
                }
                Ok(DeleteStatus::NotFound) => {
                    tracing::debug!(template = %record, "template already gone")
                }
                Err(source) => {
                    tracing::warn!(template = %record, error = %source, "template delete failed");
                    first_error.get_or_insert(StepError::Delete {
                        record: record.to_string(),
                        source,
                    });
                }
            }
        }

        if let Some(zone) = self.interrupted.take() {
            first_error.get_or_insert(StepError::Abandoned { zone });
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
