// ABOUTME: Registers the staged image as a template in the home zone.
// ABOUTME: Removes the template again when the run does not succeed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::error::StepError;
use super::state::{PublishState, keys};
use crate::config::TemplateConfig;
use crate::pipeline::{RunStatus, Step, StepAction};
use crate::registry::{ImageRecord, TemplateRegistry};
use crate::types::{DeleteStatus, Zone};

pub struct RegisterStep {
    registry: Arc<dyn TemplateRegistry>,
    zone: Zone,
    template: TemplateConfig,
    created: Option<ImageRecord>,
    interrupted: bool,
}

impl RegisterStep {
    pub fn new(registry: Arc<dyn TemplateRegistry>, zone: Zone, template: TemplateConfig) -> Self {
        Self {
            registry,
            zone,
            template,
            created: None,
            interrupted: false,
        }
    }
}

#[async_trait]
impl Step<PublishState, StepError> for RegisterStep {
    fn name(&self) -> &'static str {
        "register"
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
        state: &mut PublishState,
    ) -> Result<StepAction, StepError> {
        let (Some(object), Some(checksum)) = (state.object.clone(), state.checksum.clone()) else {
            return Err(StepError::MissingObject);
        };

        state.ui.say(&format!(
            "Registering template {:?} in {}",
            self.template.name, self.zone
        ));
        let spec = self.template.spec(checksum);
        let register = self.registry.start_register(&self.zone, &object, &spec);
        let Ok(started) = cancellable(cancel, register).await else {
            self.interrupted = true;
            return Err(StepError::Cancelled);
        };
        let pending = started.map_err(|source| StepError::Register {
            zone: self.zone.clone(),
            source,
        })?;
        self.created = Some(pending.record().clone());

        let record = cancellable(cancel, self.registry.wait(&pending))
            .await?
            .map_err(|source| StepError::Register {
                zone: self.zone.clone(),
                source,
            })?;

        tracing::info!(template = %record, "template registered");
        self.created = Some(record.clone());
        state
            .generated_data
            .insert(keys::TEMPLATE_NAME.to_string(), record.name().to_string());
        state
            .generated_data
            .insert(keys::HOME_ZONE.to_string(), self.zone.to_string());
        state.images.push(record);

        Ok(StepAction::Continue)
    }

    async fn cleanup(
        &mut self,
        state: &mut PublishState,
        status: RunStatus,
    ) -> Result<(), StepError> {
        if status.is_success() {
            return Ok(());
        }
        if let Some(record) = self.created.take() {
            state.ui.say(&format!("Deleting template {record}"));
            match self.registry.delete(&record).await {
                Ok(DeleteStatus::Deleted) => {
                    tracing::debug!(template = %record, "template deleted")
                }
                Ok(DeleteStatus::NotFound) => {
                    tracing::debug!(template = %record, "template already gone")
                }
                Err(source) => {
                    return Err(StepError::Delete {
                        record: record.to_string(),
                        source,
                    });
                }
            }
        }
        if self.interrupted {
            return Err(StepError::Abandoned {
                zone: self.zone.clone(),
            });
        }
        Ok(())
    }
}
