// ABOUTME: Publishes a disk image as a template in every configured zone.
// ABOUTME: Wires the upload, register, and replicate steps into one pipeline run.

mod error;
mod register;
mod replicate;
mod result;
mod state;
mod upload;

pub use error::{PublishError, PublishErrorKind, StepError};
pub use register::RegisterStep;
pub use replicate::ReplicateStep;
pub use result::{
    BUILDER_ID, DestroyError, DestroyFailure, DestroyReport, ManifestError, PublishResult,
};
pub use state::{PublishState, keys};
pub use upload::UploadStep;

use std::future::Future;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::{Artifact, SourceImage};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::pipeline::{NoPause, Outcome, PauseHook, Runner, Step};
use crate::registry::TemplateRegistry;
use crate::storage::ObjectStorage;
use crate::ui::{SilentUi, Ui};

/// Backends a publish run talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub storage: Arc<dyn ObjectStorage>,
    pub registry: Arc<dyn TemplateRegistry>,
}

/// Runs publishes for one configuration.
pub struct Publisher<'a> {
    config: &'a Config,
    capabilities: Capabilities,
    ui: Arc<dyn Ui>,
    pause: Arc<dyn PauseHook>,
    diagnostics: Diagnostics,
}

impl<'a> Publisher<'a> {
    pub fn new(config: &'a Config, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
            ui: Arc::new(SilentUi),
            pause: Arc::new(NoPause),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    /// Consult `pause` after every step but the last.
    pub fn with_pause(mut self, pause: Arc<dyn PauseHook>) -> Self {
        self.pause = pause;
        self
    }

    /// Non-fatal problems from all runs so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn steps(&self) -> Vec<Box<dyn Step<PublishState, StepError>>> {
        vec![
            Box::new(UploadStep::new(
                self.capabilities.storage.clone(),
                self.config.bucket.clone(),
                self.config.key_prefix(),
            )),
            Box::new(RegisterStep::new(
                self.capabilities.registry.clone(),
                self.config.home_zone().clone(),
                self.config.template.clone(),
            )),
            Box::new(ReplicateStep::new(
                self.capabilities.registry.clone(),
                self.config.additional_zones().to_vec(),
            )),
        ]
    }

    /// Publish `artifact`. The zones and artifact are validated before any
    /// backend call.
    pub async fn run(
        &mut self,
        artifact: &dyn Artifact,
        cancel: &CancellationToken,
    ) -> Result<PublishResult, PublishError> {
        if let Some(zone) = self.config.duplicate_zone() {
            return Err(PublishError::DuplicateZone { zone: zone.clone() });
        }
        let source = SourceImage::from_artifact(artifact)?;
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, image = %source.path().display(), "starting publish");

        let mut state = PublishState::new(run_id, source, self.ui.clone());
        let mut runner = Runner::new(self.steps()).with_pause(self.pause.clone());
        let already_warned = self.diagnostics.warnings().len();
        let outcome = runner
            .run(cancel, &mut state, &mut self.diagnostics)
            .await;

        for warning in &self.diagnostics.warnings()[already_warned..] {
            self.ui.error(&warning.message);
        }

        match outcome {
            Outcome::Success => {
                state.generated_data.insert(
                    keys::PUBLISHED_AT.to_string(),
                    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                );
                PublishResult::new(state.images, state.generated_data)
                    .ok_or(PublishError::NoImages)
            }
            Outcome::Halted => Err(PublishError::Halted),
            Outcome::Cancelled => Err(PublishError::Cancelled),
            Outcome::Errored(e) => Err(e.into()),
        }
    }
}

/// Publish `artifact` with `config`, reporting progress to `ui`.
pub async fn publish(
    config: &Config,
    capabilities: Capabilities,
    artifact: &dyn Artifact,
    ui: Arc<dyn Ui>,
    cancel: &CancellationToken,
) -> Result<PublishResult, PublishError> {
    Publisher::new(config, capabilities)
        .with_ui(ui)
        .run(artifact, cancel)
        .await
}

/// Await `fut` unless `cancel` fires first.
///
/// Dropping `fut` stops waiting; a remote operation already started keeps
/// running on the server, so steps record pending templates before waiting.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, StepError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StepError::Cancelled),
        output = fut => Ok(output),
    }
}
