// ABOUTME: Stages the source image in object storage under a run-unique key.
// ABOUTME: Always deletes the staged object at the end of the run.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::error::StepError;
use super::state::{PublishState, keys};
use crate::pipeline::{RunStatus, Step, StepAction};
use crate::storage::{ObjectBody, ObjectRef, ObjectStorage};
use crate::types::DeleteStatus;

const CHECKSUM_CHUNK: usize = 1 << 20;

pub struct UploadStep {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    key_prefix: String,
    attempted: Option<ObjectRef>,
}

impl UploadStep {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            attempted: None,
        }
    }

    fn key_for(&self, state: &PublishState) -> String {
        let file_name = state.source.file_name();
        if self.key_prefix.is_empty() {
            format!("{}/{file_name}", state.run_id)
        } else {
            format!("{}/{}/{file_name}", self.key_prefix, state.run_id)
        }
    }
}

#[async_trait]
impl Step<PublishState, StepError> for UploadStep {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
        state: &mut PublishState,
    ) -> Result<StepAction, StepError> {
        let path = state.source.path().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| StepError::Image {
                path: path.clone(),
                source,
            })?;
        if !metadata.is_file() {
            return Err(StepError::NotAFile(path));
        }
        if metadata.len() == 0 {
            return Err(StepError::EmptyImage(path));
        }

        state
            .ui
            .say(&format!("Computing checksum of {}", path.display()));
        let checksum = cancellable(cancel, md5_file(&path))
            .await?
            .map_err(|source| StepError::Image {
                path: path.clone(),
                source,
            })?;

        let object = self.storage.locate(&self.bucket, &self.key_for(state));
        self.attempted = Some(object.clone());

        state.ui.say(&format!(
            "Uploading {} ({} bytes) to {object}",
            path.display(),
            metadata.len()
        ));
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|source| StepError::Image {
                path: path.clone(),
                source,
            })?;
        let body = ObjectBody::new(file, metadata.len());
        cancellable(cancel, self.storage.put(&object, body))
            .await?
            .map_err(StepError::Upload)?;

        tracing::info!(%object, %checksum, "image uploaded");
        state
            .generated_data
            .insert(keys::SOURCE_OBJECT.to_string(), object.to_string());
        state
            .generated_data
            .insert(keys::SOURCE_CHECKSUM.to_string(), checksum.clone());
        state.object = Some(object);
        state.checksum = Some(checksum);

        Ok(StepAction::Continue)
    }

    async fn cleanup(
        &mut self,
        state: &mut PublishState,
        _status: RunStatus,
    ) -> Result<(), StepError> {
        let Some(object) = self.attempted.take() else {
            return Ok(());
        };

        state.ui.say(&format!("Deleting staged object {object}"));
        match self.storage.delete(&object).await {
            Ok(DeleteStatus::Deleted) => tracing::debug!(%object, "staged object deleted"),
            Ok(DeleteStatus::NotFound) => tracing::debug!(%object, "staged object already gone"),
            Err(e) => return Err(StepError::ObjectCleanup(e)),
        }
        state.object = None;
        Ok(())
    }
}

/// Hex-encoded MD5 of a file, read in chunks.
pub(crate) async fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHECKSUM_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
