// ABOUTME: Artifact returned by a successful publish: one template per zone.
// ABOUTME: Serializes to a JSON manifest and can destroy what it describes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::{ImageRecord, RegistryError, TemplateRegistry};
use crate::types::DeleteStatus;

/// Identifies results produced by this crate.
pub const BUILDER_ID: &str = "templify.exoscale-template";

/// Templates published by one run, home zone first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    images: Vec<ImageRecord>,
    generated_data: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    builder_id: String,
    images: Vec<ImageRecord>,
    #[serde(default)]
    generated_data: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("malformed manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest was written by {0:?}, expected {expected:?}", expected = BUILDER_ID)]
    ForeignBuilder(String),

    #[error("manifest lists no images")]
    Empty,
}

/// Outcome of [`PublishResult::destroy`] when every delete went through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    pub deleted: Vec<ImageRecord>,
    /// Images that no longer existed.
    pub already_gone: Vec<ImageRecord>,
}

#[derive(Debug)]
pub struct DestroyFailure {
    pub image: ImageRecord,
    pub error: RegistryError,
}

/// Some deletes failed. Every image was still attempted.
#[derive(Debug, thiserror::Error)]
#[error("failed to delete {} of {attempted} templates: {}", .failures.len(), summarize(.failures))]
pub struct DestroyError {
    pub attempted: usize,
    pub failures: Vec<DestroyFailure>,
}

fn summarize(failures: &[DestroyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.image, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PublishResult {
    /// Returns `None` when `images` is empty; a result always has a home image.
    pub fn new(images: Vec<ImageRecord>, generated_data: BTreeMap<String, String>) -> Option<Self> {
        if images.is_empty() {
            return None;
        }
        Some(Self {
            images,
            generated_data,
        })
    }

    pub fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn home_image(&self) -> &ImageRecord {
        &self.images[0]
    }

    pub fn generated_data(&self) -> &BTreeMap<String, String> {
        &self.generated_data
    }

    /// Comma-joined `zone:id` of every image, in publish order.
    pub fn id(&self) -> String {
        self.images
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn to_manifest(&self) -> Result<String, ManifestError> {
        let manifest = Manifest {
            builder_id: BUILDER_ID.to_string(),
            images: self.images.clone(),
            generated_data: self.generated_data.clone(),
        };
        Ok(serde_json::to_string_pretty(&manifest)?)
    }

    pub fn from_manifest(json: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(json)?;
        if manifest.builder_id != BUILDER_ID {
            return Err(ManifestError::ForeignBuilder(manifest.builder_id));
        }
        Self::new(manifest.images, manifest.generated_data).ok_or(ManifestError::Empty)
    }

    /// Delete every image in publish order.
    ///
    /// Images already gone count as deleted. A failing delete does not stop
    /// the remaining ones.
    pub async fn destroy(
        &self,
        registry: &dyn TemplateRegistry,
    ) -> Result<DestroyReport, DestroyError> {
        let mut report = DestroyReport::default();
        let mut failures = Vec::new();

        for image in &self.images {
            match registry.delete(image).await {
                Ok(DeleteStatus::Deleted) => {
                    tracing::info!(template = %image, "template destroyed");
                    report.deleted.push(image.clone());
                }
                Ok(DeleteStatus::NotFound) => {
                    tracing::info!(template = %image, "template already gone");
                    report.already_gone.push(image.clone());
                }
                Err(error) => {
                    tracing::warn!(template = %image, %error, "template delete failed");
                    failures.push(DestroyFailure {
                        image: image.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(DestroyError {
                attempted: self.images.len(),
                failures,
            })
        }
    }
}

impl fmt::Display for PublishResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Templates {:?} published: {}",
            self.home_image().name(),
            self.images
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
