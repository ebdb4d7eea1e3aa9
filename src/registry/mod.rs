// ABOUTME: Compute-image registry capability: register, copy, and delete templates.
// ABOUTME: Defines the trait, image records, and the Exoscale and in-memory backends.

mod exoscale;
mod memory;
mod signature;

pub use exoscale::{ExoscaleConfig, ExoscaleRegistry};
pub use memory::{MemoryRegistry, RegistryCall};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::ObjectRef;
use crate::types::{DeleteStatus, OperationId, TemplateId, Zone};

/// Registry of bootable templates, scoped per zone.
///
/// Creating a template is split in two: `start_*` returns once the registry
/// has assigned the new template its id, and [`TemplateRegistry::wait`] blocks
/// until the template is ready. Callers that can be interrupted record the
/// pending id in between so they can delete it later.
#[async_trait]
pub trait TemplateRegistry: Send + Sync {
    /// Start creating a template in `zone` from an uploaded object.
    async fn start_register(
        &self,
        zone: &Zone,
        source: &ObjectRef,
        spec: &TemplateSpec,
    ) -> Result<PendingTemplate, RegistryError>;

    /// Start copying `template` into `target`.
    async fn start_copy(
        &self,
        template: &ImageRecord,
        target: &Zone,
    ) -> Result<PendingTemplate, RegistryError>;

    /// Block until a pending template is ready, returning its full record.
    async fn wait(&self, pending: &PendingTemplate) -> Result<ImageRecord, RegistryError>;

    /// Delete a template. Deleting a missing template is not an error.
    async fn delete(&self, template: &ImageRecord) -> Result<DeleteStatus, RegistryError>;
}

/// A template the registry has accepted but not finished creating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTemplate {
    record: ImageRecord,
    operation: Option<(Zone, OperationId)>,
}

impl PendingTemplate {
    pub fn new(record: ImageRecord) -> Self {
        Self {
            record,
            operation: None,
        }
    }

    /// Track the remote operation creating the template, polled in `zone`.
    pub fn with_operation(mut self, zone: Zone, operation: OperationId) -> Self {
        self.operation = Some((zone, operation));
        self
    }

    /// The template as known so far: id, zone, and name.
    pub fn record(&self) -> &ImageRecord {
        &self.record
    }

    pub fn operation(&self) -> Option<(&Zone, &OperationId)> {
        self.operation.as_ref().map(|(zone, id)| (zone, id))
    }
}

/// A published template in one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    id: TemplateId,
    zone: Zone,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl ImageRecord {
    pub fn new(id: TemplateId, zone: Zone, name: impl Into<String>) -> Self {
        Self {
            id,
            zone,
            name: name.into(),
            checksum: None,
            size: None,
            created_at: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn id(&self) -> &TemplateId {
        &self.id
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl std::fmt::Display for ImageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.zone, self.id)
    }
}

/// Firmware the template boots with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    #[default]
    Legacy,
    Uefi,
}

/// Everything the registry needs to know about a new template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpec {
    pub name: String,
    pub description: Option<String>,
    /// MD5 of the image file, hex encoded.
    pub checksum: String,
    pub default_user: Option<String>,
    pub boot_mode: BootMode,
    pub password_enabled: bool,
    pub ssh_key_enabled: bool,
    pub build: Option<String>,
    pub version: Option<String>,
    pub maintainer: Option<String>,
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry denied access: {0}")]
    Unauthorized(String),

    #[error("registry rejected the request: {0}")]
    Rejected(String),

    #[error("template not found: {0}")]
    NotFound(String),

    #[error("registry request failed: {0}")]
    Transient(String),

    #[error("registry operation {operation} did not finish within {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("registry operation {operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("unexpected registry response: {0}")]
    Decode(String),

    #[error("invalid registry endpoint: {0}")]
    InvalidEndpoint(String),
}

impl RegistryError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Transient(_) | RegistryError::Timeout { .. }
        )
    }
}
