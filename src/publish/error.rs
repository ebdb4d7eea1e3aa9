// ABOUTME: Error types for the publish pipeline with SNAFU at the top level.
// ABOUTME: Classifies failures so callers can tell user aborts from system failures.

use std::path::PathBuf;

use snafu::Snafu;

use crate::artifact::ArtifactError;
use crate::pipeline::StepFailure;
use crate::registry::RegistryError;
use crate::storage::StorageError;
use crate::types::Zone;

/// Failure inside one of the publish steps.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("cannot read image {path}: {source}")]
    Image {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image {0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("image {0} is empty")]
    EmptyImage(PathBuf),

    #[error("upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("deleting uploaded object failed: {0}")]
    ObjectCleanup(#[source] StorageError),

    #[error("registering template in {zone} failed: {source}")]
    Register { zone: Zone, source: RegistryError },

    #[error("copying template to {zone} failed: {source}")]
    Copy { zone: Zone, source: RegistryError },

    #[error("deleting template {record} failed: {source}")]
    Delete {
        record: String,
        source: RegistryError,
    },

    #[error("no uploaded object to register")]
    MissingObject,

    #[error("no home-zone template to replicate")]
    MissingHomeImage,

    #[error("request to {zone} was interrupted before a template id was known; check {zone} for a leftover template")]
    Abandoned { zone: Zone },

    #[error("interrupted by cancellation")]
    Cancelled,
}

impl StepFailure for StepError {
    fn is_cancellation(&self) -> bool {
        matches!(self, StepError::Cancelled)
    }
}

/// Outcome of a publish call that did not produce a result.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PublishError {
    #[snafu(display("cannot publish artifact: {source}"))]
    Artifact { source: ArtifactError },

    #[snafu(display("publish failed: {source}"))]
    Step { source: StepError },

    #[snafu(display("zone {zone} is listed more than once"))]
    DuplicateZone { zone: Zone },

    #[snafu(display("publish cancelled"))]
    Cancelled,

    #[snafu(display("publish halted"))]
    Halted,

    #[snafu(display("publish succeeded without recording any image"))]
    NoImages,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// Bad input detected before or during local checks. Not retryable.
    Configuration,
    /// Network or timeout failure talking to a backend.
    TransientRemote,
    /// A backend refused the request (quota, format, credentials).
    Rejected,
    /// The user aborted the run.
    Cancelled,
    /// A step stopped the run without an error.
    Halted,
    /// An internal invariant was violated.
    Internal,
}

impl PublishError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> PublishErrorKind {
        match self {
            PublishError::Artifact { .. } | PublishError::DuplicateZone { .. } => {
                PublishErrorKind::Configuration
            }
            PublishError::Step { source } => step_kind(source),
            PublishError::Cancelled => PublishErrorKind::Cancelled,
            PublishError::Halted => PublishErrorKind::Halted,
            PublishError::NoImages => PublishErrorKind::Internal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == PublishErrorKind::Cancelled
    }
}

fn step_kind(error: &StepError) -> PublishErrorKind {
    match error {
        StepError::Image { .. } | StepError::NotAFile(_) | StepError::EmptyImage(_) => {
            PublishErrorKind::Configuration
        }
        StepError::Upload(source) | StepError::ObjectCleanup(source) => {
            if source.is_transient() {
                PublishErrorKind::TransientRemote
            } else {
                PublishErrorKind::Rejected
            }
        }
        StepError::Register { source, .. }
        | StepError::Copy { source, .. }
        | StepError::Delete { source, .. } => {
            if source.is_transient() {
                PublishErrorKind::TransientRemote
            } else {
                PublishErrorKind::Rejected
            }
        }
        StepError::MissingObject | StepError::MissingHomeImage => PublishErrorKind::Internal,
        StepError::Abandoned { .. } | StepError::Cancelled => PublishErrorKind::Cancelled,
    }
}

impl From<ArtifactError> for PublishError {
    fn from(source: ArtifactError) -> Self {
        PublishError::Artifact { source }
    }
}

impl From<StepError> for PublishError {
    fn from(source: StepError) -> Self {
        match source {
            StepError::Cancelled => PublishError::Cancelled,
            source => PublishError::Step { source },
        }
    }
}
