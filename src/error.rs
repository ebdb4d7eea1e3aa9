// ABOUTME: Application-wide error types for templify.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::publish::{DestroyError, ManifestError, PublishError};
use crate::registry::RegistryError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("cannot read manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: ManifestError,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Destroy(#[from] DestroyError),

    #[error("object storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("registry setup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
