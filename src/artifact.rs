// ABOUTME: Upstream artifact capability and source image validation.
// ABOUTME: Only whitelisted producers with exactly one local file are accepted.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// An artifact produced by an earlier build stage.
pub trait Artifact: Send + Sync {
    /// Identifier of the producer that created this artifact.
    fn builder_id(&self) -> &str;

    /// Local files making up the artifact.
    fn files(&self) -> &[PathBuf];
}

/// A plain artifact assembled from a builder id and a list of files.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    builder_id: String,
    files: Vec<PathBuf>,
}

impl LocalArtifact {
    pub fn new(builder_id: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            builder_id: builder_id.into(),
            files,
        }
    }

    /// A single-file artifact tagged as coming from the plain-file producer.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(ProducerKind::File.builder_id(), vec![path.into()])
    }
}

impl Artifact for LocalArtifact {
    fn builder_id(&self) -> &str {
        &self.builder_id
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Producers whose artifacts can be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    /// QEMU disk image builder.
    Qemu,
    /// Plain file builder.
    File,
    /// Post-processor that rewrites the artifact's file list.
    Artifice,
}

impl ProducerKind {
    pub const ALL: [ProducerKind; 3] = [
        ProducerKind::Qemu,
        ProducerKind::File,
        ProducerKind::Artifice,
    ];

    pub fn builder_id(&self) -> &'static str {
        match self {
            ProducerKind::Qemu => "transcend.qemu",
            ProducerKind::File => "packer.file",
            ProducerKind::Artifice => "packer.post-processor.artifice",
        }
    }

    pub fn from_builder_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.builder_id() == id)
    }
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.builder_id())
    }
}

/// Reasons an artifact cannot be published. None of these are retryable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error(
        "unsupported artifact type {0:?}: only artifacts from {accepted} are supported",
        accepted = accepted_list()
    )]
    UnsupportedProducer(String),

    #[error("artifact contains no files, expected exactly one disk image")]
    NoFiles,

    #[error("artifact contains {0} files, expected exactly one disk image")]
    MultipleFiles(usize),
}

fn accepted_list() -> String {
    ProducerKind::ALL
        .iter()
        .map(ProducerKind::builder_id)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The single disk image file selected from a validated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    producer: ProducerKind,
    path: PathBuf,
}

impl SourceImage {
    /// Validate an upstream artifact and pick its image file.
    ///
    /// Touches nothing remote and does not read the file.
    pub fn from_artifact(artifact: &dyn Artifact) -> Result<Self, ArtifactError> {
        let producer = ProducerKind::from_builder_id(artifact.builder_id())
            .ok_or_else(|| ArtifactError::UnsupportedProducer(artifact.builder_id().to_string()))?;

        match artifact.files() {
            [] => Err(ArtifactError::NoFiles),
            [path] => Ok(Self {
                producer,
                path: path.clone(),
            }),
            files => Err(ArtifactError::MultipleFiles(files.len())),
        }
    }

    pub fn producer(&self) -> ProducerKind {
        self.producer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used as the last segment of the upload key.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }
}
