// ABOUTME: Object-storage capability used to stage raw image bytes.
// ABOUTME: Defines the trait plus the SOS (S3-compatible) and in-memory backends.

mod memory;
mod sigv4;
mod sos;

pub use memory::{MemoryStorage, StorageCall};
pub use sos::{SosConfig, SosStorage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::AsyncRead;

use crate::types::DeleteStatus;

/// Object storage: put and delete, nothing else.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Reference for `bucket`/`key` without touching the backend.
    ///
    /// Lets callers remember what they are about to create, so a failed or
    /// interrupted upload can still be cleaned up.
    fn locate(&self, bucket: &str, key: &str) -> ObjectRef;

    /// Store `body` at `object`.
    async fn put(&self, object: &ObjectRef, body: ObjectBody) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, object: &ObjectRef) -> Result<DeleteStatus, StorageError>;
}

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    /// URL the registry downloads the object from.
    pub url: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A byte stream of known length.
pub struct ObjectBody {
    reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
    len: u64,
}

impl ObjectBody {
    pub fn new(reader: impl AsyncRead + Send + Sync + Unpin + 'static, len: u64) -> Self {
        Self {
            reader: Box::new(reader),
            len,
        }
    }

    pub fn from_bytes(bytes: impl Into<bytes::Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(std::io::Cursor::new(bytes), len)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Sync + Unpin> {
        self.reader
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody").field("len", &self.len).finish()
    }
}

/// Errors from object storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("access denied by object storage: {0}")]
    Unauthorized(String),

    #[error("object storage rejected the request: {0}")]
    Rejected(String),

    #[error("object of {size} bytes exceeds the single upload limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid object storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("object storage request failed: {0}")]
    Transport(String),

    #[error("I/O error while streaming object: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transport(_) | StorageError::Io(_))
    }
}
