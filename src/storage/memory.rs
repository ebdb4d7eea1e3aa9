// ABOUTME: In-memory object storage with a call log and failure injection.
// ABOUTME: Backs dry runs and lets tests assert exactly which calls were made.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;

use super::{ObjectBody, ObjectRef, ObjectStorage, StorageError};
use crate::types::DeleteStatus;

/// A call made against [`MemoryStorage`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Put { bucket: String, key: String },
    Delete { bucket: String, key: String },
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(String, String), Bytes>,
    calls: Vec<StorageCall>,
    fail_puts: Option<String>,
}

/// Object storage kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent put fail with a transport error.
    pub fn fail_puts(&self, reason: impl Into<String>) {
        self.inner.lock().fail_puts = Some(reason.into());
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.inner.lock().calls.clone()
    }

    pub fn put_count(&self) -> usize {
        self.count(|call| matches!(call, StorageCall::Put { .. }))
    }

    pub fn delete_count(&self) -> usize {
        self.count(|call| matches!(call, StorageCall::Delete { .. }))
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.inner
            .lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn count(&self, pred: impl Fn(&StorageCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| pred(call)).count()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn locate(&self, bucket: &str, key: &str) -> ObjectRef {
        ObjectRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
            url: format!("memory://{bucket}/{key}"),
        }
    }

    async fn put(&self, object: &ObjectRef, body: ObjectBody) -> Result<(), StorageError> {
        let failure = {
            let mut inner = self.inner.lock();
            inner.calls.push(StorageCall::Put {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
            });
            inner.fail_puts.clone()
        };
        if let Some(reason) = failure {
            return Err(StorageError::Transport(reason));
        }

        let expected = body.len();
        let mut data = Vec::new();
        body.into_reader().read_to_end(&mut data).await?;
        if data.len() as u64 != expected {
            return Err(StorageError::Rejected(format!(
                "declared length {expected} but received {} bytes",
                data.len()
            )));
        }

        self.inner.lock().objects.insert(
            (object.bucket.clone(), object.key.clone()),
            Bytes::from(data),
        );
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<DeleteStatus, StorageError> {
        let mut inner = self.inner.lock();
        inner.calls.push(StorageCall::Delete {
            bucket: object.bucket.clone(),
            key: object.key.clone(),
        });
        match inner
            .objects
            .remove(&(object.bucket.clone(), object.key.clone()))
        {
            Some(_) => Ok(DeleteStatus::Deleted),
            None => Ok(DeleteStatus::NotFound),
        }
    }
}
