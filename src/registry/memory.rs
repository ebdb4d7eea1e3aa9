// ABOUTME: In-memory template registry with a call log and failure injection.
// ABOUTME: Backs dry runs and lets tests observe every register, copy, and delete.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{ImageRecord, PendingTemplate, RegistryError, TemplateRegistry, TemplateSpec};
use crate::storage::ObjectRef;
use crate::types::{DeleteStatus, TemplateId, Zone};

/// A call made against [`MemoryRegistry`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Register { zone: Zone },
    Copy { from: Zone, to: Zone },
    Delete { id: TemplateId, zone: Zone },
}

#[derive(Debug, Default)]
struct Inner {
    templates: BTreeMap<TemplateId, ImageRecord>,
    next_id: u64,
    calls: Vec<RegistryCall>,
    fail_register: Option<String>,
    fail_copy: HashMap<Zone, String>,
    fail_delete: HashMap<Zone, String>,
    stall_completion: HashSet<Zone>,
    hang_requests: HashSet<Zone>,
}

impl Inner {
    fn mint(&mut self, zone: &Zone, name: &str, checksum: Option<&str>) -> ImageRecord {
        self.next_id += 1;
        let id = TemplateId::new(format!("tpl-{:04}", self.next_id));
        let mut record = ImageRecord::new(id, zone.clone(), name).with_created_at(Utc::now());
        if let Some(checksum) = checksum {
            record = record.with_checksum(checksum);
        }
        self.templates.insert(record.id().clone(), record.clone());
        record
    }
}

/// Template registry kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent registration fail as rejected.
    pub fn fail_register(&self, reason: impl Into<String>) {
        self.inner.lock().fail_register = Some(reason.into());
    }

    /// Make copies into `zone` fail as rejected.
    pub fn fail_copy_to(&self, zone: Zone, reason: impl Into<String>) {
        self.inner.lock().fail_copy.insert(zone, reason.into());
    }

    /// Make deletes of templates in `zone` fail with a transient error.
    pub fn fail_delete_in(&self, zone: Zone, reason: impl Into<String>) {
        self.inner.lock().fail_delete.insert(zone, reason.into());
    }

    /// Templates created in `zone` are assigned an id but never finish.
    pub fn stall_completion_in(&self, zone: Zone) {
        self.inner.lock().stall_completion.insert(zone);
    }

    /// Requests creating a template in `zone` never get an answer.
    pub fn hang_requests_to(&self, zone: Zone) {
        self.inner.lock().hang_requests.insert(zone);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.inner.lock().calls.clone()
    }

    pub fn register_count(&self) -> usize {
        self.count(|call| matches!(call, RegistryCall::Register { .. }))
    }

    pub fn copy_count(&self) -> usize {
        self.count(|call| matches!(call, RegistryCall::Copy { .. }))
    }

    pub fn delete_count(&self) -> usize {
        self.count(|call| matches!(call, RegistryCall::Delete { .. }))
    }

    /// Zones of delete calls, in call order.
    pub fn deleted_zones(&self) -> Vec<Zone> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RegistryCall::Delete { zone, .. } => Some(zone.clone()),
                _ => None,
            })
            .collect()
    }

    /// Templates that currently exist.
    pub fn templates(&self) -> Vec<ImageRecord> {
        self.inner.lock().templates.values().cloned().collect()
    }

    pub fn contains(&self, id: &TemplateId) -> bool {
        self.inner.lock().templates.contains_key(id)
    }

    fn count(&self, pred: impl Fn(&RegistryCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| pred(call)).count()
    }
}

#[async_trait]
impl TemplateRegistry for MemoryRegistry {
    async fn start_register(
        &self,
        zone: &Zone,
        _source: &ObjectRef,
        spec: &TemplateSpec,
    ) -> Result<PendingTemplate, RegistryError> {
        let hang = {
            let mut inner = self.inner.lock();
            inner.calls.push(RegistryCall::Register { zone: zone.clone() });
            if let Some(reason) = inner.fail_register.clone() {
                return Err(RegistryError::Rejected(reason));
            }
            inner.hang_requests.contains(zone)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock();
        let record = inner.mint(zone, &spec.name, Some(&spec.checksum));
        Ok(PendingTemplate::new(record))
    }

    async fn start_copy(
        &self,
        template: &ImageRecord,
        target: &Zone,
    ) -> Result<PendingTemplate, RegistryError> {
        let hang = {
            let mut inner = self.inner.lock();
            inner.calls.push(RegistryCall::Copy {
                from: template.zone().clone(),
                to: target.clone(),
            });
            if let Some(reason) = inner.fail_copy.get(target).cloned() {
                return Err(RegistryError::Rejected(reason));
            }
            if !inner.templates.contains_key(template.id()) {
                return Err(RegistryError::NotFound(template.id().to_string()));
            }
            inner.hang_requests.contains(target)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock();
        let record = inner.mint(target, template.name(), template.checksum());
        Ok(PendingTemplate::new(record))
    }

    async fn wait(&self, pending: &PendingTemplate) -> Result<ImageRecord, RegistryError> {
        let record = pending.record();
        let stall = self.inner.lock().stall_completion.contains(record.zone());
        if stall {
            std::future::pending::<()>().await;
        }
        self.inner
            .lock()
            .templates
            .get(record.id())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(record.id().to_string()))
    }

    async fn delete(&self, template: &ImageRecord) -> Result<DeleteStatus, RegistryError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RegistryCall::Delete {
            id: template.id().clone(),
            zone: template.zone().clone(),
        });
        if let Some(reason) = inner.fail_delete.get(template.zone()).cloned() {
            return Err(RegistryError::Transient(reason));
        }
        match inner.templates.remove(template.id()) {
            Some(_) => Ok(DeleteStatus::Deleted),
            None => Ok(DeleteStatus::NotFound),
        }
    }
}
