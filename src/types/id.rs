// ABOUTME: Registry identifiers tagged with the kind of resource they name.
// ABOUTME: Keeps template and operation ids apart and rejects blank ids from the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The kind of registry resource an [`Id`] names.
pub trait IdKind {
    /// Human name used in debug output and decode errors.
    const NAME: &'static str;
}

pub enum TemplateKind {}
pub enum OperationKind {}

impl IdKind for TemplateKind {
    const NAME: &'static str = "template";
}

impl IdKind for OperationKind {
    const NAME: &'static str = "operation";
}

/// An opaque registry identifier.
///
/// A `TemplateId` cannot be passed where an `OperationId` is expected, even
/// though both are plain strings on the wire. Ids decoded from API responses
/// or manifests are never blank.
#[must_use = "ids reference remote resources and should not be ignored"]
pub struct Id<K> {
    value: String,
    _kind: PhantomData<K>,
}

impl<K: IdKind> Id<K> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<K: IdKind> std::fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", K::NAME, self.value)
    }
}

impl<K: IdKind> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K> Eq for Id<K> {}

impl<K> PartialOrd for Id<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Id<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K> std::fmt::Display for Id<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value.trim().is_empty() {
            return Err(serde::de::Error::custom(format!("blank {} id", K::NAME)));
        }
        Ok(Self::new(value))
    }
}

pub type TemplateId = Id<TemplateKind>;
pub type OperationId = Id<OperationKind>;
