// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Zones and phantom-typed registry identifiers.

mod id;
mod zone;

pub use id::{Id, IdKind, OperationId, OperationKind, TemplateId, TemplateKind};
pub use zone::{Zone, ZoneError};

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// The resource existed and was removed.
    Deleted,
    /// The resource was already gone.
    NotFound,
}
