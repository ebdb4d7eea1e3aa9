// ABOUTME: Diagnostics accumulator for non-fatal warnings during a publish run.
// ABOUTME: Collects cleanup and teardown problems that must not mask the run outcome.

/// Collects non-fatal warnings during publish operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a publish run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A step's compensating action failed; a remote resource may remain.
    pub fn cleanup_failed(step: &str, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CleanupFailed,
            message: format!("cleanup of {step} step failed: {}", message.into()),
        }
    }

    /// A resource was already gone when we tried to delete it.
    pub fn already_deleted(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::AlreadyDeleted,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Cleanup failed (object or template may remain).
    CleanupFailed,
    /// Delete targeted a resource that no longer exists.
    AlreadyDeleted,
}
