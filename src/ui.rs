// ABOUTME: User-facing progress sink consumed by the publish pipeline.
// ABOUTME: Implemented by the CLI output and by a silent sink for library use.

use async_trait::async_trait;

/// Receives progress messages and answers continue/abort prompts.
#[async_trait]
pub trait Ui: Send + Sync {
    /// Report progress.
    fn say(&self, message: &str);

    /// Report a problem that does not by itself stop the run.
    fn error(&self, message: &str);

    /// Ask whether to continue. Sinks that cannot ask answer yes.
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentUi;

impl Ui for SilentUi {
    fn say(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}
