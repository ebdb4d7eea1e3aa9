// ABOUTME: Typed state threaded through the publish steps.
// ABOUTME: Accumulates the staged object, checksum, and published image records.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::artifact::SourceImage;
use crate::registry::ImageRecord;
use crate::storage::ObjectRef;
use crate::ui::Ui;

/// Generated-data keys written during a run.
pub mod keys {
    pub const PUBLISH_RUN_ID: &str = "PublishRunId";
    pub const SOURCE_OBJECT: &str = "SourceObject";
    pub const SOURCE_CHECKSUM: &str = "SourceChecksum";
    pub const TEMPLATE_NAME: &str = "TemplateName";
    pub const HOME_ZONE: &str = "HomeZone";
    pub const PUBLISHED_AT: &str = "PublishedAt";
}

/// State of one publish run. Mutated by one step at a time.
pub struct PublishState {
    /// Unique per run; namespaces the uploaded object.
    pub run_id: Uuid,
    pub source: SourceImage,
    pub ui: Arc<dyn Ui>,
    /// Set once the upload has completed.
    pub object: Option<ObjectRef>,
    /// MD5 of the source image, hex encoded.
    pub checksum: Option<String>,
    /// Home-zone record first, then copies in zone order.
    pub images: Vec<ImageRecord>,
    pub generated_data: BTreeMap<String, String>,
}

impl PublishState {
    pub fn new(run_id: Uuid, source: SourceImage, ui: Arc<dyn Ui>) -> Self {
        let mut generated_data = BTreeMap::new();
        generated_data.insert(keys::PUBLISH_RUN_ID.to_string(), run_id.to_string());
        Self {
            run_id,
            source,
            ui,
            object: None,
            checksum: None,
            images: Vec::new(),
            generated_data,
        }
    }
}

impl std::fmt::Debug for PublishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishState")
            .field("run_id", &self.run_id)
            .field("source", &self.source)
            .field("object", &self.object)
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}
