// ABOUTME: Publish command implementation.
// ABOUTME: Runs the publish pipeline and optionally records a manifest.

use super::backends;
use std::path::PathBuf;
use std::sync::Arc;
use templify::artifact::LocalArtifact;
use templify::config::Config;
use templify::error::{Error, Result};
use templify::output::Output;
use templify::pipeline::ConfirmPause;
use templify::publish::Publisher;
use tokio_util::sync::CancellationToken;

pub struct PublishRequest {
    pub builder_id: String,
    pub files: Vec<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub dry_run: bool,
    pub debug: bool,
}

pub async fn publish(
    config: &Config,
    request: PublishRequest,
    mut output: Output,
    cancel: &CancellationToken,
) -> Result<()> {
    output.start_timer();
    let output = Arc::new(output);

    let capabilities = if request.dry_run {
        output.progress("Dry run: using in-memory storage and registry");
        backends::in_memory()
    } else {
        backends::exoscale(config)?
    };

    output.progress(&format!(
        "Publishing template {:?} to {} zone(s)",
        config.template.name,
        config.zones.len()
    ));

    let mut publisher = Publisher::new(config, capabilities).with_ui(output.clone());
    if request.debug {
        publisher = publisher.with_pause(Arc::new(ConfirmPause::new(output.clone())));
    }

    let artifact = LocalArtifact::new(request.builder_id, request.files);
    let result = publisher.run(&artifact, cancel).await?;

    if let Some(path) = request.manifest {
        let json = result.to_manifest().map_err(|source| Error::Manifest {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json)?;
        output.progress(&format!("Manifest written to {}", path.display()));
    }

    output.success(&result.to_string());
    Ok(())
}
