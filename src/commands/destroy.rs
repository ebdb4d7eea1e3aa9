// ABOUTME: Destroy command implementation.
// ABOUTME: Deletes every template listed in a publish manifest.

use super::backends;
use std::path::Path;
use templify::config::Config;
use templify::diagnostics::{Diagnostics, Warning};
use templify::error::{Error, Result};
use templify::output::Output;
use templify::publish::PublishResult;

/// Delete the manifest's templates. With no config, only list them.
pub async fn destroy(config: Option<&Config>, manifest: &Path, output: &Output) -> Result<()> {
    let content = std::fs::read_to_string(manifest)?;
    let result = PublishResult::from_manifest(&content).map_err(|source| Error::Manifest {
        path: manifest.to_path_buf(),
        source,
    })?;

    let Some(config) = config else {
        for image in result.images() {
            output.progress(&format!("Would delete template {image}"));
        }
        output.success(&format!(
            "Dry run: {} template(s) would be deleted",
            result.images().len()
        ));
        return Ok(());
    };

    let registry = backends::registry(config)?;
    let mut diag = Diagnostics::default();
    let report = result.destroy(&registry).await?;

    for image in &report.already_gone {
        diag.warn(Warning::already_deleted(format!(
            "template {image} was already deleted"
        )));
    }

    // Emit collected warnings
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.success(&format!("Deleted {} template(s)", report.deleted.len()));
    Ok(())
}
