// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented templify.yml starter file.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE_YAML)?;
    Ok(())
}

pub(crate) const TEMPLATE_YAML: &str = r#"# Credentials: literal strings or { env: VAR, default: ... }
api_key:
  env: EXOSCALE_API_KEY
api_secret:
  env: EXOSCALE_API_SECRET

# The first zone hosts the bucket and the registered template.
# Remaining zones receive copies, in this order.
zones:
  - ch-gva-2
  - de-fra-1

bucket: my-templates
# key_prefix: templify
# api_timeout: 1h
# poll_interval: 3s
# sos_endpoint: https://sos-ch-gva-2.exo.io

template:
  name: my-template
  # description: Built by CI
  # username: debian
  # boot_mode: legacy
  # disable_password: false
  # disable_sshkey: false
  # build: ""
  # version: ""
  # maintainer: ""
"#;
