// ABOUTME: Metadata of the template to create from the uploaded image.
// ABOUTME: Maps config options to the registry's TemplateSpec.

use serde::Deserialize;

use super::deserialize::deserialize_non_blank;
use crate::registry::{BootMode, TemplateSpec};

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(deserialize_with = "deserialize_non_blank")]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Default login user of instances created from the template.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub boot_mode: BootMode,

    #[serde(default)]
    pub disable_password: bool,

    #[serde(default)]
    pub disable_sshkey: bool,

    #[serde(default)]
    pub build: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub maintainer: Option<String>,
}

impl TemplateConfig {
    /// Registry request for an image whose MD5 is `checksum`.
    pub fn spec(&self, checksum: impl Into<String>) -> TemplateSpec {
        TemplateSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            checksum: checksum.into(),
            default_user: self.username.clone(),
            boot_mode: self.boot_mode,
            password_enabled: !self.disable_password,
            ssh_key_enabled: !self.disable_sshkey,
            build: self.build.clone(),
            version: self.version.clone(),
            maintainer: self.maintainer.clone(),
        }
    }
}
