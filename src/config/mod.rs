// ABOUTME: Configuration types and parsing for templify.yml.
// ABOUTME: Handles YAML parsing, credential resolution, zones, and config discovery.

mod deserialize;
mod env_value;
mod init;
mod template;

pub use env_value::EnvValue;
pub use init::init_config;
pub use template::TemplateConfig;

use crate::error::{Error, Result};
use crate::types::Zone;
use deserialize::{deserialize_non_blank, deserialize_zones, first_duplicate};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "templify.yml";
pub const CONFIG_FILENAME_ALT: &str = "templify.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".templify/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_key: EnvValue,

    pub api_secret: EnvValue,

    #[serde(default = "default_api_environment")]
    pub api_environment: String,

    /// Overrides the compute API URL; `{zone}` is substituted.
    #[serde(default)]
    pub api_endpoint: Option<String>,

    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub api_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default)]
    pub sos_endpoint: Option<String>,

    #[serde(deserialize_with = "deserialize_non_blank")]
    pub bucket: String,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Home zone first, then the zones receiving copies.
    #[serde(deserialize_with = "deserialize_zones")]
    pub zones: NonEmpty<Zone>,

    pub template: TemplateConfig,
}

fn default_api_environment() -> String {
    "api".to_string()
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_key_prefix() -> String {
    "templify".to_string()
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Zone where the image is uploaded and registered.
    pub fn home_zone(&self) -> &Zone {
        &self.zones.head
    }

    /// Zones receiving copies, in publish order.
    pub fn additional_zones(&self) -> &[Zone] {
        &self.zones.tail
    }

    /// A zone listed twice, which parsing rejects but direct construction does not.
    pub fn duplicate_zone(&self) -> Option<&Zone> {
        first_duplicate(self.zones.iter())
    }

    /// Object storage URL, defaulting to the home zone's SOS endpoint.
    pub fn sos_endpoint(&self) -> String {
        self.sos_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sos-{}.exo.io", self.home_zone()))
    }

    /// Key prefix without surrounding slashes.
    pub fn key_prefix(&self) -> &str {
        self.key_prefix.trim_matches('/')
    }
}
