// ABOUTME: Builds the storage and registry backends a command talks to.
// ABOUTME: Resolves credentials and tags every client with the templify user agent.

use std::sync::Arc;

use templify::config::Config;
use templify::error::Result;
use templify::publish::Capabilities;
use templify::registry::{ExoscaleConfig, ExoscaleRegistry, MemoryRegistry};
use templify::storage::{MemoryStorage, SosConfig, SosStorage};

fn user_agent() -> String {
    format!("templify/{}", env!("CARGO_PKG_VERSION"))
}

pub fn registry(config: &Config) -> Result<ExoscaleRegistry> {
    let registry = ExoscaleRegistry::new(ExoscaleConfig {
        api_key: config.api_key.resolve()?,
        api_secret: config.api_secret.resolve()?,
        environment: config.api_environment.clone(),
        endpoint: config.api_endpoint.clone(),
        timeout: config.api_timeout,
        poll_interval: config.poll_interval,
        user_agent: user_agent(),
    })?;
    Ok(registry)
}

pub fn exoscale(config: &Config) -> Result<Capabilities> {
    let storage = SosStorage::new(SosConfig {
        endpoint: config.sos_endpoint(),
        region: config.home_zone().to_string(),
        access_key: config.api_key.resolve()?,
        secret_key: config.api_secret.resolve()?,
        timeout: config.api_timeout,
        user_agent: user_agent(),
    })?;

    Ok(Capabilities {
        storage: Arc::new(storage),
        registry: Arc::new(registry(config)?),
    })
}

pub fn in_memory() -> Capabilities {
    Capabilities {
        storage: Arc::new(MemoryStorage::new()),
        registry: Arc::new(MemoryRegistry::new()),
    }
}
