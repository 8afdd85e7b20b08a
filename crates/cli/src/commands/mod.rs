pub mod deps;
pub mod doctor;
pub mod example;
pub mod explain;
pub mod index;
pub mod init;
pub mod sections;

use cryslgen_config::{AppConfig, ConfigError};
use cryslgen_core::Provider;
use cryslgen_providers::build_from_config;
use std::path::Path;
use std::sync::Arc;

/// Load `path` when given, otherwise the usual lookup chain.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}

/// The provider named by `config.provider`.
pub fn provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let router = build_from_config(config);
    router.resolve(&config.provider).ok_or_else(|| {
        format!(
            "Unknown provider '{}'. Available: {}",
            config.provider,
            router.list().join(", ")
        )
        .into()
    })
}
