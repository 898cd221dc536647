//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Environment, IntakeConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV_VAR: &str = "LEAD_INTAKE_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, overlay environment secrets, and validate.
pub fn load_config(path: &Path) -> Result<IntakeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: IntakeConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load from `path` when given, otherwise from `LEAD_INTAKE_CONFIG`, otherwise
/// start from defaults. Environment overrides and validation apply in every case.
pub fn load_from_env(path: Option<&Path>) -> Result<IntakeConfig, ConfigError> {
    let env_path = std::env::var(CONFIG_PATH_ENV_VAR).ok();
    match path.or(env_path.as_deref().map(Path::new)) {
        Some(path) => load_config(path),
        None => {
            let mut config = IntakeConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

/// Overlay secrets and deployment settings from the environment.
///
/// Credentials are expected to come from the environment rather than the file.
pub fn apply_env_overrides<F>(config: &mut IntakeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("SITE_URL") {
        config.site.site_url = url;
    }
    if let Some(env) = get("APP_ENV").and_then(|v| Environment::from_env_value(&v)) {
        config.site.environment = env;
    }
    if let Some(url) = get("UPSTASH_REDIS_REST_URL") {
        config.rate_limit.redis_rest_url = Some(url);
    }
    if let Some(token) = get("UPSTASH_REDIS_REST_TOKEN") {
        config.rate_limit.redis_rest_token = Some(token);
    }
    if let Some(url) = get("LEAD_STORE_URL") {
        config.store.url = Some(url);
    }
    if let Some(key) = get("LEAD_STORE_API_KEY") {
        config.store.api_key = Some(key);
    }
    if let Some(token) = get("HUBSPOT_ACCESS_TOKEN") {
        config.crm.access_token = Some(token);
    }
}
