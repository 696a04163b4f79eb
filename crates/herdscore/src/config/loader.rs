use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::model::id::is_valid_device_id;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const ENV_DEVICE_ID: &str = "HERDSCORE_DEVICE_ID";
pub const ENV_DATA_DIR: &str = "HERDSCORE_DATA_DIR";

/// Loads a config file, applies environment overrides and validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config)?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parses and validates config JSON. Environment overrides are not applied.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// `HERDSCORE_DEVICE_ID` and `HERDSCORE_DATA_DIR` take precedence over the file.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(ENV_DEVICE_ID) {
        let value = value.trim().to_string();
        if !is_valid_device_id(&value) {
            return Err(ConfigError::InvalidOverride {
                name: ENV_DEVICE_ID,
                value,
                reason: "expected 2 to 16 ASCII letters or digits".to_string(),
            });
        }
        config.device_id = Some(value);
    }

    if let Ok(value) = std::env::var(ENV_DATA_DIR) {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidOverride {
                name: ENV_DATA_DIR,
                value,
                reason: "path is empty".to_string(),
            });
        }
        config.data_directory = Some(value);
    }

    Ok(())
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if let Some(device_id) = &config.device_id {
        if !is_valid_device_id(device_id) {
            return Err(ConfigError::Validation {
                message: format!("Invalid device id: {}", device_id),
            });
        }
    }

    if config.sync.base_backoff_secs > config.sync.max_backoff_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "sync.base_backoff_secs ({}) exceeds sync.max_backoff_secs ({})",
                config.sync.base_backoff_secs, config.sync.max_backoff_secs
            ),
        });
    }

    let mut categories = HashSet::new();
    for standard in &config.standards {
        if !categories.insert(standard.category.trim().to_lowercase()) {
            return Err(ConfigError::InvalidStandard {
                category: standard.category.clone(),
                reason: "Duplicate category".to_string(),
            });
        }
        standard
            .validate()
            .map_err(|reason| ConfigError::InvalidStandard {
                category: standard.category.clone(),
                reason,
            })?;
    }

    if let Some(fallback) = &config.fallback_standard {
        fallback
            .validate()
            .map_err(|reason| ConfigError::InvalidStandard {
                category: fallback.category.clone(),
                reason,
            })?;
    }

    Ok(())
}
