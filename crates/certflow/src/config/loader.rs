use std::path::{Path, PathBuf};

use crate::config::schema::CertflowConfig;
use crate::error::ConfigError;

/// Overrides `database.path` when set.
pub const DATABASE_PATH_ENV: &str = "CERTFLOW_DATABASE_PATH";

const SCHEMA_JSON: &str = include_str!("../../../../schema/certflow-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CertflowConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<CertflowConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: CertflowConfig = serde_json::from_value(json_value)?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
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

fn apply_env_overrides(config: &mut CertflowConfig) {
    if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
        if !path.trim().is_empty() {
            log::debug!("Database path overridden by {}", DATABASE_PATH_ENV);
            config.database.path = Some(PathBuf::from(path));
        }
    }
}

pub fn validate_config(config: &CertflowConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.database.busy_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "database.busyTimeoutMs must be greater than zero".to_string(),
        });
    }

    if let Some(path) = &config.database.path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "database.path must not be empty".to_string(),
            });
        }
    }

    if config.events.channel_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "events.channelCapacity must be greater than zero".to_string(),
        });
    }

    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "logging.level must not be empty".to_string(),
        });
    }

    Ok(())
}
