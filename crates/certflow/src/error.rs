use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum CertflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Config does not match schema: {errors}")]
    SchemaValidation { errors: String },
}

/// Fieldless view of [`LifecycleError`] for callers that map errors to
/// their own transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    TerminalStateViolation,
    InvalidTransition,
    Conflict,
    Forbidden,
    PreconditionFailed,
    Storage,
}

/// Errors returned by lifecycle operations. Every variant except
/// `Database` is a validation outcome; all of them roll the enclosing
/// transaction back.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' is in terminal status {status}")]
    TerminalStateViolation {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("{entity} '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Conflict on {entity} '{id}': {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("Actor '{actor}' is not permitted to {action}")]
    Forbidden { actor: String, action: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::NotFound { .. } => ErrorKind::NotFound,
            LifecycleError::TerminalStateViolation { .. } => ErrorKind::TerminalStateViolation,
            LifecycleError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            LifecycleError::Conflict { .. } => ErrorKind::Conflict,
            LifecycleError::Forbidden { .. } => ErrorKind::Forbidden,
            LifecycleError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            LifecycleError::Database(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, CertflowError>;
