use std::io;
use thiserror::Error;

use crate::filesystem::FilesystemError;

/// Errors raised while loading, migrating or saving a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Wrapper for standard IO errors.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failure reported by the filesystem helpers.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A node on the way to `path` holds a value that cannot contain children.
    #[error("Expected {expected} at `{path}`")]
    TypeMismatch { path: String, expected: &'static str },
    /// YAML `.nan`/`.inf` cannot be held by the tree without losing it.
    #[error("Non-finite number at `{0}` is not supported")]
    NonFiniteNumber(String),
    /// The `config-version` marker is present but not a non-negative integer.
    #[error("Invalid config-version marker: {0}")]
    InvalidVersion(String),
    #[error("Migration for version {0} is registered twice")]
    DuplicateMigration(u32),
    #[error("Migration for version {version} is not below the latest version {latest}")]
    MigrationOutOfRange { version: u32, latest: u32 },
    /// A migration action reported a failure.
    #[error("Migration from version {version} failed: {message}")]
    Migration { version: u32, message: String },
    #[error("Bundled resource not found: {0}")]
    ResourceNotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
