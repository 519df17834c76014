/// The `error` module defines `ConfigError`, the error returned by every
/// fallible load, migration and save operation in this crate.
pub mod error;

/// The `filesystem` module provides helpers for creating configuration
/// folders, expanding `~` in paths, and reading and atomically writing files.
pub mod filesystem;

/// The `resources` module describes where bundled default configuration files
/// come from: a directory on disk or bytes embedded in the binary.
pub mod resources;

/// The `plugin` module holds `PluginContext`, the owning plugin's name, data
/// folder and bundled resources.
pub mod plugin;

/// The `node` module implements the in-memory configuration tree, addressed
/// by dotted paths, including the `config-version` schema marker.
pub mod node;

/// The `loader` module reads and writes configuration trees as YAML or JSON.
pub mod loader;

/// The `transformation` module applies versioned schema migrations to
/// configuration trees.
pub mod transformation;

/// The `config_file` module ties a structured config file together: default
/// copy, load, migration and typed value extraction.
pub mod config_file;

/// The `flat` module provides a simple key-value YAML configuration file with
/// bundled defaults.
pub mod flat;

#[cfg(test)]
mod test_support;

pub use config_file::{ConfigFile, ConfigSchema};
pub use error::{ConfigError, Result};
pub use flat::{FlatConfig, FlatConfigFile};
pub use loader::{Format, LoaderOptions, TreeLoader};
pub use node::{ConfigNode, NodePath, VERSION_KEY};
pub use plugin::PluginContext;
pub use resources::{DirectoryResources, EmbeddedResources, ResourceSource};
pub use transformation::{SchemaUpdate, Transformation, VersionStamp, VersionedMigrationSet};
