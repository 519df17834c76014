use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::config_file::save_default_file;
use crate::error::{ConfigError, Result};
use crate::filesystem::{self, WriteOptions};
use crate::plugin::PluginContext;

/// A flat YAML document addressed by dotted keys, with optional defaults
/// consulted when a key is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatConfig {
    values: Mapping,
    defaults: Option<Mapping>,
}

impl FlatConfig {
    /// Parses YAML text. Blank or comment-only text gives an empty document.
    ///
    /// # Errors
    ///
    /// Returns a YAML error for malformed text, or `TypeMismatch` if the
    /// document root is not a map.
    pub fn parse(text: &str) -> Result<Self> {
        let blank = text
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'));
        if blank {
            return Ok(Self::default());
        }
        match serde_yaml::from_str::<Value>(text)? {
            Value::Null => Ok(Self::default()),
            Value::Mapping(values) => Ok(Self { values, defaults: None }),
            _ => Err(ConfigError::TypeMismatch {
                path: String::new(),
                expected: "map at document root",
            }),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.values)?)
    }

    /// Returns the value at `path`, falling back to the defaults.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.values, path).or_else(|| self.defaults.as_ref().and_then(|d| lookup(d, path)))
    }

    /// Deserializes the value at `path`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path) {
            Some(value) => Ok(Some(serde_yaml::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Stores `value` at `path`, creating intermediate maps. A null value
    /// removes the key.
    pub fn set<T: Serialize>(&mut self, path: &str, value: T) -> Result<()> {
        let value = serde_yaml::to_value(value)?;
        let segments: Vec<&str> = path.split('.').collect();
        set_in(&mut self.values, &segments, 0, value)
    }

    pub fn defaults(&self) -> Option<&Mapping> {
        self.defaults.as_ref()
    }

    pub fn set_defaults(&mut self, defaults: Mapping) {
        self.defaults = Some(defaults);
    }

    /// Copies every default key missing from the document into it.
    pub fn copy_defaults(&mut self) {
        if let Some(defaults) = &self.defaults {
            merge_missing(&mut self.values, defaults);
        }
    }
}

fn lookup<'a>(map: &'a Mapping, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = current.as_mapping()?.get(segment)?;
    }
    if current.is_null() { None } else { Some(current) }
}

fn set_in(map: &mut Mapping, segments: &[&str], depth: usize, value: Value) -> Result<()> {
    let key = segments[depth];
    if depth + 1 == segments.len() {
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(Value::String(key.to_string()), value);
        }
        return Ok(());
    }
    match map.get_mut(key) {
        Some(Value::Mapping(child)) => set_in(child, segments, depth + 1, value),
        Some(_) => Err(ConfigError::TypeMismatch {
            path: segments[..=depth].join("."),
            expected: "map",
        }),
        None if value.is_null() => Ok(()),
        None => {
            let mut child = Mapping::new();
            set_in(&mut child, segments, depth + 1, value)?;
            map.insert(Value::String(key.to_string()), Value::Mapping(child));
            Ok(())
        }
    }
}

fn merge_missing(target: &mut Mapping, defaults: &Mapping) {
    for (key, default) in defaults {
        if let Some(existing) = target.get_mut(key) {
            if let (Value::Mapping(existing), Value::Mapping(nested)) = (existing, default) {
                merge_missing(existing, nested);
            }
        } else {
            target.insert(key.clone(), default.clone());
        }
    }
}

/// A flat YAML configuration file with a bundled default.
///
/// Nothing touches the disk until one of the load methods runs.
pub struct FlatConfigFile {
    plugin: PluginContext,
    resource: String,
    folder: PathBuf,
    file: PathBuf,
    config: Option<FlatConfig>,
    copy_defaults: bool,
}

impl FlatConfigFile {
    pub fn new(plugin: &PluginContext, resource_path: &str, file_name: &str, folder: &str) -> Self {
        let folder = plugin.folder(folder);
        Self {
            plugin: plugin.clone(),
            resource: format!("{resource_path}{file_name}"),
            file: folder.join(file_name),
            folder,
            config: None,
            copy_defaults: false,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Copies the bundled default into place if the file is missing, then
    /// reloads it.
    pub fn save_default_config(&mut self) -> bool {
        save_default_file(&self.plugin, &self.resource, &self.folder, &self.file);
        self.reload_config()
    }

    /// Loads the file, replacing the in-memory document. A missing file loads
    /// as an empty document.
    pub fn try_reload(&mut self) -> Result<()> {
        self.config = Some(self.read()?);
        Ok(())
    }

    /// Like [`try_reload`](Self::try_reload), but logs failures and keeps the
    /// previous document.
    pub fn reload_config(&mut self) -> bool {
        match self.try_reload() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(plugin = %self.plugin.name(), "Failed to load {}: {}", self.file.display(), e);
                false
            }
        }
    }

    /// Loads the file and attaches the bundled default as its defaults. With
    /// copy-defaults enabled, missing keys are copied into the document so the
    /// next save writes them.
    pub fn reload_default_config(&mut self) -> bool {
        let result = self.read().and_then(|mut config| {
            if let Some(bytes) = self.plugin.resources().resource(&self.resource)? {
                let text = String::from_utf8_lossy(&bytes);
                config.set_defaults(FlatConfig::parse(&text)?.values);
                if self.copy_defaults {
                    config.copy_defaults();
                }
            }
            Ok(config)
        });
        match result {
            Ok(config) => {
                self.config = Some(config);
                true
            }
            Err(e) => {
                tracing::error!(plugin = %self.plugin.name(), "Failed to reload default configuration: {}", e);
                false
            }
        }
    }

    /// Writes the in-memory document to disk.
    ///
    /// Returns `false` without writing if nothing has been loaded, or if the
    /// write fails; both are logged.
    pub fn save_config(&self) -> bool {
        let Some(config) = &self.config else {
            tracing::warn!(plugin = %self.plugin.name(), "Config file or configuration is not initialized.");
            return false;
        };
        let result = config.to_yaml_string().and_then(|text| {
            filesystem::write_file(&self.file, text.as_bytes(), WriteOptions::default())?;
            Ok(())
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    plugin = %self.plugin.name(),
                    "Failed to save configuration file: {}: {}",
                    self.file.display(),
                    e
                );
                false
            }
        }
    }

    /// The loaded document, loading it first if needed. If loading fails the
    /// document starts out empty.
    pub fn get_config(&mut self) -> &mut FlatConfig {
        if self.config.is_none() {
            self.reload_config();
        }
        self.config.get_or_insert_with(FlatConfig::default)
    }

    pub fn config(&self) -> Option<&FlatConfig> {
        self.config.as_ref()
    }

    pub fn is_copy_defaults(&self) -> bool {
        self.copy_defaults
    }

    pub fn set_copy_defaults(&mut self, copy_defaults: bool) {
        self.copy_defaults = copy_defaults;
    }

    fn read(&self) -> Result<FlatConfig> {
        match filesystem::read_optional(&self.file)? {
            Some(text) => FlatConfig::parse(&text),
            None => Ok(FlatConfig::default()),
        }
    }
}
