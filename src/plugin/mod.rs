use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::filesystem::{self, FilesystemError, WriteOptions};
use crate::resources::ResourceSource;

/// The owning plugin as seen by its configuration files: a name for log
/// output, the data folder all config folders live under, and the bundle of
/// default resources.
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    data_folder: PathBuf,
    resources: Arc<dyn ResourceSource>,
}

impl PluginContext {
    /// Creates a context. A leading `~` in `data_folder` is expanded to the
    /// home directory.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::EmptyPath` if `data_folder` is empty or
    /// cannot be expanded (e.g. `~other/plugins`), since every config folder
    /// would otherwise resolve against the working directory.
    pub fn new<R: ResourceSource + 'static>(name: &str, data_folder: &str, resources: R) -> Result<Self> {
        let expanded = filesystem::expand_home(data_folder);
        if expanded.as_os_str().is_empty() {
            return Err(FilesystemError::EmptyPath.into());
        }
        Ok(Self {
            name: name.to_string(),
            data_folder: expanded,
            resources: Arc::new(resources),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn resources(&self) -> &dyn ResourceSource {
        self.resources.as_ref()
    }

    /// Resolves a folder name relative to the data folder.
    pub fn folder(&self, folder: &str) -> PathBuf {
        if folder.is_empty() {
            self.data_folder.clone()
        } else {
            self.data_folder.join(folder)
        }
    }

    /// Copies the bundled resource at `resource` to `destination` unless the
    /// destination already exists.
    ///
    /// Returns `true` if a file was written.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ResourceNotFound` if nothing is bundled under
    /// `resource`, or an IO error if the copy fails.
    pub fn save_resource(&self, resource: &str, destination: &Path) -> Result<bool> {
        if filesystem::file_exists(destination) {
            return Ok(false);
        }
        let bytes = self
            .resources
            .resource(resource)?
            .ok_or_else(|| ConfigError::ResourceNotFound(resource.to_string()))?;
        match filesystem::write_file(destination, &bytes, WriteOptions { overwrite: false }) {
            Ok(()) => {}
            // Someone else created it between the check and the write.
            Err(FilesystemError::AlreadyExists(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(plugin = %self.name, "Copied default resource {} to {}", resource, destination.display());
        Ok(true)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("data_folder", &self.data_folder)
            .finish_non_exhaustive()
    }
}
