use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::filesystem;
use crate::loader::{Format, LoaderOptions, TreeLoader};
use crate::node::ConfigNode;
use crate::plugin::PluginContext;
use crate::transformation::Transformation;

/// Per-file behaviour plugged into a [`ConfigFile`].
pub trait ConfigSchema {
    /// Typed values read out of the tree after every (re)load.
    type Values;

    fn format(&self) -> Format {
        Format::Yaml
    }

    fn loader_options(&self) -> LoaderOptions {
        LoaderOptions::default()
    }

    /// The migration policy for this file, if it is versioned.
    fn transformation(&self) -> Option<&dyn Transformation> {
        None
    }

    fn extract_values(&self, node: &ConfigNode) -> Result<Self::Values>;
}

/// One structured configuration file: its default copy, its tree, its
/// schema migrations and the typed values read from it.
pub struct ConfigFile<S: ConfigSchema> {
    plugin: PluginContext,
    file_name: String,
    loader: TreeLoader,
    schema: S,
    node: ConfigNode,
    values: S::Values,
}

impl<S: ConfigSchema> ConfigFile<S> {
    /// Opens `<data folder>/<folder>/<file_name>`, copying the bundled
    /// `<resource_path><file_name>` into place first if the file is missing,
    /// then loads, migrates and extracts values.
    ///
    /// A versioned schema always stamps a freshly copied default, which saves
    /// it, and YAML comments do not survive a save. Put notes meant for users
    /// in [`LoaderOptions::header`] rather than in the bundled file.
    ///
    /// # Errors
    ///
    /// Any load, migration, save or extraction failure is returned: a file
    /// that cannot reach a valid state must not be used.
    pub fn open(
        plugin: &PluginContext,
        resource_path: &str,
        file_name: &str,
        folder: &str,
        schema: S,
    ) -> Result<Self> {
        let folder = plugin.folder(folder);
        let file = folder.join(file_name);
        save_default_file(plugin, &format!("{resource_path}{file_name}"), &folder, &file);

        let loader = TreeLoader::new(&file, schema.format(), schema.loader_options());
        let (node, values) = load(&loader, &schema)?;

        tracing::info!(plugin = %plugin.name(), "Loading {}", file_name);
        Ok(Self {
            plugin: plugin.clone(),
            file_name: file_name.to_string(),
            loader,
            schema,
            node,
            values,
        })
    }

    /// Reloads, migrates and re-extracts. On error nothing is replaced.
    pub fn try_reload(&mut self) -> Result<()> {
        let (node, values) = load(&self.loader, &self.schema)?;
        self.node = node;
        self.values = values;
        Ok(())
    }

    /// Reloads the file, keeping the previous values if that fails.
    ///
    /// Returns whether the reload succeeded; failures are logged.
    pub fn reload_config(&mut self) -> bool {
        match self.try_reload() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(plugin = %self.plugin.name(), "{}", e);
                false
            }
        }
    }

    pub fn values(&self) -> &S::Values {
        &self.values
    }

    pub fn node(&self) -> &ConfigNode {
        &self.node
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_path(&self) -> &Path {
        self.loader.path()
    }
}

/// Creates `folder` and copies the bundled default to `file` if it is absent.
/// Failures are logged; later loads surface any lasting problem.
pub(crate) fn save_default_file(plugin: &PluginContext, resource: &str, folder: &Path, file: &Path) {
    if filesystem::file_exists(file) {
        return;
    }
    if let Err(e) = filesystem::create_if_not_exists(folder, true) {
        tracing::warn!(plugin = %plugin.name(), "Failed to create configuration folder: {} ({})", folder.display(), e);
    }
    match plugin.save_resource(resource, file) {
        Ok(_) => {}
        Err(ConfigError::ResourceNotFound(resource)) => {
            tracing::warn!(plugin = %plugin.name(), "No bundled default for {}", resource);
        }
        Err(e) => {
            tracing::warn!(plugin = %plugin.name(), "Failed to save default configuration {}: {}", file.display(), e);
        }
    }
}

fn load<S: ConfigSchema>(loader: &TreeLoader, schema: &S) -> Result<(ConfigNode, S::Values)> {
    let mut node = loader.load()?;
    if let Some(transformation) = schema.transformation() {
        let migrated = transformation.update_node(node.clone())?;
        // Only rewrite the file when migration changed something, so comments
        // in an up-to-date document survive.
        if migrated != node {
            loader.save(&migrated)?;
            node = loader.load()?;
        }
    }
    let values = schema.extract_values(&node)?;
    Ok((node, values))
}
