//! Versioned schema migrations for configuration trees.
//!
//! A document records the schema revision it satisfies in its
//! `config-version` field. A [`Transformation`] declares the latest revision
//! and builds a [`VersionedMigrationSet`]: one action per source version,
//! each moving the tree from `N` to `N + 1`. Applying the set runs every
//! action from the document's current version up to the latest, in order,
//! and stamps the new version after each step.

use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};
use crate::node::ConfigNode;

/// Moves a tree from one source version to the next.
pub type MigrationAction = Box<dyn Fn(&mut ConfigNode) -> Result<()> + Send + Sync>;

/// Versions observed before and after a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaUpdate {
    pub from: u32,
    pub to: u32,
}

impl SchemaUpdate {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// The ordered migration actions of one config type plus its latest version.
pub struct VersionedMigrationSet {
    latest: u32,
    actions: BTreeMap<u32, MigrationAction>,
}

impl VersionedMigrationSet {
    pub fn builder(latest: u32) -> VersionedMigrationSetBuilder {
        VersionedMigrationSetBuilder {
            latest,
            actions: BTreeMap::new(),
            error: None,
        }
    }

    pub fn latest_version(&self) -> u32 {
        self.latest
    }

    /// Source versions that have an action, ascending.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.actions.keys().copied()
    }

    /// The version of `node`, treating a missing marker as 0.
    pub fn version(&self, node: &ConfigNode) -> Result<u32> {
        Ok(node.version()?.unwrap_or(0))
    }

    /// Brings `node` up to the latest version.
    ///
    /// A tree without a marker is first stamped with version 0; a tree that
    /// already carries one keeps it. Every action whose source version lies in
    /// `[current, latest)` then runs once, in increasing order, followed by
    /// writing `source + 1` as the new marker. Versions without an action only
    /// advance the marker.
    ///
    /// The work happens on a copy: if any step fails, `node` is left exactly
    /// as it was and the error is returned.
    pub fn apply(&self, node: &mut ConfigNode) -> Result<SchemaUpdate> {
        let mut working = node.clone();
        let start = match working.version()? {
            Some(version) => version,
            None => {
                working.set_version(0)?;
                0
            }
        };

        if start > self.latest {
            tracing::warn!(
                "Config schema version {} is newer than the latest known version {}; leaving it untouched",
                start,
                self.latest
            );
            return Ok(SchemaUpdate { from: start, to: start });
        }

        for version in start..self.latest {
            if let Some(action) = self.actions.get(&version) {
                action(&mut working).map_err(|e| match e {
                    ConfigError::Migration { .. } => e,
                    other => ConfigError::Migration {
                        version,
                        message: other.to_string(),
                    },
                })?;
            }
            working.set_version(version + 1)?;
        }

        *node = working;
        Ok(SchemaUpdate {
            from: start,
            to: self.latest,
        })
    }
}

/// Collects migration actions; misconfigurations surface from [`build`](Self::build).
pub struct VersionedMigrationSetBuilder {
    latest: u32,
    actions: BTreeMap<u32, MigrationAction>,
    error: Option<ConfigError>,
}

impl VersionedMigrationSetBuilder {
    /// Registers the action that migrates a tree from `source` to `source + 1`.
    pub fn add_action<F>(mut self, source: u32, action: F) -> Self
    where
        F: Fn(&mut ConfigNode) -> Result<()> + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        if source >= self.latest {
            self.error = Some(ConfigError::MigrationOutOfRange {
                version: source,
                latest: self.latest,
            });
        } else if self.actions.contains_key(&source) {
            self.error = Some(ConfigError::DuplicateMigration(source));
        } else {
            self.actions.insert(source, Box::new(action));
        }
        self
    }

    /// # Errors
    ///
    /// Returns the first registration error: an action registered twice for the
    /// same source version, or one whose source is not below the latest version.
    pub fn build(self) -> Result<VersionedMigrationSet> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(VersionedMigrationSet {
                latest: self.latest,
                actions: self.actions,
            }),
        }
    }
}

/// Schema migration policy of one config type.
pub trait Transformation {
    /// The version a migrated document ends up at.
    fn latest_version(&self) -> u32;

    /// Builds the migration set, usually starting from
    /// `VersionedMigrationSet::builder(self.latest_version())`.
    fn create(&self) -> Result<VersionedMigrationSet>;

    /// Migrates `node` to the latest version and returns it.
    ///
    /// Virtual nodes are returned untouched. A version change is logged at
    /// info level; an already-current document logs nothing.
    fn update_node(&self, mut node: ConfigNode) -> Result<ConfigNode> {
        if node.is_virtual() {
            return Ok(node);
        }
        let migrations = self.create()?;
        let update = migrations.apply(&mut node)?;
        if update.changed() {
            tracing::info!("Updated config schema from {} to {}", update.from, update.to);
        }
        Ok(node)
    }
}

/// A transformation with no migrations: stamps `config-version: 0` on
/// documents that lack a marker and otherwise leaves them alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionStamp;

impl Transformation for VersionStamp {
    fn latest_version(&self) -> u32 {
        0
    }

    fn create(&self) -> Result<VersionedMigrationSet> {
        VersionedMigrationSet::builder(0).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::VERSION_KEY;
    use crate::test_support::capture_logs;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Three revisions: `name` was renamed to `title` (1 -> 2), then a
    /// `limits.max` default was added (2 -> 3). Version 0 has no action.
    struct Renames {
        calls: Arc<Mutex<Vec<u32>>>,
        fail_at: Option<u32>,
    }

    impl Renames {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                fail_at: None,
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transformation for Renames {
        fn latest_version(&self) -> u32 {
            3
        }

        fn create(&self) -> Result<VersionedMigrationSet> {
            let (one, two) = (self.calls.clone(), self.calls.clone());
            let fail_at = self.fail_at;
            VersionedMigrationSet::builder(self.latest_version())
                .add_action(1, move |node| {
                    one.lock().unwrap().push(1);
                    node.move_node("name", "title")?;
                    Ok(())
                })
                .add_action(2, move |node| {
                    two.lock().unwrap().push(2);
                    if fail_at == Some(2) {
                        return Err(ConfigError::Migration {
                            version: 2,
                            message: "disk full".to_string(),
                        });
                    }
                    node.set("limits.max", 10)
                })
                .build()
        }
    }

    #[test]
    fn migrates_from_version_one_to_latest_in_order() {
        let transformation = Renames::new();
        let node = ConfigNode::from_value(json!({ VERSION_KEY: 1, "name": "demo" }));

        let (result, logs) = capture_logs(|| transformation.update_node(node));
        let node = result.unwrap();

        assert_eq!(transformation.calls(), vec![1, 2]);
        assert_eq!(node.version().unwrap(), Some(3));
        assert_eq!(node.get::<String, _>("title").unwrap().as_deref(), Some("demo"));
        assert_eq!(node.get::<u32, _>("limits.max").unwrap(), Some(10));
        assert!(logs.contains("Updated config schema from 1 to 3"));
    }

    #[test]
    fn second_application_is_a_silent_no_op() {
        let transformation = Renames::new();
        let node = ConfigNode::from_value(json!({ VERSION_KEY: 1, "name": "demo" }));
        let once = transformation.update_node(node).unwrap();

        let (twice, logs) = capture_logs(|| transformation.update_node(once.clone()));
        assert_eq!(twice.unwrap(), once);
        assert_eq!(transformation.calls(), vec![1, 2]);
        assert!(!logs.contains("Updated config schema"));
    }

    #[test]
    fn virtual_node_is_not_migrated() {
        let transformation = Renames::new();
        let node = transformation.update_node(ConfigNode::virtual_node()).unwrap();
        assert!(node.is_virtual());
        assert!(transformation.calls().is_empty());
    }

    #[test]
    fn missing_marker_counts_as_version_zero() {
        let transformation = Renames::new();
        let node = ConfigNode::from_value(json!({ "name": "demo" }));
        let migrations = transformation.create().unwrap();
        assert_eq!(migrations.version(&node).unwrap(), 0);

        let (result, logs) = capture_logs(|| transformation.update_node(node));
        assert_eq!(result.unwrap().version().unwrap(), Some(3));
        assert_eq!(transformation.calls(), vec![1, 2]);
        assert!(logs.contains("Updated config schema from 0 to 3"));
    }

    #[test]
    fn version_stamp_marks_fresh_documents_without_logging() {
        let node = ConfigNode::from_value(json!({ "motd": "hi" }));
        let (result, logs) = capture_logs(|| VersionStamp.update_node(node));
        let node = result.unwrap();
        assert_eq!(node.version().unwrap(), Some(0));
        assert!(logs.is_empty());
    }

    #[test]
    fn initial_stamp_keeps_existing_marker() {
        let node = ConfigNode::from_value(json!({ VERSION_KEY: 5 }));
        let node = VersionStamp.update_node(node).unwrap();
        assert_eq!(node.version().unwrap(), Some(5));
    }

    #[test]
    fn current_document_is_left_alone() {
        let transformation = Renames::new();
        let node = ConfigNode::from_value(json!({ VERSION_KEY: 3, "title": "demo" }));
        let (result, logs) = capture_logs(|| transformation.update_node(node.clone()));
        assert_eq!(result.unwrap(), node);
        assert!(transformation.calls().is_empty());
        assert!(logs.is_empty());
    }

    #[test]
    fn failed_step_leaves_tree_untouched() {
        let transformation = Renames {
            fail_at: Some(2),
            ..Renames::new()
        };
        let mut node = ConfigNode::from_value(json!({ VERSION_KEY: 1, "name": "demo" }));
        let before = node.clone();

        let err = transformation.create().unwrap().apply(&mut node).unwrap_err();
        assert!(matches!(err, ConfigError::Migration { version: 2, .. }));
        assert_eq!(node, before);
        assert_eq!(transformation.calls(), vec![1, 2]);
    }

    #[test]
    fn action_errors_are_reported_with_their_source_version() {
        let migrations = VersionedMigrationSet::builder(2)
            .add_action(1, |node| node.set("motd.colour", "red"))
            .build()
            .unwrap();
        let mut node = ConfigNode::from_value(json!({ VERSION_KEY: 1, "motd": "hi" }));
        let err = migrations.apply(&mut node).unwrap_err();
        assert!(matches!(err, ConfigError::Migration { version: 1, .. }));
        assert_eq!(node.version().unwrap(), Some(1));
    }

    #[test]
    fn versions_without_actions_only_advance_the_marker() {
        let migrations = VersionedMigrationSet::builder(4)
            .add_action(2, |node| node.set("added", true))
            .build()
            .unwrap();
        let mut node = ConfigNode::from_value(json!({ VERSION_KEY: 0 }));
        let update = migrations.apply(&mut node).unwrap();
        assert_eq!(update, SchemaUpdate { from: 0, to: 4 });
        assert_eq!(node.get::<bool, _>("added").unwrap(), Some(true));
        assert_eq!(migrations.versions().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn newer_documents_are_not_downgraded() {
        let migrations = VersionedMigrationSet::builder(2).build().unwrap();
        let mut node = ConfigNode::from_value(json!({ VERSION_KEY: 7 }));
        let update = migrations.apply(&mut node).unwrap();
        assert!(!update.changed());
        assert_eq!(node.version().unwrap(), Some(7));
    }

    #[test]
    fn quoted_marker_is_migrated_from_its_value() {
        let transformation = Renames::new();
        let node = ConfigNode::from_value(json!({ VERSION_KEY: "2", "title": "demo" }));
        let node = transformation.update_node(node).unwrap();
        assert_eq!(transformation.calls(), vec![2]);
        assert_eq!(node.value(VERSION_KEY), Some(&json!(3)));
    }

    #[test]
    fn invalid_marker_aborts_migration() {
        let mut node = ConfigNode::from_value(json!({ VERSION_KEY: "latest" }));
        let migrations = VersionedMigrationSet::builder(1).build().unwrap();
        assert!(matches!(migrations.apply(&mut node), Err(ConfigError::InvalidVersion(_))));
    }

    #[test]
    fn duplicate_source_versions_are_rejected() {
        let result = VersionedMigrationSet::builder(3)
            .add_action(1, |_| Ok(()))
            .add_action(1, |_| Ok(()))
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateMigration(1))));
    }

    #[test]
    fn actions_at_or_past_latest_are_rejected() {
        let result = VersionedMigrationSet::builder(2).add_action(2, |_| Ok(())).build();
        assert!(matches!(
            result,
            Err(ConfigError::MigrationOutOfRange { version: 2, latest: 2 })
        ));
    }
}
