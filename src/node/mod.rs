use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Name of the root-level field holding the schema version of a document.
pub const VERSION_KEY: &str = "config-version";

/// Address of a node inside a configuration tree.
///
/// Each segment is a map key, or an index when the parent node is a list.
/// The empty path addresses the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dotted path such as `"storage.mysql.port"`.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self {
            segments: dotted.split('.').map(str::to_string).collect(),
        }
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn split_last(&self) -> Option<(NodePath, &str)> {
        let (last, parent) = self.segments.split_last()?;
        Some((
            NodePath {
                segments: parent.to_vec(),
            },
            last.as_str(),
        ))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for NodePath {
    fn from(dotted: &str) -> Self {
        NodePath::parse(dotted)
    }
}

impl<const N: usize> From<[&str; N]> for NodePath {
    fn from(segments: [&str; N]) -> Self {
        Self {
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&NodePath> for NodePath {
    fn from(path: &NodePath) -> Self {
        path.clone()
    }
}

/// An in-memory configuration document.
///
/// A node is *virtual* while it holds no data at all, which is how a missing
/// or empty file loads. Writing any value makes it real. Changes stay in
/// memory until the document is saved through a [`crate::loader::TreeLoader`].
///
/// Map keys are always strings. A YAML key such as `1` or `true` loads as
/// `"1"` / `"true"` and is written back quoted if the document is saved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigNode {
    root: Value,
}

impl ConfigNode {
    /// A node with no backing data.
    pub fn virtual_node() -> Self {
        Self { root: Value::Null }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn is_virtual(&self) -> bool {
        self.root.is_null()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Returns the value at `path`. Explicit nulls count as absent.
    pub fn value<P: Into<NodePath>>(&self, path: P) -> Option<&Value> {
        let path = path.into();
        let mut current = &self.root;
        for segment in path.segments() {
            current = child(current, segment)?;
        }
        if current.is_null() { None } else { Some(current) }
    }

    pub fn contains<P: Into<NodePath>>(&self, path: P) -> bool {
        self.value(path).is_some()
    }

    /// Deserializes the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the stored value does not fit `T`.
    pub fn get<T: DeserializeOwned, P: Into<NodePath>>(&self, path: P) -> Result<Option<T>> {
        match self.value(path) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Like [`ConfigNode::get`], falling back to `default` when the node is absent.
    pub fn get_or<T: DeserializeOwned, P: Into<NodePath>>(&self, path: P, default: T) -> Result<T> {
        Ok(self.get(path)?.unwrap_or(default))
    }

    /// Serializes `value` and stores it at `path`, creating intermediate maps.
    ///
    /// Setting a value that serializes to null removes the node.
    ///
    /// # Errors
    ///
    /// Fails with `ConfigError::TypeMismatch` if a node along the path is a
    /// scalar or an index is out of bounds. The tree is unchanged on error.
    pub fn set<T: Serialize, P: Into<NodePath>>(&mut self, path: P, value: T) -> Result<()> {
        let path = path.into();
        let value = serde_json::to_value(value)?;
        if value.is_null() {
            self.remove(&path);
            return Ok(());
        }
        self.check_writable(&path)?;
        *self.slot_mut(&path)? = value;
        Ok(())
    }

    /// Removes and returns the value at `path`.
    pub fn remove<P: Into<NodePath>>(&mut self, path: P) -> Option<Value> {
        let path = path.into();
        let Some((parent, last)) = path.split_last() else {
            let old = std::mem::take(&mut self.root);
            return if old.is_null() { None } else { Some(old) };
        };
        let mut current = &mut self.root;
        for segment in parent.segments() {
            current = child_mut(current, segment)?;
        }
        let removed = match current {
            Value::Object(map) => map.remove(last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        };
        removed.filter(|v| !v.is_null())
    }

    /// Moves the value at `from` to `to`, replacing anything at `to`.
    ///
    /// Returns `false` if there was nothing at `from`.
    pub fn move_node<P: Into<NodePath>, Q: Into<NodePath>>(&mut self, from: P, to: Q) -> Result<bool> {
        let (from, to) = (from.into(), to.into());
        if from == to {
            return Ok(self.contains(&from));
        }
        let backup = self.root.clone();
        let Some(value) = self.remove(&from) else {
            return Ok(false);
        };
        if let Err(e) = self.set(&to, value) {
            self.root = backup;
            return Err(e);
        }
        Ok(true)
    }

    /// Reads the schema version marker. A quoted number such as `"2"` is
    /// accepted as that number.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidVersion` if the marker is not a
    /// non-negative integer that fits a `u32`.
    pub fn version(&self) -> Result<Option<u32>> {
        match self.value(VERSION_KEY) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u64>().ok()))
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidVersion(value.to_string())),
        }
    }

    pub fn set_version(&mut self, version: u32) -> Result<()> {
        self.set(VERSION_KEY, version)
    }

    fn check_writable(&self, path: &NodePath) -> Result<()> {
        let mut current = &self.root;
        let mut walked = NodePath::root();
        for segment in path.segments() {
            let next = match current {
                Value::Null => return Ok(()),
                Value::Object(map) => map.get(segment.as_str()),
                Value::Array(items) => {
                    let index = parse_index(segment, &walked)?;
                    if index > items.len() {
                        return Err(ConfigError::TypeMismatch {
                            path: walked.child(segment).to_string(),
                            expected: "index within list bounds",
                        });
                    }
                    items.get(index)
                }
                _ => {
                    return Err(ConfigError::TypeMismatch {
                        path: walked.to_string(),
                        expected: "map or list",
                    });
                }
            };
            match next {
                Some(value) => current = value,
                None => return Ok(()),
            }
            walked = walked.child(segment);
        }
        Ok(())
    }

    fn slot_mut(&mut self, path: &NodePath) -> Result<&mut Value> {
        let mut current = &mut self.root;
        let mut walked = NodePath::root();
        for segment in path.segments() {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
                Value::Array(items) => {
                    let index = parse_index(segment, &walked)?;
                    if index == items.len() {
                        items.push(Value::Null);
                    }
                    items.get_mut(index).ok_or_else(|| ConfigError::TypeMismatch {
                        path: walked.child(segment).to_string(),
                        expected: "index within list bounds",
                    })?
                }
                _ => {
                    return Err(ConfigError::TypeMismatch {
                        path: walked.to_string(),
                        expected: "map or list",
                    });
                }
            };
            walked = walked.child(segment);
        }
        Ok(current)
    }
}

fn parse_index(segment: &str, parent: &NodePath) -> Result<usize> {
    segment.parse::<usize>().map_err(|_| ConfigError::TypeMismatch {
        path: parent.child(segment).to_string(),
        expected: "list index",
    })
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ConfigNode {
        ConfigNode::from_value(json!({
            "storage": { "host": "localhost", "port": 3306 },
            "worlds": ["world", "world_nether"],
            "motd": "hello"
        }))
    }

    #[test]
    fn virtual_until_first_write() {
        let mut node = ConfigNode::virtual_node();
        assert!(node.is_virtual());
        node.set("a.b", 1).unwrap();
        assert!(!node.is_virtual());
        assert_eq!(node.root(), &json!({ "a": { "b": 1 } }));
    }

    #[test]
    fn reads_nested_values_and_list_entries() {
        let node = sample();
        assert_eq!(node.get::<u16, _>("storage.port").unwrap(), Some(3306));
        assert_eq!(node.get::<String, _>("worlds.1").unwrap().as_deref(), Some("world_nether"));
        assert_eq!(node.get::<String, _>("worlds.7").unwrap(), None);
        assert!(node.value("motd.length").is_none());
    }

    #[test]
    fn typed_get_reports_type_errors() {
        let node = sample();
        assert!(matches!(node.get::<u16, _>("motd"), Err(ConfigError::Json(_))));
        assert_eq!(node.get_or("missing", 5u8).unwrap(), 5);
    }

    #[test]
    fn set_rejects_paths_through_scalars_without_touching_tree() {
        let mut node = sample();
        let before = node.clone();
        let err = node.set("motd.colour", "red").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref path, .. } if path == "motd"));
        assert_eq!(node, before);
    }

    #[test]
    fn set_appends_at_list_end_and_rejects_gaps() {
        let mut node = sample();
        node.set("worlds.2", "world_the_end").unwrap();
        assert_eq!(node.get::<Vec<String>, _>("worlds").unwrap().unwrap().len(), 3);
        assert!(node.set("worlds.9", "far").is_err());
    }

    #[test]
    fn setting_null_removes_the_node() {
        let mut node = sample();
        node.set("motd", Option::<String>::None).unwrap();
        assert!(!node.contains("motd"));
    }

    #[test]
    fn move_node_relocates_subtrees() {
        let mut node = sample();
        assert!(node.move_node("storage", ["database", "mysql"]).unwrap());
        assert!(!node.contains("storage"));
        assert_eq!(node.get::<String, _>("database.mysql.host").unwrap().as_deref(), Some("localhost"));
        assert!(!node.move_node("storage", "elsewhere").unwrap());
    }

    #[test]
    fn move_node_restores_tree_when_target_is_invalid() {
        let mut node = sample();
        let before = node.clone();
        assert!(node.move_node("storage", "motd.inner").is_err());
        assert_eq!(node, before);
    }

    #[test]
    fn version_marker_round_trips_and_validates() {
        let mut node = sample();
        assert_eq!(node.version().unwrap(), None);
        node.set_version(4).unwrap();
        assert_eq!(node.version().unwrap(), Some(4));
        node.set(VERSION_KEY, -1).unwrap();
        assert!(matches!(node.version(), Err(ConfigError::InvalidVersion(_))));
        node.set(VERSION_KEY, "two").unwrap();
        assert!(matches!(node.version(), Err(ConfigError::InvalidVersion(_))));
    }

    #[test]
    fn quoted_version_marker_reads_as_number() {
        let node = ConfigNode::from_value(json!({ VERSION_KEY: "2" }));
        assert_eq!(node.version().unwrap(), Some(2));
        let node = ConfigNode::from_value(json!({ VERSION_KEY: "-2" }));
        assert!(matches!(node.version(), Err(ConfigError::InvalidVersion(_))));
    }

    #[test]
    fn removing_root_makes_node_virtual() {
        let mut node = sample();
        assert!(node.remove(NodePath::root()).is_some());
        assert!(node.is_virtual());
    }

    #[test]
    fn path_display_joins_segments() {
        assert_eq!(NodePath::parse("a.b.0").to_string(), "a.b.0");
        assert!(NodePath::parse("").is_root());
        assert_eq!(NodePath::from(["a", "b"]), NodePath::parse("a.b"));
    }
}
