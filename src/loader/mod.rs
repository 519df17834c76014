use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::filesystem::{self, WriteOptions};
use crate::node::{ConfigNode, NodePath};

/// On-disk document formats understood by [`TreeLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Guesses the format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yml" | "yaml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// Options applied when a loader writes a document.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Comment block written at the top of YAML documents. JSON has no
    /// comments, so it is ignored there.
    pub header: Option<String>,
    /// Indentation width for JSON output; `0` writes compact JSON.
    pub json_indent: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            header: None,
            json_indent: 2,
        }
    }
}

/// Loads and saves one configuration document as a [`ConfigNode`].
#[derive(Debug, Clone)]
pub struct TreeLoader {
    path: PathBuf,
    format: Format,
    options: LoaderOptions,
}

impl TreeLoader {
    pub fn new<P: AsRef<Path>>(path: P, format: Format, options: LoaderOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format,
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Reads the document. A missing or blank file yields a virtual node.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a YAML/JSON error if
    /// it is malformed.
    pub fn load(&self) -> Result<ConfigNode> {
        match filesystem::read_optional(&self.path)? {
            Some(text) => self.parse(&text),
            None => Ok(ConfigNode::virtual_node()),
        }
    }

    /// Parses document text in this loader's format.
    ///
    /// # Errors
    ///
    /// Returns a YAML/JSON error for malformed text, and
    /// `ConfigError::NonFiniteNumber` for YAML `.nan`, `.inf` or `-.inf`
    /// values, which the tree cannot represent.
    pub fn parse(&self, text: &str) -> Result<ConfigNode> {
        let root: Value = match self.format {
            Format::Yaml if is_blank_yaml(text) => Value::Null,
            Format::Yaml => {
                let document: serde_yaml::Value = serde_yaml::from_str(text)?;
                reject_non_finite(&document, &NodePath::root())?;
                serde_yaml::from_str(text)?
            }
            Format::Json if text.trim().is_empty() => Value::Null,
            Format::Json => serde_json::from_str(text)?,
        };
        Ok(ConfigNode::from_value(root))
    }

    /// Renders a node in this loader's format, including the header.
    pub fn render(&self, node: &ConfigNode) -> Result<String> {
        match self.format {
            Format::Yaml => {
                let mut out = String::new();
                if let Some(header) = &self.options.header {
                    for line in header.lines() {
                        if line.is_empty() {
                            out.push_str("#\n");
                        } else {
                            out.push_str("# ");
                            out.push_str(line);
                            out.push('\n');
                        }
                    }
                    out.push('\n');
                }
                if !node.is_virtual() {
                    out.push_str(&serde_yaml::to_string(node.root())?);
                }
                Ok(out)
            }
            Format::Json => {
                if node.is_virtual() {
                    return Ok(String::new());
                }
                let mut out = if self.options.json_indent == 0 {
                    serde_json::to_string(node.root())?
                } else {
                    let indent = " ".repeat(self.options.json_indent);
                    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                    let mut buf = Vec::new();
                    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
                    node.root().serialize(&mut serializer)?;
                    String::from_utf8_lossy(&buf).into_owned()
                };
                out.push('\n');
                Ok(out)
            }
        }
    }

    /// Writes the node to disk, replacing the previous file atomically.
    pub fn save(&self, node: &ConfigNode) -> Result<()> {
        let text = self.render(node)?;
        filesystem::write_file(&self.path, text.as_bytes(), WriteOptions::default())?;
        tracing::debug!("Saved {}", self.path.display());
        Ok(())
    }
}

fn reject_non_finite(value: &serde_yaml::Value, path: &NodePath) -> Result<()> {
    match value {
        serde_yaml::Value::Number(n) if n.as_f64().is_some_and(|f| !f.is_finite()) => {
            Err(ConfigError::NonFiniteNumber(path.to_string()))
        }
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| reject_non_finite(item, &path.child(&index.to_string()))),
        serde_yaml::Value::Mapping(map) => map
            .iter()
            .try_for_each(|(key, item)| reject_non_finite(item, &path.child(&key_label(key)))),
        serde_yaml::Value::Tagged(tagged) => reject_non_finite(&tagged.value, path),
        _ => Ok(()),
    }
}

fn key_label(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn is_blank_yaml(text: &str) -> bool {
    text.lines().map(str::trim).all(|line| {
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}
