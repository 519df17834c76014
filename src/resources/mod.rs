use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A source of default configuration files shipped with a plugin.
///
/// Paths are `/`-separated and relative to the root of the bundle, e.g.
/// `"lang/messages.yml"`.
pub trait ResourceSource: Send + Sync {
    /// Returns the bytes of the resource at `path`, or `None` if it is not bundled.
    fn resource(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>>;
}

/// Resources read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ResourceSource for DirectoryResources {
    fn resource(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        let relative = path.trim_start_matches('/');
        // Reject anything that would escape the bundle root.
        if relative.split(['/', '\\']).any(|part| part == "..") {
            return Ok(None);
        }
        match fs::read(self.root.join(relative)) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resources held in memory, typically filled from `include_bytes!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    entries: HashMap<String, Cow<'static, [u8]>>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource, replacing any previous entry at the same path.
    pub fn with<B: Into<Cow<'static, [u8]>>>(mut self, path: &str, bytes: B) -> Self {
        self.entries
            .insert(path.trim_start_matches('/').to_string(), bytes.into());
        self
    }
}

impl ResourceSource for EmbeddedResources {
    fn resource(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        Ok(self
            .entries
            .get(path.trim_start_matches('/'))
            .map(|bytes| Cow::Borrowed(bytes.as_ref())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn embedded_resources_ignore_leading_slash() {
        let resources = EmbeddedResources::new().with("config/settings.yml", &b"a: 1\n"[..]);
        let found = resources.resource("/config/settings.yml").unwrap();
        assert_eq!(found.as_deref(), Some(&b"a: 1\n"[..]));
        assert!(resources.resource("config/other.yml").unwrap().is_none());
    }

    #[test]
    fn directory_resources_read_files_below_root() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lang")).unwrap();
        fs::write(dir.path().join("lang").join("en.json"), b"{}").unwrap();
        let resources = DirectoryResources::new(dir.path());
        assert_eq!(
            resources.resource("lang/en.json").unwrap().as_deref(),
            Some(&b"{}"[..])
        );
        assert!(resources.resource("lang/de.json").unwrap().is_none());
    }

    #[test]
    fn directory_resources_refuse_parent_traversal() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join("bundle");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(dir.path().join("secret.yml"), b"x").unwrap();
        let resources = DirectoryResources::new(&bundle);
        assert!(resources.resource("../secret.yml").unwrap().is_none());
    }
}
