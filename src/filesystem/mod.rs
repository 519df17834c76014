use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Represents errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// Wrapper for standard IO errors.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Error for empty path input.
    #[error("Path is empty")]
    EmptyPath,
    /// Error when a file was expected to be absent.
    #[error("File already exists: {0}")]
    AlreadyExists(PathBuf),
    /// Error when the target of a write has no parent directory.
    #[error("Path has no parent directory: {0}")]
    NoParent(PathBuf),
}

/// Options for writing files, such as whether to overwrite existing files.
pub struct WriteOptions {
    /// If true, allows overwriting an existing file.
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

/// Creates a directory if it does not exist.
///
/// # Arguments
///
/// * `dir` - Path to the directory to create.
/// * `recursive` - If true, creates parent directories as needed.
///
/// # Errors
///
/// Returns `FilesystemError` if the directory cannot be created.
pub fn create_if_not_exists<P: AsRef<Path>>(dir: P, recursive: bool) -> Result<(), FilesystemError> {
    let raw_path = dir.as_ref().to_str().ok_or(FilesystemError::EmptyPath)?;
    let path = expand_home(raw_path);
    if path.as_os_str().is_empty() {
        return Err(FilesystemError::EmptyPath);
    }

    if path.is_dir() {
        return Ok(());
    }

    if recursive {
        fs::create_dir_all(&path)?;
    } else {
        fs::create_dir(&path)?;
    }

    Ok(())
}

/// Checks if a file exists at the given path.
pub fn file_exists<P: AsRef<Path>>(file: P) -> bool {
    file.as_ref().is_file()
}

/// Reads the contents of a file into a string, or `None` if it does not exist.
///
/// # Errors
///
/// Returns `FilesystemError` if the file exists but cannot be read.
pub fn read_optional<P: AsRef<Path>>(path: P) -> Result<Option<String>, FilesystemError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes content to a file atomically, with options for overwriting.
///
/// The bytes go to a temporary file in the destination directory which is then
/// renamed over the target, so readers observe either the old or the new
/// contents and never a partial write.
///
/// # Errors
///
/// Returns `FilesystemError` if the write fails or overwrite is not allowed.
pub fn write_file<P: AsRef<Path>>(path: P, content: &[u8], options: WriteOptions) -> Result<(), FilesystemError> {
    let p = path.as_ref();
    if p.exists() && !options.overwrite {
        return Err(FilesystemError::AlreadyExists(p.to_path_buf()));
    }
    let parent = match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => return Err(FilesystemError::NoParent(p.to_path_buf())),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    if options.overwrite {
        tmp.persist(p).map_err(|e| FilesystemError::Io(e.error))?;
    } else {
        tmp.persist_noclobber(p).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                FilesystemError::AlreadyExists(p.to_path_buf())
            } else {
                FilesystemError::Io(e.error)
            }
        })?;
    }
    Ok(())
}

/// Expands a path that starts with `~` to the user's home directory.
///
/// # Arguments
///
/// * `path` - Path string, possibly starting with `~`.
///
/// # Returns
///
/// The expanded `PathBuf`, or empty if expansion fails.
pub fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::new();
    }
    if !path.starts_with('~') {
        return PathBuf::from(path);
    }
    let home = match dirs::home_dir() {
        Some(h) => h,
        None => return PathBuf::new(),
    };
    if path == "~" {
        return home;
    }
    if path.starts_with("~/") || path.starts_with("~\\") {
        let without_tilde = &path[2..];
        return home.join(without_tilde);
    }
    PathBuf::new()
}
