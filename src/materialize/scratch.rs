//! Per-invocation scratch directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// A scratch directory owned by one workflow invocation.
///
/// The directory is removed when the value is dropped, on success and on
/// every error path.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates a fresh directory under `root`, or under the system temp dir.
    pub fn new(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bucket-scan-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory now, reporting any error.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Maps random local file names back to the object keys they hold.
///
/// The scanner needs a flat directory of files; object keys can contain
/// separators and characters that are unsafe on disk, so every download gets
/// a random name and this table restores the key afterwards.
#[derive(Debug, Clone, Default)]
pub struct LocalNames {
    by_name: HashMap<String, String>,
    order: Vec<(String, String)>,
}

impl LocalNames {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh `<uuid>.tmp` name for `key`.
    pub fn allocate(&mut self, key: &str) -> String {
        let name = format!("{}.tmp", Uuid::new_v4());
        self.by_name.insert(name.clone(), key.to_string());
        self.order.push((name.clone(), key.to_string()));
        name
    }

    /// Returns the key stored under `name`.
    pub fn key_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Iterates `(local name, key)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().map(|(n, k)| (n.as_str(), k.as_str()))
    }

    /// Returns the local path of `name` inside `dir`.
    pub fn path_in(dir: &Path, name: &str) -> PathBuf {
        dir.join(name)
    }

    /// Returns the number of allocated names.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no names were allocated.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
