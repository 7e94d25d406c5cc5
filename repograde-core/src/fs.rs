//! Filesystem access for inspecting local checkouts.

use std::path::{Path, PathBuf};

use crate::domain::TreeEntry;
use crate::error::Result;

/// Directories never descended into while listing a checkout.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// List all files reachable from the root path.
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Read a file into a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    if !is_skipped_dir(&path) {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Snapshot a checkout as slash-separated file entries relative to `root`.
pub fn tree_entries<F: FileSystem>(fs: &F, root: &Path) -> Result<Vec<TreeEntry>> {
    let entries = fs
        .list_files(root)?
        .into_iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(root).ok()?;
            let segments: Vec<String> = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect();
            if segments.is_empty() {
                return None;
            }
            Some(TreeEntry::file(segments.join("/")))
        })
        .collect();
    Ok(entries)
}

/// Locate and read a root-level README, if one exists.
pub fn read_readme<F: FileSystem>(fs: &F, root: &Path, entries: &[TreeEntry]) -> Option<String> {
    let candidate = entries.iter().find(|entry| {
        !entry.path.contains('/') && {
            let name = entry.path.to_lowercase();
            name == "readme" || name.starts_with("readme.")
        }
    })?;
    fs.read_to_string(&root.join(&candidate.path)).ok()
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| SKIPPED_DIRS.contains(&name))
        .unwrap_or(false)
}
