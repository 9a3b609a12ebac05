//! Entry model: the File and Directory records held by the storage index.

use crate::path::{extension, file_name, parent_path, path_depth};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// A regular file. `size` is read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub parent: String,
    pub depth: i32,
    pub name: String,
    pub ext: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub mtime: i64,
}

/// A directory. `size` is the sum of all file descendants, maintained by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub path: String,
    pub parent: String,
    pub depth: i32,
    pub name: String,
    pub size: u64,
    pub mtime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl FileEntry {
    /// Build a file entry from a normalized storage path
    pub fn new(path: &str, size: u64, mtime: i64) -> Self {
        let name = file_name(path).to_string();
        Self {
            path: path.to_string(),
            parent: parent_path(path).to_string(),
            depth: path_depth(path),
            ext: extension(&name),
            name,
            size,
            mtime,
        }
    }
}

impl DirectoryEntry {
    /// Build a directory entry with no aggregated size yet
    pub fn new(path: &str, mtime: i64) -> Self {
        Self {
            path: path.to_string(),
            parent: parent_path(path).to_string(),
            depth: path_depth(path),
            name: file_name(path).to_string(),
            size: 0,
            mtime,
        }
    }
}

impl Entry {
    /// Build an entry from filesystem metadata.
    ///
    /// Returns `None` for anything that is neither a regular file nor a directory.
    pub fn from_metadata(path: &str, metadata: &Metadata) -> Option<Self> {
        let mtime = mtime_millis(metadata);
        if metadata.is_dir() {
            Some(Entry::Directory(DirectoryEntry::new(path, mtime)))
        } else if metadata.is_file() {
            Some(Entry::File(FileEntry::new(path, metadata.len(), mtime)))
        } else {
            None
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Entry::File(f) => &f.path,
            Entry::Directory(d) => &d.path,
        }
    }

    pub fn parent(&self) -> &str {
        match self {
            Entry::File(f) => &f.parent,
            Entry::Directory(d) => &d.parent,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => &f.name,
            Entry::Directory(d) => &d.name,
        }
    }

    pub fn depth(&self) -> i32 {
        match self {
            Entry::File(f) => f.depth,
            Entry::Directory(d) => d.depth,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Entry::File(f) => f.size,
            Entry::Directory(d) => d.size,
        }
    }

    pub fn mtime(&self) -> i64 {
        match self {
            Entry::File(f) => f.mtime,
            Entry::Directory(d) => d.mtime,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }
}

fn mtime_millis(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
