//! Storage index: every file and directory below the storage root, keyed by
//! storage path, with directory sizes aggregated from their file descendants.

mod catalog;
mod live;
mod scan;
mod watcher;

pub use catalog::{Catalog, ExtensionStats, IndexStatus, Match, SearchResults, Statistics};
pub use live::LiveIndex;
pub use scan::{scan_tree, IgnoreFilter};
pub use watcher::{FsChange, FsWatcher};

use crate::entry::{DirectoryEntry, Entry, FileEntry};
use crate::path::{is_descendant, parent_paths, path_depth, ROOT};
use std::collections::BTreeMap;

/// `max_descend` value selecting a whole subtree
pub const UNBOUNDED: u32 = u32::MAX;

/// One change to the indexed tree
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert or replace the entry at its path
    Upsert(Entry),
    /// Remove a single entry
    Remove(String),
    /// Remove an entry and everything below it
    RemoveTree(String),
}

impl Mutation {
    pub fn path(&self) -> &str {
        match self {
            Mutation::Upsert(entry) => entry.path(),
            Mutation::Remove(path) | Mutation::RemoveTree(path) => path,
        }
    }
}

/// Anything kept in lockstep with the storage index
pub trait MutationSink {
    fn apply(&mut self, mutation: &Mutation);
}

#[derive(Debug, Clone, Default)]
pub struct StorageIndex {
    entries: BTreeMap<String, Entry>,
}

impl StorageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a complete walk, aggregating directory sizes bottom-up.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let mut map: BTreeMap<String, Entry> = entries
            .into_iter()
            .map(|mut entry| {
                if let Entry::Directory(dir) = &mut entry {
                    dir.size = 0;
                }
                (entry.path().to_string(), entry)
            })
            .collect();

        let files: Vec<(String, u64)> = map
            .values()
            .filter_map(Entry::as_file)
            .map(|f| (f.path.clone(), f.size))
            .collect();

        for (path, size) in files {
            for ancestor in parent_paths(&path) {
                if let Some(Entry::Directory(dir)) = map.get_mut(ancestor) {
                    dir.size += size;
                }
            }
        }

        Self { entries: map }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn get_file(&self, path: &str) -> Option<&FileEntry> {
        self.get(path).and_then(Entry::as_file)
    }

    pub fn get_directory(&self, path: &str) -> Option<&DirectoryEntry> {
        self.get(path).and_then(Entry::as_directory)
    }

    /// Upsert an entry.
    ///
    /// A replaced file has its size rolled back from every ancestor before the
    /// new size is rolled forward. A directory re-indexed as a directory keeps
    /// its aggregated size; a new directory starts from whatever file
    /// descendants are already indexed. A directory replaced by a file loses
    /// its subtree.
    pub fn index(&mut self, mut entry: Entry) {
        let path = entry.path().to_string();

        match (self.entries.get(&path), &mut entry) {
            (Some(Entry::Directory(old)), Entry::Directory(new)) => {
                new.size = old.size;
                self.entries.insert(path, entry);
                return;
            }
            (Some(Entry::Directory(_)), Entry::File(_)) => {
                self.delete_tree(&path);
            }
            (Some(Entry::File(_)), _) => {
                self.delete(&path);
            }
            (None, _) => {}
        }

        match &mut entry {
            Entry::File(file) => self.adjust_ancestors(&path, file.size as i128),
            Entry::Directory(dir) => dir.size = self.descendant_file_size(&path),
        }
        self.entries.insert(path, entry);
    }

    /// Remove a single entry; a removed file's size is subtracted from its ancestors.
    pub fn delete(&mut self, path: &str) -> Option<Entry> {
        let removed = self.entries.remove(path)?;
        if let Entry::File(file) = &removed {
            self.adjust_ancestors(path, -(file.size as i128));
        }
        Some(removed)
    }

    /// Remove an entry and its whole subtree, rolling the subtree's bytes back
    /// from the surviving ancestors. Returns the number of entries removed.
    pub fn delete_tree(&mut self, path: &str) -> usize {
        let doomed: Vec<String> = self
            .subtree(path)
            .map(|entry| entry.path().to_string())
            .collect();

        let mut bytes: u64 = 0;
        let mut removed = 0;
        for p in doomed.iter().map(String::as_str).chain(std::iter::once(path)) {
            if let Some(entry) = self.entries.remove(p) {
                if let Entry::File(file) = entry {
                    bytes += file.size;
                }
                removed += 1;
            }
        }

        if bytes > 0 {
            self.adjust_ancestors(path, -(bytes as i128));
        }
        removed
    }

    /// Entries strictly below `dir` whose depth lies within
    /// `depth(dir) + 1 ..= depth(dir) + 1 + max_descend`.
    ///
    /// `max_descend = 0` selects the immediate children, [`UNBOUNDED`] the whole subtree.
    pub fn filter_entries(&self, dir: &str, max_descend: u32) -> Vec<&Entry> {
        let min_depth = path_depth(dir) as i64 + 1;
        let max_depth = min_depth.saturating_add(max_descend as i64);
        self.subtree(dir)
            .filter(|entry| {
                let depth = entry.depth() as i64;
                depth >= min_depth && depth <= max_depth
            })
            .collect()
    }

    pub fn filter_files(&self, dir: &str, max_descend: u32) -> Vec<&FileEntry> {
        self.filter_entries(dir, max_descend)
            .into_iter()
            .filter_map(Entry::as_file)
            .collect()
    }

    pub fn filter_directories(&self, dir: &str, max_descend: u32) -> Vec<&DirectoryEntry> {
        self.filter_entries(dir, max_descend)
            .into_iter()
            .filter_map(Entry::as_directory)
            .collect()
    }

    /// Every entry strictly below `dir`, in path order
    fn subtree<'a>(&'a self, dir: &str) -> impl Iterator<Item = &'a Entry> + 'a {
        let prefix = if dir == ROOT {
            ROOT.to_string()
        } else {
            format!("{}/", dir)
        };
        let dir = dir.to_string();
        self.entries
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
            .filter(move |(path, _)| is_descendant(path, &dir))
            .map(|(_, entry)| entry)
    }

    fn descendant_file_size(&self, dir: &str) -> u64 {
        self.subtree(dir)
            .filter_map(Entry::as_file)
            .map(|f| f.size)
            .sum()
    }

    fn adjust_ancestors(&mut self, path: &str, delta: i128) {
        for ancestor in parent_paths(path) {
            if let Some(Entry::Directory(dir)) = self.entries.get_mut(ancestor) {
                dir.size = (dir.size as i128 + delta).max(0) as u64;
            }
        }
    }
}

impl MutationSink for StorageIndex {
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Upsert(entry) => self.index(entry.clone()),
            Mutation::Remove(path) => {
                self.delete(path);
            }
            Mutation::RemoveTree(path) => {
                self.delete_tree(path);
            }
        }
    }
}
