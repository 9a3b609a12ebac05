//! Recursive walk of the storage root.

use crate::entry::Entry;
use crate::error::LameryError;
use crate::path::absolute_to_storage;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Glob patterns excluded from the walk and from watcher events.
///
/// Bare names (`.git`) match that segment anywhere in the tree along with
/// everything beneath it.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
}

impl IgnoreFilter {
    pub fn new(patterns: &[String]) -> crate::Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.trim_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let glob_pattern = if pattern.contains('*') || pattern.contains('?') {
                pattern.to_string()
            } else {
                format!("**/{}", pattern)
            };
            builder.add(Glob::new(&glob_pattern).map_err(|e| LameryError::GlobPattern(e.to_string()))?);
            builder.add(
                Glob::new(&format!("{}/**", glob_pattern))
                    .map_err(|e| LameryError::GlobPattern(e.to_string()))?,
            );
        }
        let set = builder
            .build()
            .map_err(|e| LameryError::GlobPattern(e.to_string()))?;
        Ok(Self { set })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
        }
    }

    /// Whether a path relative to the storage root is excluded
    pub fn is_ignored(&self, relative: &Path) -> bool {
        !relative.as_os_str().is_empty() && self.set.is_match(relative)
    }

    /// Whether an absolute path below `root` is excluded
    pub fn is_ignored_absolute(&self, root: &Path, absolute: &Path) -> bool {
        match absolute.strip_prefix(root) {
            Ok(relative) => self.is_ignored(relative),
            Err(_) => true,
        }
    }
}

/// Walk `start` (which must lie inside `root`) and stat every file and
/// directory found, `start` included.
///
/// Entries that vanish between listing and stat are skipped, and so are
/// symlinks below `root`.
pub fn scan_tree(root: &Path, start: &Path, filter: &IgnoreFilter) -> crate::Result<Vec<Entry>> {
    if !root.is_dir() {
        return Err(LameryError::RootNotFound(root.to_path_buf()));
    }

    let mut builder = WalkBuilder::new(start);
    builder.standard_filters(false);
    builder.hidden(false);
    builder.follow_links(false);

    let walk_root = root.to_path_buf();
    let walk_filter = filter.clone();
    builder.filter_entry(move |entry| !walk_filter.is_ignored_absolute(&walk_root, entry.path()));

    let mut paths: Vec<PathBuf> = Vec::new();
    for result in builder.build() {
        match result {
            Ok(entry) => paths.push(entry.into_path()),
            Err(err) => tracing::debug!(error = %err, "skipping unreadable path"),
        }
    }

    let entries: Vec<Entry> = paths
        .par_iter()
        .filter_map(|path| {
            let storage_path = absolute_to_storage(root, path)?;
            let metadata = stat(root, path).ok()?;
            Entry::from_metadata(&storage_path, &metadata)
        })
        .collect();

    tracing::debug!(start = %start.display(), entries = entries.len(), "scanned tree");
    Ok(entries)
}

/// Stat without following links, except for `root` itself
pub(crate) fn stat(root: &Path, path: &Path) -> std::io::Result<std::fs::Metadata> {
    if path == root {
        std::fs::metadata(path)
    } else {
        std::fs::symlink_metadata(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StorageIndex;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join("a/x.txt"), b"0123456789").unwrap();
        fs::write(dir.path().join("a/b/y.txt"), b"12345").unwrap();
        fs::write(dir.path().join(".hidden"), b"abc").unwrap();
        fs::write(dir.path().join(".git/objects/blob"), b"zzzz").unwrap();
        dir
    }

    #[test]
    fn walk_includes_root_and_hidden_files() {
        let dir = fixture();
        let entries = scan_tree(dir.path(), dir.path(), &IgnoreFilter::empty()).unwrap();
        let mut paths: Vec<&str> = entries.iter().map(|e| e.path()).collect();
        paths.sort();
        assert!(paths.contains(&"/"));
        assert!(paths.contains(&"/.hidden"));
        assert!(paths.contains(&"/a/b/y.txt"));
        assert!(paths.contains(&"/.git/objects/blob"));
    }

    #[test]
    fn ignore_patterns_prune_subtrees() {
        let dir = fixture();
        let filter = IgnoreFilter::new(&[".git".to_string()]).unwrap();
        let entries = scan_tree(dir.path(), dir.path(), &filter).unwrap();
        assert!(entries.iter().all(|e| !e.path().starts_with("/.git")));
        assert!(entries.iter().any(|e| e.path() == "/.hidden"));
    }

    #[test]
    fn walked_tree_has_aggregated_sizes() {
        let dir = fixture();
        let filter = IgnoreFilter::new(&[".git".to_string()]).unwrap();
        let index = StorageIndex::from_entries(scan_tree(dir.path(), dir.path(), &filter).unwrap());
        assert_eq!(index.get_directory("/a").unwrap().size, 15);
        assert_eq!(index.get_directory("/").unwrap().size, 18);
    }

    #[test]
    fn subtree_scan_uses_storage_paths() {
        let dir = fixture();
        let entries = scan_tree(dir.path(), &dir.path().join("a/b"), &IgnoreFilter::empty()).unwrap();
        let mut paths: Vec<&str> = entries.iter().map(|e| e.path()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/a/b", "/a/b/y.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_indexed() {
        let dir = fixture();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("a/linked-dir")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("big.bin"), dir.path().join("a/linked.bin")).unwrap();

        let filter = IgnoreFilter::new(&[".git".to_string()]).unwrap();
        let entries = scan_tree(dir.path(), dir.path(), &filter).unwrap();
        assert!(entries.iter().all(|e| !e.path().starts_with("/a/linked")));

        let index = StorageIndex::from_entries(entries);
        assert_eq!(index.get_directory("/a").unwrap().size, 15);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = scan_tree(&missing, &missing, &IgnoreFilter::empty()).unwrap_err();
        assert!(matches!(err, LameryError::RootNotFound(_)));
    }

    #[test]
    fn glob_patterns_are_honored() {
        let filter = IgnoreFilter::new(&["*.tmp".to_string(), "node_modules".to_string()]).unwrap();
        assert!(filter.is_ignored(Path::new("a/b/file.tmp")));
        assert!(filter.is_ignored(Path::new("web/node_modules/x/index.js")));
        assert!(!filter.is_ignored(Path::new("a/file.txt")));
        assert!(!filter.is_ignored(Path::new("")));
    }
}
