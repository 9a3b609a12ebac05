//! Shared read/write view over the storage index and its search index.

use super::{Mutation, MutationSink, StorageIndex, UNBOUNDED};
use crate::config::SearchConfig;
use crate::entry::{DirectoryEntry, Entry, FileEntry};
use crate::path::{is_descendant, ROOT};
use crate::search::{SearchIndex, SearchOptions};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

const TOP_EXTENSIONS: usize = 10;
const LARGEST_FILES: usize = 200;

struct Indexes {
    store: StorageIndex,
    search: SearchIndex,
}

impl Indexes {
    fn build(store: StorageIndex) -> Self {
        let mut search = SearchIndex::new();
        for entry in store.iter() {
            search.add(entry.path());
        }
        Self { store, search }
    }
}

/// Storage and search indexes behind one lock, so every mutation lands in
/// both before any reader observes it.
pub struct Catalog {
    inner: RwLock<Indexes>,
    options: SearchOptions,
    max_results: usize,
}

/// A search hit resolved to its entry
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub score: f64,
    pub terms: Vec<String>,
    pub entry: Entry,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub scope: String,
    /// Matches before truncation
    pub total: usize,
    pub elapsed_ms: f64,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionStats {
    pub ext: String,
    pub count: usize,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub files: usize,
    pub directories: usize,
    pub total_size: u64,
    pub extensions: Vec<ExtensionStats>,
    pub largest: Vec<FileEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub entries: usize,
    pub files: usize,
    pub directories: usize,
    pub total_size: u64,
}

impl Catalog {
    pub fn new(store: StorageIndex, config: &SearchConfig) -> Self {
        Self {
            inner: RwLock::new(Indexes::build(store)),
            options: SearchOptions::from(config),
            max_results: config.max_results,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a batch of mutations under a single write lock
    pub fn apply(&self, mutations: &[Mutation]) {
        if mutations.is_empty() {
            return;
        }
        let mut guard = self.write();
        let indexes = &mut *guard;
        for mutation in mutations {
            // a file replacing a directory takes the directory's subtree with it
            if matches!(mutation, Mutation::Upsert(Entry::File(_)))
                && indexes.store.get_directory(mutation.path()).is_some()
            {
                indexes.search.remove_tree(mutation.path());
            }
            indexes.store.apply(mutation);
            indexes.search.apply(mutation);
        }
    }

    /// Swap in a freshly walked tree
    pub fn replace_all(&self, store: StorageIndex) {
        let rebuilt = Indexes::build(store);
        *self.write() = rebuilt;
    }

    pub fn len(&self) -> usize {
        self.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().store.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<Entry> {
        self.read().store.get(path).cloned()
    }

    pub fn get_file(&self, path: &str) -> Option<FileEntry> {
        self.read().store.get_file(path).cloned()
    }

    pub fn get_directory(&self, path: &str) -> Option<DirectoryEntry> {
        self.read().store.get_directory(path).cloned()
    }

    pub fn filter_entries(&self, dir: &str, max_descend: u32) -> Vec<Entry> {
        self.read()
            .store
            .filter_entries(dir, max_descend)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn filter_files(&self, dir: &str, max_descend: u32) -> Vec<FileEntry> {
        self.read()
            .store
            .filter_files(dir, max_descend)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn filter_directories(&self, dir: &str, max_descend: u32) -> Vec<DirectoryEntry> {
        self.read()
            .store
            .filter_directories(dir, max_descend)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Entries below `dir` down to `max_descend` extra levels, directories
    /// first, then natural name order. `None` if `dir` is not an indexed directory.
    pub fn list(&self, dir: &str, max_descend: u32) -> Option<Vec<Entry>> {
        let guard = self.read();
        guard.store.get_directory(dir)?;

        let mut entries: Vec<Entry> = guard
            .store
            .filter_entries(dir, max_descend)
            .into_iter()
            .cloned()
            .collect();
        drop(guard);

        entries.sort_by(|a, b| match (a.is_directory(), b.is_directory()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => alphanumeric_sort::compare_str(a.path(), b.path()),
        });
        Some(entries)
    }

    /// Fuzzy search restricted to the subtree below `scope`
    pub fn search(&self, query: &str, scope: &str) -> SearchResults {
        let started = Instant::now();
        let guard = self.read();

        let hits = guard.search.search(query, &self.options);
        let mut matches: Vec<Match> = hits
            .into_iter()
            .filter(|hit| scope == ROOT || is_descendant(&hit.path, scope))
            .filter_map(|hit| {
                guard.store.get(&hit.path).map(|entry| Match {
                    score: hit.score,
                    terms: hit.terms,
                    entry: entry.clone(),
                })
            })
            .collect();
        drop(guard);

        let total = matches.len();
        matches.truncate(self.max_results);

        SearchResults {
            query: query.to_string(),
            scope: scope.to_string(),
            total,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            matches,
        }
    }

    pub fn statistics(&self) -> Statistics {
        let guard = self.read();

        let mut files: Vec<&FileEntry> = guard.store.filter_files(ROOT, UNBOUNDED);
        let directories = guard.store.filter_directories(ROOT, UNBOUNDED).len();

        let mut by_ext: HashMap<&str, ExtensionStats> = HashMap::new();
        let mut total_size = 0;
        for file in &files {
            total_size += file.size;
            let stats = by_ext.entry(file.ext.as_str()).or_insert_with(|| ExtensionStats {
                ext: file.ext.clone(),
                count: 0,
                size: 0,
            });
            stats.count += 1;
            stats.size += file.size;
        }

        let mut extensions: Vec<ExtensionStats> = by_ext.into_values().collect();
        extensions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ext.cmp(&b.ext)));
        extensions.truncate(TOP_EXTENSIONS);

        let file_count = files.len();
        files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        let largest = files.into_iter().take(LARGEST_FILES).cloned().collect();

        Statistics {
            files: file_count,
            directories,
            total_size,
            extensions,
            largest,
        }
    }

    pub fn status(&self) -> IndexStatus {
        let guard = self.read();
        let (files, directories) = guard
            .store
            .iter()
            .fold((0, 0), |(f, d), entry| if entry.is_file() { (f + 1, d) } else { (f, d + 1) });
        IndexStatus {
            entries: guard.store.len(),
            files,
            directories,
            total_size: guard.store.get_directory(ROOT).map(|d| d.size).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let entries = vec![
            Entry::Directory(DirectoryEntry::new("/", 0)),
            Entry::Directory(DirectoryEntry::new("/docs", 0)),
            Entry::Directory(DirectoryEntry::new("/docs/archive", 0)),
            Entry::File(FileEntry::new("/docs/report10.pdf", 300, 0)),
            Entry::File(FileEntry::new("/docs/report2.pdf", 200, 0)),
            Entry::File(FileEntry::new("/docs/archive/report1.pdf", 50, 0)),
            Entry::File(FileEntry::new("/music.mp3", 1_000, 0)),
        ];
        Catalog::new(StorageIndex::from_entries(entries), &SearchConfig::default())
    }

    #[test]
    fn apply_keeps_search_in_lockstep() {
        let catalog = catalog();
        catalog.apply(&[Mutation::Upsert(Entry::File(FileEntry::new(
            "/docs/holiday.jpg",
            10,
            0,
        )))]);
        assert_eq!(catalog.search("holiday", ROOT).total, 1);
        assert_eq!(catalog.get_directory("/docs").unwrap().size, 560);

        catalog.apply(&[Mutation::Remove("/docs/holiday.jpg".to_string())]);
        assert_eq!(catalog.search("holiday", ROOT).total, 0);

        catalog.apply(&[Mutation::RemoveTree("/docs".to_string())]);
        assert!(catalog.get("/docs/report2.pdf").is_none());
        assert_eq!(catalog.search("report", ROOT).total, 0);
        assert_eq!(catalog.get_directory(ROOT).unwrap().size, 1_000);
    }

    #[test]
    fn file_replacing_directory_drops_subtree_from_search() {
        let catalog = catalog();
        catalog.apply(&[Mutation::Upsert(Entry::File(FileEntry::new("/docs", 7, 0)))]);

        let guard = catalog.read();
        assert_eq!(guard.store.len(), 3);
        assert_eq!(guard.search.len(), guard.store.len());
        let indexed: Vec<String> = guard
            .search
            .search("", &SearchOptions::default())
            .into_iter()
            .map(|hit| hit.path)
            .collect();
        assert!(indexed.iter().all(|path| !path.starts_with("/docs/")));
        drop(guard);

        assert_eq!(catalog.get_file("/docs").unwrap().size, 7);
        assert_eq!(catalog.get_directory(ROOT).unwrap().size, 1_007);
    }

    #[test]
    fn search_scope_excludes_the_scope_itself() {
        let catalog = catalog();
        let results = catalog.search("docs", "/docs");
        assert!(results.matches.iter().all(|m| m.entry.path() != "/docs"));

        let everything = catalog.search("", "/docs");
        assert_eq!(everything.total, 4);
        assert!(everything.matches.iter().all(|m| m.score == 0.0));
    }

    #[test]
    fn equal_scores_use_natural_order() {
        let catalog = catalog();
        let results = catalog.search("", "/docs");
        let paths: Vec<&str> = results.matches.iter().map(|m| m.entry.path()).collect();
        assert_eq!(
            paths,
            vec![
                "/docs/archive",
                "/docs/archive/report1.pdf",
                "/docs/report2.pdf",
                "/docs/report10.pdf"
            ]
        );
    }

    #[test]
    fn listing_puts_directories_first() {
        let catalog = catalog();
        let listing = catalog.list("/docs", 0).unwrap();
        let names: Vec<&str> = listing.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["archive", "report2.pdf", "report10.pdf"]);
        assert!(catalog.list("/music.mp3", 0).is_none());
        assert!(catalog.list("/nope", 0).is_none());
    }

    #[test]
    fn statistics_summarize_tree() {
        let stats = catalog().statistics();
        assert_eq!(stats.files, 4);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.total_size, 1_550);
        assert_eq!(stats.extensions[0].ext, ".pdf");
        assert_eq!(stats.extensions[0].count, 3);
        assert_eq!(stats.extensions[0].size, 550);
        assert_eq!(stats.largest[0].path, "/music.mp3");
    }

    #[test]
    fn replace_all_swaps_both_indexes() {
        let catalog = catalog();
        catalog.replace_all(StorageIndex::from_entries(vec![
            Entry::Directory(DirectoryEntry::new("/", 0)),
            Entry::File(FileEntry::new("/fresh.txt", 4, 0)),
        ]));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.search("report", ROOT).total, 0);
        assert_eq!(catalog.search("fresh", ROOT).total, 1);
        assert_eq!(catalog.status().total_size, 4);
    }
}
