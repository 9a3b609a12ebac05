//! Bootstrap walk plus a background thread folding watcher events into the catalog.

use super::scan::{scan_tree, stat, IgnoreFilter};
use super::watcher::{FsChange, FsWatcher};
use super::{Catalog, Mutation, StorageIndex};
use crate::config::Config;
use crate::entry::Entry;
use crate::error::LameryError;
use crate::path::absolute_to_storage;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A storage index that follows the filesystem.
///
/// The watcher is attached before the initial walk so nothing created during
/// the walk is missed; events that race the walk are idempotent upserts.
pub struct LiveIndex {
    root: PathBuf,
    catalog: Arc<Catalog>,
    shutdown: Option<Sender<()>>,
    applier: Option<JoinHandle<()>>,
    watcher: Option<FsWatcher>,
}

impl LiveIndex {
    pub fn start(config: &Config) -> crate::Result<Self> {
        let root = config
            .storage
            .root
            .canonicalize()
            .map_err(|_| LameryError::RootNotFound(config.storage.root.clone()))?;
        if !root.is_dir() {
            return Err(LameryError::RootNotFound(root));
        }
        let filter = IgnoreFilter::new(&config.ignore.patterns)?;

        let (events_tx, events_rx) = unbounded();
        let watcher = FsWatcher::start(&root, events_tx)?;

        let started = Instant::now();
        let entries = scan_tree(&root, &root, &filter)?;
        let catalog = Arc::new(Catalog::new(
            StorageIndex::from_entries(entries),
            &config.search,
        ));
        tracing::info!(
            root = %root.display(),
            entries = catalog.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "storage index ready"
        );

        let applier = Applier {
            root: root.clone(),
            filter,
            catalog: Arc::clone(&catalog),
        };
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("lamery-index".to_string())
            .spawn(move || applier.run(events_rx, shutdown_rx))?;

        Ok(Self {
            root,
            catalog,
            shutdown: Some(shutdown_tx),
            applier: Some(handle),
            watcher: Some(watcher),
        })
    }

    /// Canonical storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    /// Detach the watcher and wait for the applier thread to finish
    pub fn stop(&mut self) {
        self.watcher.take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.applier.take() {
            if handle.join().is_err() {
                tracing::warn!("index applier thread panicked");
            }
        }
    }
}

impl Drop for LiveIndex {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Single writer turning filesystem changes into catalog mutations
struct Applier {
    root: PathBuf,
    filter: IgnoreFilter,
    catalog: Arc<Catalog>,
}

impl Applier {
    fn run(self, events: Receiver<FsChange>, shutdown: Receiver<()>) {
        loop {
            select! {
                recv(events) -> change => match change {
                    Ok(change) => self.handle(change),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        tracing::debug!("index applier stopped");
    }

    fn handle(&self, change: FsChange) {
        let mutations = match change {
            FsChange::Touched(path) => self.touched(&path),
            FsChange::Removed(path) => self.removed(&path),
            FsChange::Rescan => {
                self.rescan();
                return;
            }
        };
        self.catalog.apply(&mutations);
    }

    fn touched(&self, absolute: &Path) -> Vec<Mutation> {
        if self.filter.is_ignored_absolute(&self.root, absolute) {
            return Vec::new();
        }
        let Some(storage_path) = absolute_to_storage(&self.root, absolute) else {
            return Vec::new();
        };

        let metadata = match stat(&self.root, absolute) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return self.removed(absolute),
            Err(err) => {
                tracing::debug!(path = %storage_path, error = %err, "stat failed; skipping event");
                return Vec::new();
            }
        };

        if metadata.is_symlink() {
            return self.removed(absolute);
        }

        // a directory we have not seen arrived with contents (moved in)
        if metadata.is_dir() && self.catalog.get_directory(&storage_path).is_none() {
            return match scan_tree(&self.root, absolute, &self.filter) {
                Ok(entries) => entries.into_iter().map(Mutation::Upsert).collect(),
                Err(err) => {
                    tracing::warn!(path = %storage_path, error = %err, "subtree scan failed");
                    Vec::new()
                }
            };
        }

        Entry::from_metadata(&storage_path, &metadata)
            .map(Mutation::Upsert)
            .into_iter()
            .collect()
    }

    fn removed(&self, absolute: &Path) -> Vec<Mutation> {
        let Some(storage_path) = absolute_to_storage(&self.root, absolute) else {
            return Vec::new();
        };
        match self.catalog.get(&storage_path) {
            Some(Entry::Directory(_)) => vec![Mutation::RemoveTree(storage_path)],
            Some(Entry::File(_)) => vec![Mutation::Remove(storage_path)],
            None => Vec::new(),
        }
    }

    fn rescan(&self) {
        let started = Instant::now();
        match scan_tree(&self.root, &self.root, &self.filter) {
            Ok(entries) => {
                self.catalog.replace_all(StorageIndex::from_entries(entries));
                tracing::info!(
                    entries = self.catalog.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "storage index rebuilt"
                );
            }
            Err(err) => tracing::warn!(error = %err, "rescan failed"),
        }
    }
}
