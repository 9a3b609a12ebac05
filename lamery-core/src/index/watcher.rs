//! OS filesystem notifications reduced to touch/remove/rescan signals.

use crossbeam_channel::Sender;
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// A path-level change observed under the storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// Created or modified; stat to learn what it is now
    Touched(PathBuf),
    /// Unlinked or renamed away
    Removed(PathBuf),
    /// Events were dropped; the tree must be walked again
    Rescan,
}

/// Recursive watch on the storage root. Dropping it stops the watch.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    pub fn start(root: &Path, tx: Sender<FsChange>) -> crate::Result<Self> {
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for change in classify(&event) {
                    if tx.send(change).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "filesystem watcher error; scheduling rescan");
                let _ = tx.send(FsChange::Rescan);
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "watching storage root");
        Ok(Self { _watcher: watcher })
    }
}

/// Map a raw notify event onto index-level changes
pub fn classify(event: &Event) -> Vec<FsChange> {
    if event.need_rescan() {
        return vec![FsChange::Rescan];
    }

    let touched = || -> Vec<FsChange> { event.paths.iter().cloned().map(FsChange::Touched).collect() };
    let removed = || -> Vec<FsChange> { event.paths.iter().cloned().map(FsChange::Removed).collect() };

    match &event.kind {
        EventKind::Create(_) => touched(),
        EventKind::Remove(_) => removed(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => removed(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                changes.push(FsChange::Removed(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push(FsChange::Touched(to.clone()));
            }
            changes
        }
        EventKind::Modify(_) => touched(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, Flag, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn create_and_modify_touch() {
        let changes = classify(&event(EventKind::Create(CreateKind::File), &["/r/a"]));
        assert_eq!(changes, vec![FsChange::Touched("/r/a".into())]);

        let changes = classify(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/r/a"],
        ));
        assert_eq!(changes, vec![FsChange::Touched("/r/a".into())]);
    }

    #[test]
    fn remove_and_rename_away() {
        let changes = classify(&event(EventKind::Remove(RemoveKind::Folder), &["/r/d"]));
        assert_eq!(changes, vec![FsChange::Removed("/r/d".into())]);

        let changes = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/r/old"],
        ));
        assert_eq!(changes, vec![FsChange::Removed("/r/old".into())]);
    }

    #[test]
    fn rename_both_removes_then_touches() {
        let changes = classify(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/old", "/r/new"],
        ));
        assert_eq!(
            changes,
            vec![
                FsChange::Removed("/r/old".into()),
                FsChange::Touched("/r/new".into())
            ]
        );
    }

    #[test]
    fn overflow_requests_rescan() {
        let overflow = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(classify(&overflow), vec![FsChange::Rescan]);
    }

    #[test]
    fn access_is_ignored() {
        let changes = classify(&event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/r/a"],
        ));
        assert!(changes.is_empty());
    }
}
