//! Lamery Core - live index of a storage tree
//!
//! Mirrors a directory tree into an in-memory index with aggregated
//! directory sizes and a fuzzy path search, kept current by a filesystem
//! watcher.

pub mod config;
pub mod entry;
pub mod error;
pub mod hash;
pub mod index;
pub mod media;
pub mod path;
pub mod search;

pub use config::{CombineMode, Config};
pub use entry::{DirectoryEntry, Entry, FileEntry};
pub use error::{ErrorEnvelope, LameryError};
pub use index::{Catalog, LiveIndex, Match, Mutation, MutationSink, StorageIndex, UNBOUNDED};
pub use search::{SearchHit, SearchIndex, SearchOptions};

/// Result type alias for lamery operations
pub type Result<T> = std::result::Result<T, LameryError>;
