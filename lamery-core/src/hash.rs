//! Metadata fingerprints for cache validation.

use crate::entry::{Entry, FileEntry};
use sha2::{Digest, Sha256};

/// Weak hash of a file: derived from (mtime, size, path), never from content.
///
/// 24-char hex prefix of SHA-256 over `"{mtime:x}-{size:x}-{path}"`.
pub fn weak_hash(file: &FileEntry) -> String {
    fingerprint(&file.path, file.size, file.mtime)
}

/// Weak HTTP entity tag for any entry; a directory's tag follows its aggregated size
pub fn entry_etag(entry: &Entry) -> String {
    format!(
        "W/\"{}\"",
        fingerprint(entry.path(), entry.size(), entry.mtime())
    )
}

fn fingerprint(path: &str, size: u64, mtime: i64) -> String {
    let input = format!("{:x}-{:x}-{}", mtime, size, path);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..12])
}

/// Content-addressed cache key for a derived artifact of `file` (e.g. a thumbnail format).
pub fn derived_key(file: &FileEntry, variant: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(weak_hash(file).as_bytes());
    hasher.update(b":");
    hasher.update(variant.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_hash_is_deterministic() {
        let a = FileEntry::new("/a/b.txt", 100, 1_700_000_000_000);
        let b = FileEntry::new("/a/b.txt", 100, 1_700_000_000_000);
        assert_eq!(weak_hash(&a), weak_hash(&b));
        assert_eq!(weak_hash(&a).len(), 24);
    }

    #[test]
    fn weak_hash_changes_with_metadata() {
        let base = FileEntry::new("/a/b.txt", 100, 1_000);
        let resized = FileEntry::new("/a/b.txt", 101, 1_000);
        let touched = FileEntry::new("/a/b.txt", 100, 1_001);
        let moved = FileEntry::new("/a/c.txt", 100, 1_000);
        assert_ne!(weak_hash(&base), weak_hash(&resized));
        assert_ne!(weak_hash(&base), weak_hash(&touched));
        assert_ne!(weak_hash(&base), weak_hash(&moved));
    }

    #[test]
    fn etag_is_weak_and_quoted() {
        let file = FileEntry::new("/a.txt", 1, 1);
        let etag = entry_etag(&Entry::File(file));
        assert!(etag.starts_with("W/\""));
        assert!(etag.ends_with('"'));
    }

    #[test]
    fn file_etag_wraps_weak_hash() {
        let file = FileEntry::new("/a.txt", 5, 9);
        let expected = format!("W/\"{}\"", weak_hash(&file));
        assert_eq!(entry_etag(&Entry::File(file)), expected);
    }

    #[test]
    fn derived_key_separates_variants() {
        let file = FileEntry::new("/a.jpg", 1, 1);
        assert_ne!(derived_key(&file, "jpeg"), derived_key(&file, "webp"));
        assert_eq!(derived_key(&file, "jpeg").len(), 64);
    }
}
