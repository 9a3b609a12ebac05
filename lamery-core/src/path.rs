//! Conversion between filesystem paths and canonical storage paths.
//!
//! A storage path is `/`-separated, always starts with `/` and never ends
//! with one (except the root `/` itself). `..` segments are resolved but can
//! never climb above the root, so a storage path always names a location
//! inside the configured storage root.
//!
//! Depth convention: `/a` has depth 0, `/a/b` depth 1, and the root `/` has
//! depth -1. In other words depth is the number of separators minus one.

use std::path::{Component, Path, PathBuf};

pub const ROOT: &str = "/";

/// Unify separators, drop `.` segments and resolve `..` against the root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Convert a storage path to an absolute path below `root`.
pub fn storage_to_absolute(root: &Path, path: &str) -> PathBuf {
    let mut absolute = root.to_path_buf();
    for segment in normalize_path(path).split('/').filter(|s| !s.is_empty()) {
        absolute.push(segment);
    }
    absolute
}

/// Convert an absolute filesystem path to a storage path.
///
/// Returns `None` when the path does not live below `root`.
pub fn absolute_to_storage(root: &Path, absolute: &Path) -> Option<String> {
    let relative = absolute.strip_prefix(root).ok()?;

    let mut storage = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                storage.push('/');
                storage.push_str(&segment.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    Some(normalize_path(&storage))
}

/// Depth of a normalized storage path (root is -1).
pub fn path_depth(path: &str) -> i32 {
    if path == ROOT {
        return -1;
    }
    path.matches('/').count() as i32 - 1
}

/// Ancestor directories of a normalized path, root first, excluding the path itself.
pub fn parent_paths(path: &str) -> Vec<&str> {
    if path == ROOT {
        return Vec::new();
    }

    let mut parents = vec![ROOT];
    for (idx, _) in path.match_indices('/').skip(1) {
        parents.push(&path[..idx]);
    }
    parents
}

/// Containing directory of a normalized path; empty for the root.
pub fn parent_path(path: &str) -> &str {
    if path == ROOT {
        return "";
    }
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

/// Last segment of a normalized path; empty for the root.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Lowercased extension including the leading dot, or empty.
///
/// Leading dots do not start an extension (`.bashrc` has none).
pub fn extension(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// File name without its extension.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Whether `path` lies strictly below the directory `dir`.
pub fn is_descendant(path: &str, dir: &str) -> bool {
    if dir == ROOT {
        return path != ROOT && path.starts_with('/');
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}
