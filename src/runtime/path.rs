//! Path utility functions for normalization and comparison.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Keep `..` when there is nothing left to pop (relative paths, root)
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Check if a path is under a given directory by comparing normalized path components.
/// Returns true if `path` is under `dir` (i.e., `dir` is a prefix of `path`).
///
/// `~/.verman/julia/untar/../../../etc` is NOT under `~/.verman/julia`.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    let normalized_path = normalize_path(path);
    let normalized_dir = normalize_path(dir);

    let path_components: Vec<_> = normalized_path.components().collect();
    let dir_components: Vec<_> = normalized_dir.components().collect();

    if path_components.len() < dir_components.len() {
        return false;
    }

    dir_components
        .iter()
        .zip(path_components.iter())
        .all(|(d, p)| d == p)
}

/// Check that `path` names an entry directly inside `dir`, after lexical
/// normalization. `dir` itself and anything deeper or outside are rejected.
pub fn is_direct_child(path: &Path, dir: &Path) -> bool {
    let normalized_path = normalize_path(path);
    matches!(normalized_path.components().next_back(), Some(Component::Normal(_)))
        && normalized_path.parent() == Some(normalize_path(dir).as_path())
}

/// Calculate the relative path from a symlink location to a target.
///
/// For the active-version link `~/.verman/julia/current` pointing at
/// `~/.verman/julia/untar/1.9.3/julia-1.9.3`, this returns `untar/1.9.3/julia-1.9.3`,
/// so the whole toolchain home can be moved without breaking the link.
///
/// Returns `None` if a relative path cannot be computed (e.g., different drive letters on Windows).
pub fn relative_symlink_path(from_link: &Path, to_target: &Path) -> Option<PathBuf> {
    let from_dir = from_link.parent()?;
    let result = pathdiff::diff_paths(to_target, from_dir)?;

    if result.is_absolute() {
        return None;
    }

    Some(result)
}
