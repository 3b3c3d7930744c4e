//! Confined-root path resolution.
//!
//! Every path the engine touches is resolved through [`secure_paths`]: the
//! input is cleaned lexically against the root (leading `..` components
//! collapse against it, never above it) and symlinks are expanded one
//! component at a time with their targets re-rooted, so the result always
//! stays below the root.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

const MAX_SYMLINK_HOPS: usize = 255;

/// Resolve `path` against `root` and return its absolute and root-relative
/// forms.
///
/// Absolute inputs are first stripped of the root prefix; anything outside
/// the root is treated as root-relative. The absolute result is the
/// symlink-resolved, lexically cleaned join of root and path.
pub fn secure_paths(root: &Path, path: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
    let path = path.as_ref();
    let rel = if path.is_absolute() {
        strip_root(root, path)
    } else {
        path.to_path_buf()
    };
    let abs = secure_join(root, &rel)?;
    let rel = strip_root(root, &abs);
    Ok((abs, rel))
}

/// Join `unsafe_path` below `root` so the result cannot escape it.
///
/// `..` components pop only what was accumulated below the root. Symlinked
/// components are expanded by re-queuing their target, with absolute targets
/// re-rooted, following the same discipline as the component they replace.
/// Resolution is best-effort against concurrent filesystem mutation; the
/// caller's subsequent `lstat` is authoritative.
pub fn secure_join(root: &Path, unsafe_path: &Path) -> Result<PathBuf> {
    let mut queue: VecDeque<OsString> = VecDeque::new();
    push_components(&mut queue, unsafe_path);

    let mut acc = PathBuf::new();
    let mut hops = 0usize;
    while let Some(part) = queue.pop_front() {
        if part == "." || part.is_empty() {
            continue;
        }
        if part == ".." {
            acc.pop();
            continue;
        }

        let candidate = root.join(&acc).join(&part);
        match fs::symlink_metadata(&candidate) {
            Ok(md) if md.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(Error::TooManyLinks {
                        path: unsafe_path.to_path_buf(),
                    });
                }
                let target = fs::read_link(&candidate).map_err(|source| Error::Path {
                    op: "readlink",
                    path: strip_root(root, &candidate),
                    source,
                })?;
                if target.is_absolute() {
                    // An absolute target restarts resolution at the root; a
                    // target already below the root continues with its
                    // in-root remainder.
                    acc.clear();
                    let target = match target.strip_prefix(clean(root)) {
                        Ok(rel) => rel.to_path_buf(),
                        Err(_) => target,
                    };
                    push_components_front(&mut queue, &target);
                } else {
                    push_components_front(&mut queue, &target);
                }
            }
            // Nonexistent components are fine: the caller decides what a
            // missing file means.
            _ => acc.push(&part),
        }
    }

    Ok(clean(&root.join(acc)))
}

/// Render `path` relative to `root`; both are cleaned as absolute paths
/// first. A path equal to the root becomes `/`, a path outside the root is
/// returned unchanged.
pub fn strip_root(root: &Path, path: &Path) -> PathBuf {
    let root = clean(&Path::new("/").join(root));
    let path = clean(&Path::new("/").join(path));
    match path.strip_prefix(&root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        Ok(_) => PathBuf::from("/"),
        Err(_) => path,
    }
}

/// Lexical cleanup: drops `.`, resolves `..` without touching the
/// filesystem. Leading `..` in relative paths collapse to nothing.
pub(crate) fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping at the root (or an empty relative prefix) is a
                // no-op, which is exactly the collapse we want.
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn push_components(queue: &mut VecDeque<OsString>, path: &Path) {
    for comp in path.components() {
        match comp {
            Component::RootDir | Component::Prefix(_) => {}
            other => queue.push_back(other.as_os_str().to_os_string()),
        }
    }
}

fn push_components_front(queue: &mut VecDeque<OsString>, path: &Path) {
    let mut parts: Vec<OsString> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::RootDir | Component::Prefix(_) => {}
            other => parts.push(other.as_os_str().to_os_string()),
        }
    }
    for part in parts.into_iter().rev() {
        queue.push_front(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_to_root() {
        let (abs, rel) = secure_paths(Path::new("/wordir/"), "/wordir/foo/").unwrap();
        assert_eq!(abs, PathBuf::from("/wordir/foo"));
        assert_eq!(rel, PathBuf::from("foo"));
    }

    #[test]
    fn relative_to_root() {
        let (abs, rel) = secure_paths(Path::new("/wordir"), "./foo").unwrap();
        assert_eq!(abs, PathBuf::from("/wordir/foo"));
        assert_eq!(rel, PathBuf::from("foo"));
    }

    #[test]
    fn illegal_traverse_collapses_against_root() {
        let (abs, rel) = secure_paths(Path::new("/wordir/foo"), "../../bar").unwrap();
        assert_eq!(abs, PathBuf::from("/wordir/foo/bar"));
        assert_eq!(rel, PathBuf::from("bar"));
    }

    #[test]
    fn strip_root_of_root_is_slash() {
        assert_eq!(
            strip_root(Path::new("/wordir"), Path::new("/wordir/")),
            PathBuf::from("/")
        );
    }

    #[test]
    fn strip_root_outside_is_unchanged() {
        assert_eq!(
            strip_root(Path::new("/wordir"), Path::new("/other/foo")),
            PathBuf::from("/other/foo")
        );
    }

    #[test]
    fn join_follows_relative_symlink_within_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("other")).unwrap();
        fs::write(root.join("other/data.env"), b"x").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        std::os::unix::fs::symlink("../other/data.env", root.join("sub/link")).unwrap();

        let joined = secure_join(root, Path::new("sub/link")).unwrap();
        assert_eq!(joined, clean(&root.join("other/data.env")));
    }

    #[test]
    fn join_reroots_escaping_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("subdir");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink("../otherdir/data.env", root.join("symlink")).unwrap();

        // The `..` collapses against the root: the target resolves below it
        // and simply does not exist there.
        let joined = secure_join(&root, Path::new("symlink")).unwrap();
        assert_eq!(joined, clean(&root.join("otherdir/data.env")));
    }

    #[test]
    fn join_detects_symlink_loops() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::os::unix::fs::symlink("loop", root.join("loop")).unwrap();

        let err = secure_join(root, Path::new("loop")).unwrap_err();
        assert!(matches!(err, Error::TooManyLinks { .. }));
    }
}
