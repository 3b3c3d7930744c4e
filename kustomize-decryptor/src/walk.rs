//! Depth-first traversal of the kustomization overlay graph.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::kustomization::{secure_load_kustomization_file, Kustomization};
use crate::paths::secure_paths;

/// Callback invoked once per kustomization node with the confined root, the
/// node's absolute directory, and its manifest.
pub type Visit<'a> = dyn FnMut(&Path, &Path, &Kustomization) -> Result<()> + 'a;

/// Walk the overlay graph rooted at `root/path`, invoking `visit` on every
/// node reachable through `resources`, `components`, and file-backed
/// `patches`.
///
/// Each directory is visited at most once per `visited` set, keyed by its
/// cleaned absolute path, which also terminates cycles routed through
/// symlinks. Remote references are skipped without being resolved. Errors
/// from `visit` are always fatal; a child entry that turns out not to be a
/// kustomization node (a plain file, a directory without a manifest) is
/// ignored, while the same condition at the entry point fails the walk.
pub fn recurse_kustomization_files(
    root: &Path,
    path: &Path,
    visit: &mut Visit<'_>,
    visited: &mut HashSet<PathBuf>,
) -> Result<()> {
    let (abs_path, rel_path) = secure_paths(root, path)?;

    let info = fs::symlink_metadata(&abs_path).map_err(|source| {
        Error::RecurseIgnore(Box::new(Error::Path {
            op: "lstat",
            path: rel_path.clone(),
            source,
        }))
    })?;
    if !info.is_dir() {
        return Err(Error::RecurseIgnore(Box::new(Error::NotADirectory {
            path: rel_path.clone(),
        })));
    }

    let kus = secure_load_kustomization_file(root, &rel_path).map_err(|err| match err {
        // A directory without a manifest is not a node; the top-level caller
        // still sees this as a fatal "no kustomization file found".
        Error::NoKustomizationFile => Error::RecurseIgnore(Box::new(Error::NoKustomizationFile)),
        other => other,
    })?;

    if !visited.insert(abs_path.clone()) {
        return Ok(());
    }

    debug!(path = %rel_path.display(), "visiting kustomization node");
    visit(root, &abs_path, &kus)?;

    let entries = kus
        .resources
        .iter()
        .chain(kus.components.iter())
        .map(String::as_str)
        .chain(kus.patches.iter().filter_map(|patch| patch.path.as_deref()));
    for entry in entries {
        if is_remote_resource(entry) {
            debug!(%entry, "skipping remote reference");
            continue;
        }
        let child = if rel_path == Path::new("/") {
            PathBuf::from(entry)
        } else {
            rel_path.join(entry)
        };
        match recurse_kustomization_files(root, &child, visit, visited) {
            Err(Error::RecurseIgnore(err)) => {
                debug!(entry = %child.display(), error = %err, "ignoring resource entry");
            }
            Err(other) => return Err(other),
            Ok(()) => {}
        }
    }
    Ok(())
}

/// Remote references carry a URL scheme, a `?ref=` query, or a known
/// hosting-host prefix. They are skipped by the walk, never resolved.
fn is_remote_resource(path: &str) -> bool {
    if Url::parse(path).is_ok() {
        return true;
    }
    if path.contains("?ref=") {
        return true;
    }
    const HOSTING_HOSTS: [&str; 3] = ["github.com/", "gitlab.com/", "bitbucket.org/"];
    HOSTING_HOSTS.iter().any(|host| path.starts_with(host))
}
