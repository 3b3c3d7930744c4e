//! Kustomization manifests: the on-disk model and confined loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::{secure_join, strip_root};

/// Manifest file names a node may carry. Exactly one must be present.
pub const RECOGNIZED_KUSTOMIZATION_FILE_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// The subset of a kustomization manifest the decryption engine consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Kustomization {
    #[serde(rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
    #[serde(rename = "secretGenerator", skip_serializing_if = "Vec::is_empty")]
    pub secret_generator: Vec<SecretArgs>,
}

/// A patch entry; only file-backed patches matter to the walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_yaml::Value>,
}

/// A secret generator and its file-based inputs. Source entries may carry a
/// `key=` prefix naming the generated key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
}

/// Load the single recognized manifest at `root/path`.
///
/// `path` must be relative. Candidate names are resolved under the confined
/// root, so a manifest symlinked out of it is simply not found. Two
/// recognized names at one node are a fatal ambiguity.
pub fn secure_load_kustomization_file(
    root: &Path,
    path: impl AsRef<Path>,
) -> Result<Kustomization> {
    let path = path.as_ref();
    if path.is_absolute() && path != Path::new("/") {
        return Err(Error::AbsoluteManifestPath(path.display().to_string()));
    }
    let path = if path == Path::new("/") {
        Path::new("")
    } else {
        path
    };

    let mut load_path = None;
    for name in RECOGNIZED_KUSTOMIZATION_FILE_NAMES {
        let candidate = match secure_join(root, &path.join(name)) {
            Ok(candidate) => candidate,
            // Unresolvable candidates (symlink loops) count as absent.
            Err(_) => continue,
        };
        if fs::symlink_metadata(&candidate).is_ok() {
            if load_path.is_some() {
                return Err(Error::MultipleKustomizationFiles);
            }
            load_path = Some(candidate);
        }
    }
    let load_path = load_path.ok_or(Error::NoKustomizationFile)?;

    let data = fs::read(&load_path).map_err(|source| Error::Path {
        op: "read",
        path: strip_root(root, &load_path),
        source,
    })?;
    serde_yaml::from_slice(&data).map_err(|err| Error::InvalidKustomizationFile(err.to_string()))
}
