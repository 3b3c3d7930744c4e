//! In-tree SOPS decryption engine for kustomization bundles.
//!
//! The reconciler hands this crate a confined bundle root, a decryption spec,
//! and a client able to resolve the spec's secret reference to raw key
//! material. The engine walks the overlay graph below the entry directory,
//! decrypts file-based secret-generator inputs in place, and exposes an
//! in-memory hook ([`Decryptor::decrypt_resource`]) the downstream builder
//! calls on individual resources.
//!
//! All filesystem access is confined to the bundle root: paths are resolved
//! lexically against the root and symlinks are followed one component at a
//! time, re-rooted so they can never escape.

pub mod decryptor;
pub mod error;
pub mod format;
pub mod keys;
pub mod kustomization;
pub mod paths;
pub mod resource;
pub mod sops;
pub mod walk;

pub use decryptor::{
    Decryption, Decryptor, DecryptorOptions, KeyBundle, KeyBundleClient, SecretRef,
    DECRYPTION_PROVIDER_SOPS, MAX_ENCRYPTED_FILE_SIZE,
};
pub use error::{Error, Result};
pub use format::{format_for_path, probe_format, Format};
pub use kustomization::{
    secure_load_kustomization_file, Kustomization, RECOGNIZED_KUSTOMIZATION_FILE_NAMES,
};
pub use paths::secure_paths;
pub use resource::{is_encrypted_secret, is_sops_encrypted_resource, Resource};
pub use sops::metadata::Metadata;
pub use walk::recurse_kustomization_files;
