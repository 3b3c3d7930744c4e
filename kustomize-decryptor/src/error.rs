use std::path::PathBuf;

use thiserror::Error;

use crate::format::Format;

/// Result alias for decryption engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error surface of the decryption engine.
///
/// Display strings are part of the contract: callers and events surface them
/// verbatim, and several name the first failing path relative to the
/// confined root.
#[derive(Debug, Error)]
pub enum Error {
    #[error("path '{}' escapes the confined root", path.display())]
    PathEscape { path: PathBuf },

    #[error("evaluating symlinks in '{}': too many links", path.display())]
    TooManyLinks { path: PathBuf },

    #[error("{op} {}: {source}", path.display())]
    Path {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decrypt irregular file as it has file mode type bits set")]
    IrregularFile,

    #[error("cannot decrypt file with size ({size} bytes) exceeding limit ({limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("failed to load encrypted {format} data: {reason}")]
    MalformedEnvelope { format: Format, reason: String },

    #[error("failed to load {format} data: {reason}")]
    InvalidDocument { format: Format, reason: String },

    #[error("failed to emit {format} data: {reason}")]
    EmitFailed { format: Format, reason: String },

    #[error("cannot get sops data key")]
    NoDataKey,

    #[error("failed to verify sops data integrity: expected mac '{expected}', not '{computed}'")]
    MacMismatch { expected: String, computed: String },

    #[error("failed to decrypt sops data: {0}")]
    Cipher(String),

    #[error("failed to import '{name}' data from sops decryption secret: {source}")]
    KeyImport {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("cannot get sops decryption secret '{name}': not found")]
    SecretNotFound { name: String },

    #[error("unsupported decryption key configuration: {0}")]
    UnsupportedConfig(String),

    #[error("{backend} key service call failed: {reason}")]
    KeyService { backend: &'static str, reason: String },

    #[error("path '{0}' must be relative")]
    AbsoluteManifestPath(String),

    #[error("no kustomization file found")]
    NoKustomizationFile,

    #[error("found multiple kustomization files")]
    MultipleKustomizationFiles,

    #[error("failed to unmarshal kustomization file: {0}")]
    InvalidKustomizationFile(String),

    #[error("'{}' is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to base64 decode Secret data field '{key}': {reason}")]
    SecretDataDecode { key: String, reason: String },

    /// Walker-internal marker: the wrapped error means the descended entry
    /// was not a kustomization node. Swallowed for child entries, fatal at
    /// the top of a walk.
    #[error(transparent)]
    RecurseIgnore(Box<Error>),
}

impl Error {
    /// Whether the walker may swallow this error for a child entry.
    pub fn is_recurse_ignore(&self) -> bool {
        matches!(self, Error::RecurseIgnore(_))
    }
}
