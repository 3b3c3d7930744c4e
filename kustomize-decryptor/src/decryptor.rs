//! The decryption orchestrator.
//!
//! A [`Decryptor`] is scoped to one reconcile: it owns the confined root (or
//! a scratch copy of it), the key material imported from the decryption
//! secret, and the hooks the walker and the downstream builder call.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::format::{format_for_path, has_marker, probe_format, Format};
use crate::keys::{age as age_keys, aws, azure, gcp, pgp as pgp_keys, vault};
use crate::kustomization::Kustomization;
use crate::paths::{secure_paths, strip_root};
use crate::resource::{is_sops_encrypted_resource, Resource};
use crate::sops::cipher;
use crate::sops::metadata::{KeyGroup, Metadata, SOPS_VERSION};
use crate::sops::stores::store_for;
use crate::sops::tree::{Tree, TreeValue};

/// The only decryption provider the engine implements; anything else is a
/// no-op.
pub const DECRYPTION_PROVIDER_SOPS: &str = "sops";

/// Key bundle entry suffix holding an armored OpenPGP private key.
pub const DECRYPTION_PGP_EXT: &str = ".asc";
/// Key bundle entry suffix holding age identities, one per line.
pub const DECRYPTION_AGE_EXT: &str = ".agekey";
/// Key bundle entry holding a Vault token.
pub const DECRYPTION_VAULT_TOKEN_FILE_NAME: &str = "sops.vault-token";
/// Key bundle entry holding the Azure service-principal config.
pub const DECRYPTION_AZURE_AUTH_FILE: &str = "sops.azure-kv";
/// Key bundle entry holding AWS credentials.
pub const DECRYPTION_AWS_KMS_FILE: &str = "sops.aws-kms";
/// Key bundle entry holding the GCP service-account blob.
pub const DECRYPTION_GCP_CREDS_FILE: &str = "sops.gcp-kms";

/// Default ceiling for files the engine is willing to decrypt in place.
pub const MAX_ENCRYPTED_FILE_SIZE: u64 = 5 << 20;

/// The decryption spec attached to the reconciled object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decryption {
    pub provider: String,
    #[serde(rename = "secretRef", default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

/// Reference to the secret holding the key bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
}

/// A flat filename → bytes key bundle.
pub type KeyBundle = BTreeMap<String, Vec<u8>>;

/// Resolves a decryption secret reference to its raw key bundle.
///
/// Implementations return [`Error::SecretNotFound`] when the reference does
/// not resolve.
pub trait KeyBundleClient {
    fn fetch_bundle(&self, name: &str) -> Result<KeyBundle>;
}

/// Tunables of one decryptor instance.
#[derive(Debug, Clone)]
pub struct DecryptorOptions {
    /// Verify the envelope MAC after decrypting a document.
    pub check_sops_mac: bool,
    /// Refuse to decrypt files larger than this.
    pub max_file_size: u64,
    /// Name prefix of the scratch directory created by [`Decryptor::tmp`].
    pub scratch_prefix: String,
}

impl Default for DecryptorOptions {
    fn default() -> Self {
        Self {
            check_sops_mac: true,
            max_file_size: MAX_ENCRYPTED_FILE_SIZE,
            scratch_prefix: "decryptor".into(),
        }
    }
}

/// Per-reconcile decryption engine.
pub struct Decryptor {
    root: PathBuf,
    // Held for its Drop: removing the scratch tree is unconditional.
    _scratch: Option<TempDir>,
    client: Box<dyn KeyBundleClient>,
    decryption: Option<Decryption>,
    check_sops_mac: bool,
    max_file_size: u64,
    age_identities: age_keys::ParsedIdentities,
    pgp_keyring: pgp_keys::PgpKeyring,
    vault_token: Option<String>,
    azure_credentials: Option<azure::KvCredentials>,
    aws_credentials: Option<aws::AwsCredentials>,
    gcp_credentials: Option<gcp::GcpCredentials>,
}

impl Decryptor {
    /// Build a decryptor over an existing confined root.
    pub fn new(
        root: impl Into<PathBuf>,
        client: Box<dyn KeyBundleClient>,
        decryption: Option<Decryption>,
        options: DecryptorOptions,
    ) -> Self {
        Self {
            root: root.into(),
            _scratch: None,
            client,
            decryption,
            check_sops_mac: options.check_sops_mac,
            max_file_size: options.max_file_size,
            age_identities: age_keys::ParsedIdentities::default(),
            pgp_keyring: pgp_keys::PgpKeyring::default(),
            vault_token: None,
            azure_credentials: None,
            aws_credentials: None,
            gcp_credentials: None,
        }
    }

    /// Build a decryptor over a fresh scratch directory. The directory is
    /// removed when the decryptor is dropped; the caller copies the bundle
    /// into [`Decryptor::root`] before walking it.
    pub fn tmp(
        client: Box<dyn KeyBundleClient>,
        decryption: Option<Decryption>,
        options: DecryptorOptions,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", options.scratch_prefix))
            .tempdir()
            .map_err(|source| Error::Path {
                op: "mkdir",
                path: PathBuf::from(&options.scratch_prefix),
                source,
            })?;
        let mut decryptor = Self::new(scratch.path().to_path_buf(), client, decryption, options);
        decryptor._scratch = Some(scratch);
        Ok(decryptor)
    }

    /// The confined root all on-disk operations are bounded by.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn age_identity_count(&self) -> usize {
        self.age_identities.len()
    }

    pub fn pgp_key_count(&self) -> usize {
        self.pgp_keyring.len()
    }

    pub fn vault_token(&self) -> Option<&str> {
        self.vault_token.as_deref()
    }

    pub fn has_azure_credentials(&self) -> bool {
        self.azure_credentials.is_some()
    }

    pub fn has_aws_credentials(&self) -> bool {
        self.aws_credentials.is_some()
    }

    pub fn has_gcp_credentials(&self) -> bool {
        self.gcp_credentials.is_some()
    }

    fn is_sops_provider(&self) -> bool {
        self.decryption
            .as_ref()
            .map(|decryption| decryption.provider == DECRYPTION_PROVIDER_SOPS)
            .unwrap_or(false)
    }

    /// Load the key bundle referenced by the decryption spec into memory.
    ///
    /// No spec, no secret reference, or an unrecognized provider are
    /// no-ops. Entries are classified by filename; the first entry that
    /// fails to parse aborts the import, leaving earlier entries in place.
    pub fn import_keys(&mut self) -> Result<()> {
        let Some(decryption) = self.decryption.clone() else {
            return Ok(());
        };
        let Some(secret_ref) = decryption.secret_ref else {
            return Ok(());
        };
        if decryption.provider != DECRYPTION_PROVIDER_SOPS {
            return Ok(());
        }

        let bundle = self.client.fetch_bundle(&secret_ref.name)?;
        for (name, value) in &bundle {
            if name.ends_with(DECRYPTION_PGP_EXT) {
                self.pgp_keyring
                    .import(&String::from_utf8_lossy(value))
                    .map_err(|err| import_error(name, err))?;
                debug!(entry = %name, "imported OpenPGP private key");
            } else if name.ends_with(DECRYPTION_AGE_EXT) {
                self.age_identities
                    .import(&String::from_utf8_lossy(value))
                    .map_err(|err| import_error(name, err))?;
                debug!(entry = %name, "imported age identities");
            } else {
                match name.as_str() {
                    DECRYPTION_VAULT_TOKEN_FILE_NAME => {
                        let token = String::from_utf8_lossy(value).trim_matches('\n').to_string();
                        self.vault_token = Some(token);
                    }
                    DECRYPTION_AZURE_AUTH_FILE => {
                        let credentials =
                            azure::load_aad_config(value).map_err(|err| import_error(name, err))?;
                        self.azure_credentials = Some(credentials);
                    }
                    DECRYPTION_AWS_KMS_FILE => {
                        let credentials = aws::load_aws_credentials(value)
                            .map_err(|err| import_error(name, err))?;
                        self.aws_credentials = Some(credentials);
                    }
                    DECRYPTION_GCP_CREDS_FILE => {
                        self.gcp_credentials = Some(gcp::GcpCredentials::new(value));
                    }
                    _ => trace!(entry = %name, "ignoring unrecognized key bundle entry"),
                }
            }
        }
        Ok(())
    }

    /// The in-memory hook the downstream builder calls on every resource.
    ///
    /// Returns `Ok(None)` when the engine has nothing to do (no spec,
    /// foreign provider, or a resource that is neither an envelope nor a
    /// `Secret`), in which case the caller keeps the input. Plaintext
    /// resources come back unchanged, making the hook idempotent.
    pub fn decrypt_resource(&self, resource: &Resource) -> Result<Option<Resource>> {
        if !self.is_sops_provider() {
            return Ok(None);
        }

        if is_sops_encrypted_resource(resource) {
            let data = serde_json::to_vec_pretty(resource)
                .map_err(|err| Error::Cipher(format!("failed to marshal resource: {err}")))?;
            let out = self.sops_decrypt_with_format(&data, Format::Json, Format::Json)?;
            let decrypted: Resource = serde_json::from_slice(&out)
                .map_err(|err| Error::Cipher(format!("failed to unmarshal resource: {err}")))?;
            return Ok(Some(decrypted));
        }

        if resource.get("kind").and_then(Value::as_str) == Some("Secret") {
            let mut resource = resource.clone();
            if let Some(data) = resource.get_mut("data").and_then(Value::as_object_mut) {
                for (key, value) in data.iter_mut() {
                    let Some(encoded) = value.as_str() else {
                        continue;
                    };
                    let bytes =
                        STANDARD
                            .decode(encoded)
                            .map_err(|err| Error::SecretDataDecode {
                                key: key.clone(),
                                reason: err.to_string(),
                            })?;
                    if let Some(input_format) = probe_format(&bytes) {
                        let output_format = format_for_path(Path::new(key));
                        let out =
                            self.sops_decrypt_with_format(&bytes, input_format, output_format)?;
                        *value = Value::String(STANDARD.encode(out));
                    }
                }
            }
            if let Some(string_data) = resource
                .get_mut("stringData")
                .and_then(Value::as_object_mut)
            {
                for (key, value) in string_data.iter_mut() {
                    let Some(text) = value.as_str() else {
                        continue;
                    };
                    if let Some(input_format) = probe_format(text.as_bytes()) {
                        let output_format = format_for_path(Path::new(key));
                        let out = self.sops_decrypt_with_format(
                            text.as_bytes(),
                            input_format,
                            output_format,
                        )?;
                        let out = String::from_utf8(out).map_err(|_| {
                            Error::SecretDataDecode {
                                key: key.clone(),
                                reason: "decrypted stringData is not valid UTF-8".into(),
                            }
                        })?;
                        *value = Value::String(out);
                    }
                }
            }
            return Ok(Some(resource));
        }

        Ok(None)
    }

    /// Decrypt a whole envelope: parse `data` as `input_format`, recover the
    /// data key, decrypt the tree, verify the MAC when configured, and
    /// re-serialize as `output_format`.
    pub fn sops_decrypt_with_format(
        &self,
        data: &[u8],
        input_format: Format,
        output_format: Format,
    ) -> Result<Vec<u8>> {
        let mut tree = store_for(input_format).load_encrypted(data)?;
        let data_key = self.sops_data_key(&tree.metadata)?;
        let computed_mac = tree.decrypt(&data_key)?;

        if self.check_sops_mac {
            let stored_mac = tree.metadata.decrypt_mac(&data_key)?;
            if stored_mac != computed_mac {
                let expected = if stored_mac.is_empty() {
                    "no MAC".to_string()
                } else {
                    stored_mac
                };
                return Err(Error::MacMismatch {
                    expected,
                    computed: computed_mac,
                });
            }
        }

        store_for(output_format).emit_plain(&tree.branch)
    }

    /// Encrypt `data` into an envelope. Counterpart of
    /// [`Decryptor::sops_decrypt_with_format`], used to build fixtures;
    /// only age master keys can be wrapped locally.
    pub fn sops_encrypt_with_format(
        &self,
        metadata: Metadata,
        data: &[u8],
        input_format: Format,
        output_format: Format,
    ) -> Result<Vec<u8>> {
        let branch = store_for(input_format).load_plain(data)?;
        let mut tree = Tree { branch, metadata };

        let mut data_key = [0u8; 32];
        rand::rng().fill_bytes(&mut data_key);
        tree.metadata.wrap_data_key(&data_key)?;

        let mac = tree.encrypt(&data_key)?;
        if tree.metadata.lastmodified.is_empty() {
            tree.metadata.lastmodified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        }
        tree.metadata.mac = cipher::encrypt_value(
            &TreeValue::String(mac),
            &data_key,
            &tree.metadata.lastmodified,
        )?;
        if tree.metadata.version.is_empty() {
            tree.metadata.version = SOPS_VERSION.into();
        }

        store_for(output_format).emit_encrypted(&tree)
    }

    /// Decrypt a file in place, if it carries the marker of `input_format`.
    ///
    /// The target must be a regular file below the size limit; symlinks and
    /// other irregular files are refused. A file without the marker is left
    /// untouched. The plaintext is materialized in memory and written back
    /// with a single write.
    pub fn sops_decrypt_file(
        &self,
        path: &Path,
        input_format: Format,
        output_format: Format,
    ) -> Result<()> {
        let rel = strip_root(&self.root, path);
        let info = fs::symlink_metadata(path).map_err(|source| Error::Path {
            op: "lstat",
            path: rel.clone(),
            source,
        })?;
        if !info.file_type().is_file() {
            return Err(Error::IrregularFile);
        }
        if info.len() > self.max_file_size {
            return Err(Error::FileTooLarge {
                size: info.len(),
                limit: self.max_file_size,
            });
        }

        let data = fs::read(path).map_err(|source| Error::Path {
            op: "read",
            path: rel.clone(),
            source,
        })?;

        let (mut input_format, mut output_format) = (input_format, output_format);
        // Env sources keep the dotenv extension whatever their content; a
        // foreign envelope inside one is decrypted in its detected format.
        if input_format == Format::Dotenv && !has_marker(&data, Format::Dotenv) {
            if let Some(detected) = probe_format(&data) {
                trace!(path = %rel.display(), %detected, "detected foreign envelope format");
                input_format = detected;
                output_format = detected;
            }
        }
        if !has_marker(&data, input_format) {
            return Ok(());
        }

        let out = self.sops_decrypt_with_format(&data, input_format, output_format)?;
        fs::write(path, out).map_err(|source| Error::Path {
            op: "write",
            path: rel,
            source,
        })
    }

    /// Build the visit hook that decrypts every file-based secret-generator
    /// input of a node, in declaration order, deduplicated through
    /// `visited` (keyed by resolved absolute path).
    pub fn decrypt_kustomization_env_sources<'a>(
        &'a self,
        visited: &'a RefCell<HashSet<PathBuf>>,
    ) -> impl FnMut(&Path, &Path, &Kustomization) -> Result<()> + 'a {
        move |root, path, kus| {
            let (_, rel_node) = secure_paths(root, path)?;
            for generator in &kus.secret_generator {
                for source in generator.files.iter().chain(generator.envs.iter()) {
                    let source = source
                        .split_once('=')
                        .map_or(source.as_str(), |(_, file)| file);
                    let joined = if rel_node == Path::new("/") {
                        PathBuf::from(source)
                    } else {
                        rel_node.join(source)
                    };
                    let (abs, rel) = secure_paths(root, &joined)?;
                    if visited.borrow().contains(&abs) {
                        continue;
                    }
                    let format = format_for_path(&abs);
                    debug!(path = %rel.display(), "decrypting kustomization env source");
                    self.sops_decrypt_file(&abs, format, format)?;
                    visited.borrow_mut().insert(abs);
                }
            }
            Ok(())
        }
    }

    /// Recover the envelope data key by trying every key group in order.
    fn sops_data_key(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        for group in metadata.key_groups() {
            if let Some(data_key) = self.try_key_group(&group) {
                return Ok(data_key);
            }
        }
        Err(Error::NoDataKey)
    }

    fn try_key_group(&self, group: &KeyGroup) -> Option<Vec<u8>> {
        for key in &group.age {
            if key.enc.is_empty() {
                continue;
            }
            match self.age_identities.decrypt(&key.enc) {
                Ok(data_key) if is_data_key(&data_key) => return Some(data_key),
                Ok(_) => trace!(recipient = %key.recipient, "discarding data key of wrong length"),
                Err(err) => {
                    trace!(recipient = %key.recipient, error = %err, "age master key failed")
                }
            }
        }
        for key in &group.pgp {
            if key.enc.is_empty() || self.pgp_keyring.is_empty() {
                continue;
            }
            match self.pgp_keyring.decrypt(&key.enc) {
                Ok(data_key) if is_data_key(&data_key) => return Some(data_key),
                Ok(_) => trace!(fp = %key.fp, "discarding data key of wrong length"),
                Err(err) => trace!(fp = %key.fp, error = %err, "pgp master key failed"),
            }
        }
        for key in &group.hc_vault {
            let Some(token) = &self.vault_token else {
                continue;
            };
            match vault::unwrap_data_key(key, token) {
                Ok(data_key) if is_data_key(&data_key) => return Some(data_key),
                Ok(_) => trace!(address = %key.vault_address, "discarding data key of wrong length"),
                Err(err) => {
                    trace!(address = %key.vault_address, error = %err, "vault master key failed")
                }
            }
        }
        for key in &group.azure_kv {
            let Some(credentials) = &self.azure_credentials else {
                continue;
            };
            match azure::unwrap_data_key(key, credentials) {
                Ok(data_key) if is_data_key(&data_key) => return Some(data_key),
                Ok(_) => trace!(vault_url = %key.vault_url, "discarding data key of wrong length"),
                Err(err) => {
                    trace!(vault_url = %key.vault_url, error = %err, "azure master key failed")
                }
            }
        }
        for key in &group.kms {
            let Some(credentials) = &self.aws_credentials else {
                continue;
            };
            match aws::unwrap_data_key(key, credentials) {
                Ok(data_key) if is_data_key(&data_key) => return Some(data_key),
                Ok(_) => trace!(arn = %key.arn, "discarding data key of wrong length"),
                Err(err) => trace!(arn = %key.arn, error = %err, "aws master key failed"),
            }
        }
        for key in &group.gcp_kms {
            let Some(credentials) = &self.gcp_credentials else {
                continue;
            };
            match gcp::unwrap_data_key(key, credentials) {
                Ok(data_key) if is_data_key(&data_key) => return Some(data_key),
                Ok(_) => trace!(resource_id = %key.resource_id, "discarding data key of wrong length"),
                Err(err) => {
                    trace!(resource_id = %key.resource_id, error = %err, "gcp master key failed")
                }
            }
        }
        None
    }
}

fn is_data_key(candidate: &[u8]) -> bool {
    candidate.len() == 32
}

fn import_error(name: &str, source: Error) -> Error {
    Error::KeyImport {
        name: name.to_string(),
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use age::secrecy::ExposeSecret;

    /// In-memory client resolving a single named bundle.
    pub(crate) struct MemoryClient {
        name: String,
        bundle: KeyBundle,
    }

    impl MemoryClient {
        pub(crate) fn new(
            name: &str,
            entries: impl IntoIterator<Item = (&'static str, Vec<u8>)>,
        ) -> Self {
            Self {
                name: name.to_string(),
                bundle: entries
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value))
                    .collect(),
            }
        }

        pub(crate) fn empty() -> Self {
            Self {
                name: String::new(),
                bundle: KeyBundle::new(),
            }
        }
    }

    impl KeyBundleClient for MemoryClient {
        fn fetch_bundle(&self, name: &str) -> Result<KeyBundle> {
            if name == self.name && !self.name.is_empty() {
                Ok(self.bundle.clone())
            } else {
                Err(Error::SecretNotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    fn sops_decryption(secret: &str) -> Option<Decryption> {
        Some(Decryption {
            provider: DECRYPTION_PROVIDER_SOPS.into(),
            secret_ref: Some(SecretRef {
                name: secret.into(),
            }),
        })
    }

    fn age_key_bytes() -> Vec<u8> {
        let identity = age::x25519::Identity::generate();
        identity.to_string().expose_secret().as_bytes().to_vec()
    }

    #[test]
    fn import_age_key() {
        let client = MemoryClient::new("age-secret", [("age.agekey", age_key_bytes())]);
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("age-secret"),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
        assert_eq!(decryptor.age_identity_count(), 1);
    }

    #[test]
    fn import_age_key_error_leaves_no_identities() {
        let client = MemoryClient::new("age-secret", [("age.agekey", b"not-a-valid-key".to_vec())]);
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("age-secret"),
            DecryptorOptions::default(),
        );
        let err = decryptor.import_keys().unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to import 'age.agekey' data"));
        assert_eq!(decryptor.age_identity_count(), 0);
    }

    #[test]
    fn import_pgp_key_error() {
        let client = MemoryClient::new(
            "pgp-secret",
            [("pgp.asc", b"not-a-valid-armored-key".to_vec())],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("pgp-secret"),
            DecryptorOptions::default(),
        );
        assert!(decryptor.import_keys().is_err());
        assert_eq!(decryptor.pgp_key_count(), 0);
    }

    #[test]
    fn import_vault_token() {
        let client = MemoryClient::new(
            "hcvault-secret",
            [("sops.vault-token", b"some-hcvault-token\n".to_vec())],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("hcvault-secret"),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
        assert_eq!(decryptor.vault_token(), Some("some-hcvault-token"));
    }

    #[test]
    fn import_azure_config() {
        let client = MemoryClient::new(
            "azkv-secret",
            [(
                "sops.azure-kv",
                b"tenantId: some-tenant-id\nclientId: some-client-id\nclientSecret: some-client-secret".to_vec(),
            )],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("azkv-secret"),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
        assert!(decryptor.has_azure_credentials());
    }

    #[test]
    fn import_azure_config_parse_error() {
        let client = MemoryClient::new(
            "azkv-secret",
            [("sops.azure-kv", br#"{"malformed\: JSON"}"#.to_vec())],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("azkv-secret"),
            DecryptorOptions::default(),
        );
        assert!(decryptor.import_keys().is_err());
        assert!(!decryptor.has_azure_credentials());
    }

    #[test]
    fn import_azure_config_unsupported() {
        let client = MemoryClient::new(
            "azkv-secret",
            [("sops.azure-kv", b"tenantId: incomplete".to_vec())],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("azkv-secret"),
            DecryptorOptions::default(),
        );
        assert!(decryptor.import_keys().is_err());
        assert!(!decryptor.has_azure_credentials());
    }

    #[test]
    fn import_aws_and_gcp_entries() {
        let client = MemoryClient::new(
            "cloud-secret",
            [
                (
                    "sops.aws-kms",
                    b"aws_access_key_id: AKIAEXAMPLE\naws_secret_access_key: secret\n".to_vec(),
                ),
                (
                    "sops.gcp-kms",
                    b"{\"type\": \"service_account\"}\n".to_vec(),
                ),
            ],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("cloud-secret"),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
        assert!(decryptor.has_aws_credentials());
        assert!(decryptor.has_gcp_credentials());
    }

    #[test]
    fn import_multiple_entries() {
        let client = MemoryClient::new(
            "multiple-secret",
            [
                ("age.agekey", age_key_bytes()),
                ("sops.vault-token", b"some-hcvault-token".to_vec()),
            ],
        );
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(client),
            sops_decryption("multiple-secret"),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
        assert_eq!(decryptor.age_identity_count(), 1);
        assert_eq!(decryptor.vault_token(), Some("some-hcvault-token"));
    }

    #[test]
    fn import_without_decryption_spec_is_a_noop() {
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(MemoryClient::empty()),
            None,
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
    }

    #[test]
    fn import_without_secret_ref_is_a_noop() {
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(MemoryClient::empty()),
            Some(Decryption {
                provider: DECRYPTION_PROVIDER_SOPS.into(),
                secret_ref: None,
            }),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
    }

    #[test]
    fn import_missing_secret_is_not_found() {
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(MemoryClient::empty()),
            sops_decryption("does-not-exist"),
            DecryptorOptions::default(),
        );
        let err = decryptor.import_keys().unwrap_err();
        assert!(matches!(err, Error::SecretNotFound { .. }));
    }

    #[test]
    fn import_with_unimplemented_provider_is_a_noop() {
        let mut decryptor = Decryptor::new(
            "/tmp",
            Box::new(MemoryClient::empty()),
            Some(Decryption {
                provider: "not-supported".into(),
                secret_ref: Some(SecretRef {
                    name: "ignored".into(),
                }),
            }),
            DecryptorOptions::default(),
        );
        decryptor.import_keys().unwrap();
    }

    #[test]
    fn tmp_scratch_directory_is_removed_on_drop() {
        let decryptor = Decryptor::tmp(
            Box::new(MemoryClient::empty()),
            None,
            DecryptorOptions::default(),
        )
        .unwrap();
        let root = decryptor.root().to_path_buf();
        assert!(root.exists());
        drop(decryptor);
        assert!(!root.exists());
    }
}
