#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use age::secrecy::ExposeSecret;
use kustomize_decryptor::decryptor::{
    Decryption, Decryptor, DecryptorOptions, KeyBundle, KeyBundleClient, SecretRef,
    DECRYPTION_PROVIDER_SOPS,
};
use kustomize_decryptor::sops::metadata::{AgeKey, Metadata};
use kustomize_decryptor::{Error, Result};

/// In-memory stand-in for the cluster client resolving decryption secrets.
pub struct MemoryClient {
    name: String,
    bundle: KeyBundle,
}

impl MemoryClient {
    pub fn new(name: &str, entries: impl IntoIterator<Item = (&'static str, Vec<u8>)>) -> Self {
        Self {
            name: name.to_string(),
            bundle: entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn empty() -> Self {
        Self {
            name: String::new(),
            bundle: KeyBundle::new(),
        }
    }
}

impl KeyBundleClient for MemoryClient {
    fn fetch_bundle(&self, name: &str) -> Result<KeyBundle> {
        if !self.name.is_empty() && name == self.name {
            Ok(self.bundle.clone())
        } else {
            Err(Error::SecretNotFound {
                name: name.to_string(),
            })
        }
    }
}

pub fn sops_decryption(secret: &str) -> Option<Decryption> {
    Some(Decryption {
        provider: DECRYPTION_PROVIDER_SOPS.into(),
        secret_ref: Some(SecretRef {
            name: secret.into(),
        }),
    })
}

/// A fresh age identity as (identity file contents, recipient).
pub fn age_identity() -> (String, String) {
    let identity = age::x25519::Identity::generate();
    (
        identity.to_string().expose_secret().to_string(),
        identity.to_public().to_string(),
    )
}

/// A decryptor rooted at `root` with one age identity imported; returns the
/// matching recipient for building fixtures.
pub fn decryptor_with_identity(root: &Path) -> (Decryptor, String) {
    decryptor_with_identity_and_options(root, DecryptorOptions::default())
}

pub fn decryptor_with_identity_and_options(
    root: &Path,
    options: DecryptorOptions,
) -> (Decryptor, String) {
    let (identity, recipient) = age_identity();
    let client = MemoryClient::new("sops-keys", [("age.agekey", identity.into_bytes())]);
    let mut decryptor = Decryptor::new(root, Box::new(client), sops_decryption("sops-keys"), options);
    decryptor.import_keys().expect("import age identity");
    (decryptor, recipient)
}

/// Envelope metadata declaring a single age master key.
pub fn age_metadata(recipient: &str) -> Metadata {
    Metadata {
        age: vec![AgeKey {
            recipient: recipient.to_string(),
            enc: String::new(),
        }],
        ..Metadata::default()
    }
}
