//! Envelope recovery metadata: the master keys able to unwrap the data key,
//! the encrypted MAC, and the encryption filters.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::age as age_keys;
use crate::sops::cipher;
use crate::sops::tree::TreeValue;

/// Envelope version stamped on documents this engine encrypts.
pub const SOPS_VERSION: &str = "3.7.3";

/// The `sops` metadata block of an envelope.
///
/// A document with a single key group serializes its master keys in the flat
/// per-backend lists; multiple groups use `key_groups`. Groups are
/// alternatives: any one of them recovering the data key is sufficient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kms: Vec<AwsKmsKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gcp_kms: Vec<GcpKmsKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub azure_kv: Vec<AzureKvKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hc_vault: Vec<VaultTransitKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub age: Vec<AgeKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp: Vec<PgpKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_groups: Vec<KeyGroup>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lastmodified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unencrypted_suffix: Option<String>,
}

/// One OR-branch of recipients able to recover the data key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kms: Vec<AwsKmsKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gcp_kms: Vec<GcpKmsKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub azure_kv: Vec<AzureKvKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hc_vault: Vec<VaultTransitKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub age: Vec<AgeKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp: Vec<PgpKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeKey {
    pub recipient: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PgpKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultTransitKey {
    pub vault_address: String,
    pub engine_path: String,
    pub key_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AzureKvKey {
    pub vault_url: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsKmsKey {
    pub arn: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aws_profile: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcpKmsKey {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

impl Metadata {
    /// All key groups of the document, with the flat master-key lists
    /// presented as a single group when `key_groups` is absent.
    pub fn key_groups(&self) -> Vec<KeyGroup> {
        if !self.key_groups.is_empty() {
            return self.key_groups.clone();
        }
        vec![KeyGroup {
            kms: self.kms.clone(),
            gcp_kms: self.gcp_kms.clone(),
            azure_kv: self.azure_kv.clone(),
            hc_vault: self.hc_vault.clone(),
            age: self.age.clone(),
            pgp: self.pgp.clone(),
        }]
    }

    /// Recover the stored MAC. An empty `mac` entry decrypts to the empty
    /// string, which callers report as the literal `no MAC`.
    pub fn decrypt_mac(&self, data_key: &[u8]) -> Result<String> {
        if self.mac.is_empty() {
            return Ok(String::new());
        }
        match cipher::decrypt_value(&self.mac, data_key, &self.lastmodified) {
            Ok(TreeValue::String(mac)) => Ok(mac),
            Ok(_) => Err(Error::Cipher(
                "failed to verify sops data integrity: mac is not a string".into(),
            )),
            Err(err) => Err(Error::Cipher(format!(
                "failed to verify sops data integrity: {err}"
            ))),
        }
    }

    /// Wrap a freshly generated data key for every declared master key.
    ///
    /// Only age recipients can be wrapped locally; the engine encrypts
    /// exclusively to build fixtures and to support in-cluster re-runs, so a
    /// non-age master key without an existing `enc` entry is an error.
    pub fn wrap_data_key(&mut self, data_key: &[u8]) -> Result<()> {
        if self.key_groups.is_empty() {
            return wrap_group_fields(
                data_key,
                &mut self.age,
                &self.kms,
                &self.gcp_kms,
                &self.azure_kv,
                &self.hc_vault,
                &self.pgp,
            );
        }
        for group in &mut self.key_groups {
            wrap_group_fields(
                data_key,
                &mut group.age,
                &group.kms,
                &group.gcp_kms,
                &group.azure_kv,
                &group.hc_vault,
                &group.pgp,
            )?;
        }
        Ok(())
    }
}

fn wrap_group_fields(
    data_key: &[u8],
    age: &mut [AgeKey],
    kms: &[AwsKmsKey],
    gcp_kms: &[GcpKmsKey],
    azure_kv: &[AzureKvKey],
    hc_vault: &[VaultTransitKey],
    pgp: &[PgpKey],
) -> Result<()> {
    for key in age.iter_mut() {
        if key.enc.is_empty() {
            key.enc = age_keys::encrypt_data_key(&key.recipient, data_key)?;
        }
    }
    let unwrappable = kms.iter().any(|k| k.enc.is_empty())
        || gcp_kms.iter().any(|k| k.enc.is_empty())
        || azure_kv.iter().any(|k| k.enc.is_empty())
        || hc_vault.iter().any(|k| k.enc.is_empty())
        || pgp.iter().any(|k| k.enc.is_empty());
    if unwrappable {
        return Err(Error::Cipher(
            "only age master keys can be wrapped locally".into(),
        ));
    }
    Ok(())
}
