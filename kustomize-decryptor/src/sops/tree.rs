//! The ordered document tree an envelope encrypts, and the walk that
//! encrypts, decrypts, and MAC-hashes its leaves.

use regex::Regex;
use sha2::{Digest, Sha512};

use crate::error::{Error, Result};
use crate::sops::cipher;
use crate::sops::metadata::Metadata;

/// Key suffix marking a subtree as plaintext when no explicit filter is set.
pub const DEFAULT_UNENCRYPTED_SUFFIX: &str = "_unencrypted";

/// A leaf or container value in an envelope document.
///
/// Maps and their entry order are modeled explicitly so walk order (and with
/// it the MAC) is deterministic across load/emit cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Null,
    Sequence(Vec<TreeValue>),
    Branch(TreeBranch),
}

/// One `key: value` entry of a mapping, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeItem {
    pub key: String,
    pub value: TreeValue,
}

pub type TreeBranch = Vec<TreeItem>;

/// A parsed envelope: the document tree plus its recovery metadata.
#[derive(Debug, Clone)]
pub struct Tree {
    pub branch: TreeBranch,
    pub metadata: Metadata,
}

impl Tree {
    /// Encrypt every eligible leaf in place and return the hex-encoded
    /// SHA-512 over the plaintext representation of all leaves, in walk
    /// order.
    pub fn encrypt(&mut self, data_key: &[u8]) -> Result<String> {
        let filter = EncryptionFilter::from_metadata(&self.metadata)?;
        let mut hasher = Sha512::new();
        walk_branch(&mut self.branch, &mut Vec::new(), &mut |value, path| {
            if matches!(value, TreeValue::Null) {
                return Ok(());
            }
            hasher.update(scalar_bytes(value)?);
            if filter.is_encrypted(path) {
                let enc = cipher::encrypt_value(value, data_key, &path_string(path))?;
                *value = TreeValue::String(enc);
            }
            Ok(())
        })?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Decrypt every eligible leaf in place and return the hex-encoded
    /// SHA-512 over the recovered plaintext, computed exactly as
    /// [`Tree::encrypt`] computes it.
    pub fn decrypt(&mut self, data_key: &[u8]) -> Result<String> {
        let filter = EncryptionFilter::from_metadata(&self.metadata)?;
        let mut hasher = Sha512::new();
        walk_branch(&mut self.branch, &mut Vec::new(), &mut |value, path| {
            if matches!(value, TreeValue::Null) {
                return Ok(());
            }
            if filter.is_encrypted(path) {
                let enc = match value {
                    TreeValue::String(s) => s.clone(),
                    _ => {
                        return Err(Error::Cipher(format!(
                            "expected an encrypted value at '{}'",
                            path_string(path)
                        )))
                    }
                };
                *value = cipher::decrypt_value(&enc, data_key, &path_string(path))?;
            }
            hasher.update(scalar_bytes(value)?);
            Ok(())
        })?;
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Decides which tree paths carry ciphertext, from the envelope metadata.
struct EncryptionFilter {
    unencrypted_suffix: String,
    encrypted_regex: Option<Regex>,
}

impl EncryptionFilter {
    fn from_metadata(metadata: &Metadata) -> Result<Self> {
        let encrypted_regex = metadata
            .encrypted_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| Error::Cipher(format!("invalid encrypted_regex: {err}")))?;
        Ok(Self {
            unencrypted_suffix: metadata
                .unencrypted_suffix
                .clone()
                .unwrap_or_else(|| DEFAULT_UNENCRYPTED_SUFFIX.to_string()),
            encrypted_regex,
        })
    }

    fn is_encrypted(&self, path: &[String]) -> bool {
        if path
            .iter()
            .any(|segment| segment.ends_with(&self.unencrypted_suffix))
        {
            return false;
        }
        match &self.encrypted_regex {
            Some(regex) => path.iter().any(|segment| regex.is_match(segment)),
            None => true,
        }
    }
}

/// Visit each leaf value with its key path. Sequence elements share their
/// parent's path, mirroring how the envelope computes additional data.
fn walk_branch<F>(branch: &mut TreeBranch, path: &mut Vec<String>, visit: &mut F) -> Result<()>
where
    F: FnMut(&mut TreeValue, &[String]) -> Result<()>,
{
    for item in branch.iter_mut() {
        path.push(item.key.clone());
        walk_value(&mut item.value, path, visit)?;
        path.pop();
    }
    Ok(())
}

fn walk_value<F>(value: &mut TreeValue, path: &mut Vec<String>, visit: &mut F) -> Result<()>
where
    F: FnMut(&mut TreeValue, &[String]) -> Result<()>,
{
    match value {
        TreeValue::Branch(branch) => walk_branch(branch, path, visit),
        TreeValue::Sequence(items) => {
            for item in items.iter_mut() {
                walk_value(item, path, visit)?;
            }
            Ok(())
        }
        leaf => visit(leaf, path),
    }
}

fn path_string(path: &[String]) -> String {
    let mut out = path.join(":");
    out.push(':');
    out
}

/// Canonical byte representation of a scalar, shared by the MAC hash and
/// the value cipher.
pub(crate) fn scalar_bytes(value: &TreeValue) -> Result<Vec<u8>> {
    match value {
        TreeValue::String(s) => Ok(s.as_bytes().to_vec()),
        TreeValue::Int(i) => Ok(i.to_string().into_bytes()),
        TreeValue::Float(f) => Ok(format!("{f}").into_bytes()),
        TreeValue::Bool(true) => Ok(b"True".to_vec()),
        TreeValue::Bool(false) => Ok(b"False".to_vec()),
        TreeValue::Null | TreeValue::Sequence(_) | TreeValue::Branch(_) => Err(Error::Cipher(
            "cannot take the scalar representation of a non-scalar value".into(),
        )),
    }
}

/// Render a scalar the way the flat stores (dotenv, INI) print it.
pub(crate) fn scalar_string(value: &TreeValue) -> Option<String> {
    match value {
        TreeValue::String(s) => Some(s.clone()),
        TreeValue::Int(i) => Some(i.to_string()),
        TreeValue::Float(f) => Some(format!("{f}")),
        TreeValue::Bool(true) => Some("True".into()),
        TreeValue::Bool(false) => Some("False".into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_key() -> [u8; 32] {
        [7u8; 32]
    }

    fn sample_branch() -> TreeBranch {
        vec![
            TreeItem {
                key: "app".into(),
                value: TreeValue::String("secret".into()),
            },
            TreeItem {
                key: "count".into(),
                value: TreeValue::Int(3),
            },
            TreeItem {
                key: "nested".into(),
                value: TreeValue::Branch(vec![TreeItem {
                    key: "flag".into(),
                    value: TreeValue::Bool(true),
                }]),
            },
        ]
    }

    #[test]
    fn encrypt_decrypt_round_trip_preserves_values_and_mac() {
        let mut tree = Tree {
            branch: sample_branch(),
            metadata: Metadata::default(),
        };
        let mac = tree.encrypt(&data_key()).unwrap();
        assert_ne!(tree.branch, sample_branch());

        let recovered_mac = tree.decrypt(&data_key()).unwrap();
        assert_eq!(tree.branch, sample_branch());
        assert_eq!(mac, recovered_mac);
    }

    #[test]
    fn encrypted_regex_limits_encryption_to_matching_paths() {
        let metadata = Metadata {
            encrypted_regex: Some("^(data|stringData)$".into()),
            ..Metadata::default()
        };
        let mut tree = Tree {
            branch: vec![
                TreeItem {
                    key: "kind".into(),
                    value: TreeValue::String("Secret".into()),
                },
                TreeItem {
                    key: "data".into(),
                    value: TreeValue::Branch(vec![TreeItem {
                        key: "token".into(),
                        value: TreeValue::String("dmFsdWU=".into()),
                    }]),
                },
            ],
            metadata,
        };
        tree.encrypt(&data_key()).unwrap();

        assert_eq!(
            tree.branch[0].value,
            TreeValue::String("Secret".into()),
            "non-matching path must stay plaintext"
        );
        match &tree.branch[1].value {
            TreeValue::Branch(branch) => match &branch[0].value {
                TreeValue::String(s) => assert!(s.starts_with("ENC[AES256_GCM,")),
                other => panic!("unexpected value: {other:?}"),
            },
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn unencrypted_suffix_is_honored() {
        let mut tree = Tree {
            branch: vec![TreeItem {
                key: "comment_unencrypted".into(),
                value: TreeValue::String("visible".into()),
            }],
            metadata: Metadata::default(),
        };
        tree.encrypt(&data_key()).unwrap();
        assert_eq!(tree.branch[0].value, TreeValue::String("visible".into()));
    }

    #[test]
    fn mac_covers_plaintext_of_all_leaves() {
        let mut a = Tree {
            branch: sample_branch(),
            metadata: Metadata::default(),
        };
        let mut b = Tree {
            branch: sample_branch(),
            metadata: Metadata::default(),
        };
        // Different data keys produce different ciphertext but the same MAC.
        let mac_a = a.encrypt(&data_key()).unwrap();
        let mac_b = b.encrypt(&[9u8; 32]).unwrap();
        assert_eq!(mac_a, mac_b);
    }
}
