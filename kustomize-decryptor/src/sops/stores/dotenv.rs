//! dotenv store.
//!
//! Data entries are plain `key=value` lines; envelope metadata is appended
//! as `sops_`-prefixed flattened pairs (`sops_age__list_0__map_enc=…`,
//! `sops_mac=ENC[…]`). Embedded newlines are escaped as `\n`. Comment lines
//! are dropped.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::sops::metadata::Metadata;
use crate::sops::stores::flatten;
use crate::sops::stores::Store;
use crate::sops::tree::{scalar_string, Tree, TreeBranch, TreeItem, TreeValue};

const METADATA_PREFIX: &str = "sops_";

pub struct DotenvStore;

impl Store for DotenvStore {
    fn load_encrypted(&self, data: &[u8]) -> Result<Tree> {
        let mut branch = TreeBranch::new();
        let mut metadata_pairs = Vec::new();
        for (key, value) in parse_lines(data).map_err(malformed)? {
            match key.strip_prefix(METADATA_PREFIX) {
                Some(metadata_key) => metadata_pairs.push((metadata_key.to_string(), value)),
                None => branch.push(TreeItem {
                    key,
                    value: TreeValue::String(value),
                }),
            }
        }
        if metadata_pairs.is_empty() {
            return Err(malformed("sops metadata not found"));
        }
        let metadata_value = flatten::unflatten(&metadata_pairs).map_err(malformed)?;
        let metadata: Metadata = serde_json::from_value(metadata_value).map_err(malformed)?;
        Ok(Tree { branch, metadata })
    }

    fn load_plain(&self, data: &[u8]) -> Result<TreeBranch> {
        Ok(parse_lines(data)
            .map_err(|reason| Error::InvalidDocument {
                format: Format::Dotenv,
                reason,
            })?
            .into_iter()
            .map(|(key, value)| TreeItem {
                key,
                value: TreeValue::String(value),
            })
            .collect())
    }

    fn emit_encrypted(&self, tree: &Tree) -> Result<Vec<u8>> {
        let mut out = emit_branch(&tree.branch)?;
        let metadata_value = serde_json::to_value(&tree.metadata).map_err(|err| {
            Error::EmitFailed {
                format: Format::Dotenv,
                reason: err.to_string(),
            }
        })?;
        for (key, value) in flatten::flatten(&metadata_value) {
            out.push_str(METADATA_PREFIX);
            out.push_str(&key);
            out.push('=');
            out.push_str(&escape(&value));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn emit_plain(&self, branch: &TreeBranch) -> Result<Vec<u8>> {
        emit_branch(branch).map(String::into_bytes)
    }
}

fn parse_lines(data: &[u8]) -> std::result::Result<Vec<(String, String)>, String> {
    let text = std::str::from_utf8(data).map_err(|_| "data is not valid UTF-8".to_string())?;
    let mut pairs = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("invalid dotenv line: {line}"))?;
        pairs.push((key.to_string(), unescape(value)));
    }
    Ok(pairs)
}

fn emit_branch(branch: &TreeBranch) -> Result<String> {
    let mut out = String::new();
    for item in branch {
        let value = scalar_string(&item.value).ok_or_else(|| Error::EmitFailed {
            format: Format::Dotenv,
            reason: format!("value of '{}' is not a scalar", item.key),
        })?;
        out.push_str(&item.key);
        out.push('=');
        out.push_str(&escape(&value));
        out.push('\n');
    }
    Ok(out)
}

fn malformed(reason: impl ToString) -> Error {
    Error::MalformedEnvelope {
        format: Format::Dotenv,
        reason: reason.to_string(),
    }
}

fn escape(value: &str) -> String {
    value.replace('\n', "\\n")
}

fn unescape(value: &str) -> String {
    value.replace("\\n", "\n")
}
