//! INI store.
//!
//! Sections map to one level of nesting; scalars declared before the first
//! section stay at the top of the tree. Envelope metadata lives in a
//! `[sops]` section with the same flattened keys as the dotenv store.
//! Entries are written as `key = value` with a blank line after each
//! section, so plaintext round trips byte for byte.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::sops::metadata::Metadata;
use crate::sops::stores::flatten;
use crate::sops::stores::Store;
use crate::sops::tree::{scalar_string, Tree, TreeBranch, TreeItem, TreeValue};

const METADATA_SECTION: &str = "sops";

pub struct IniStore;

struct Section {
    name: Option<String>,
    entries: Vec<(String, String)>,
}

impl Store for IniStore {
    fn load_encrypted(&self, data: &[u8]) -> Result<Tree> {
        let mut branch = TreeBranch::new();
        let mut metadata = None;
        for section in parse_sections(data).map_err(malformed)? {
            match section.name.as_deref() {
                Some(METADATA_SECTION) => {
                    let value = flatten::unflatten(&section.entries).map_err(malformed)?;
                    metadata = Some(serde_json::from_value::<Metadata>(value).map_err(malformed)?);
                }
                Some(name) => branch.push(TreeItem {
                    key: name.to_string(),
                    value: TreeValue::Branch(entries_to_branch(section.entries)),
                }),
                None => branch.extend(entries_to_branch(section.entries)),
            }
        }
        let metadata = metadata.ok_or_else(|| malformed("sops metadata not found"))?;
        Ok(Tree { branch, metadata })
    }

    fn load_plain(&self, data: &[u8]) -> Result<TreeBranch> {
        let sections = parse_sections(data).map_err(|reason| Error::InvalidDocument {
            format: Format::Ini,
            reason,
        })?;
        let mut branch = TreeBranch::new();
        for section in sections {
            match section.name {
                Some(name) => branch.push(TreeItem {
                    key: name,
                    value: TreeValue::Branch(entries_to_branch(section.entries)),
                }),
                None => branch.extend(entries_to_branch(section.entries)),
            }
        }
        Ok(branch)
    }

    fn emit_encrypted(&self, tree: &Tree) -> Result<Vec<u8>> {
        let mut out = emit_branch(&tree.branch)?;
        let metadata_value =
            serde_json::to_value(&tree.metadata).map_err(|err| Error::EmitFailed {
                format: Format::Ini,
                reason: err.to_string(),
            })?;
        out.push_str(&format!("[{METADATA_SECTION}]\n"));
        for (key, value) in flatten::flatten(&metadata_value) {
            out.push_str(&format!("{key} = {}\n", escape(&value)));
        }
        out.push('\n');
        Ok(out.into_bytes())
    }

    fn emit_plain(&self, branch: &TreeBranch) -> Result<Vec<u8>> {
        emit_branch(branch).map(String::into_bytes)
    }
}

fn parse_sections(data: &[u8]) -> std::result::Result<Vec<Section>, String> {
    let text = std::str::from_utf8(data).map_err(|_| "data is not valid UTF-8".to_string())?;

    let mut sections: Vec<Section> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }
        if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            sections.push(Section {
                name: Some(name.to_string()),
                entries: Vec::new(),
            });
            continue;
        }
        let (key, value) = trimmed
            .split_once('=')
            .ok_or_else(|| format!("invalid INI line: {line}"))?;
        let entry = (key.trim().to_string(), unescape(unquote(value.trim())));
        match sections.last_mut() {
            Some(section) => section.entries.push(entry),
            None => sections.push(Section {
                name: None,
                entries: vec![entry],
            }),
        }
    }
    Ok(sections)
}

fn entries_to_branch(entries: Vec<(String, String)>) -> TreeBranch {
    entries
        .into_iter()
        .map(|(key, value)| TreeItem {
            key,
            value: TreeValue::String(value),
        })
        .collect()
}

fn emit_branch(branch: &TreeBranch) -> Result<String> {
    let mut top = String::new();
    let mut sections = String::new();
    for item in branch {
        match &item.value {
            TreeValue::Branch(entries) => {
                sections.push_str(&format!("[{}]\n", item.key));
                for entry in entries {
                    let value = scalar_string(&entry.value).ok_or_else(|| nested(&entry.key))?;
                    sections.push_str(&format!("{} = {}\n", entry.key, escape(&value)));
                }
                sections.push('\n');
            }
            other => {
                let value = scalar_string(other).ok_or_else(|| nested(&item.key))?;
                top.push_str(&format!("{} = {}\n", item.key, escape(&value)));
            }
        }
    }
    if !top.is_empty() {
        top.push('\n');
    }
    top.push_str(&sections);
    Ok(top)
}

fn nested(key: &str) -> Error {
    Error::EmitFailed {
        format: Format::Ini,
        reason: format!("value of '{key}' nests deeper than one section"),
    }
}

fn malformed(reason: impl ToString) -> Error {
    Error::MalformedEnvelope {
        format: Format::Ini,
        reason: reason.to_string(),
    }
}

fn escape(value: &str) -> String {
    value.replace('\n', "\\n")
}

fn unescape(value: &str) -> String {
    value.replace("\\n", "\n")
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
