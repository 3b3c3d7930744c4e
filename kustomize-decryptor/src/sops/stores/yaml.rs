//! YAML store.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::sops::metadata::Metadata;
use crate::sops::stores::Store;
use crate::sops::tree::{Tree, TreeBranch, TreeItem, TreeValue};

pub struct YamlStore;

impl Store for YamlStore {
    fn load_encrypted(&self, data: &[u8]) -> Result<Tree> {
        let document: Value = serde_yaml::from_slice(data).map_err(|err| malformed(err))?;
        let mapping = document
            .as_mapping()
            .ok_or_else(|| malformed("document is not a mapping"))?;

        let mut branch = TreeBranch::new();
        let mut metadata = None;
        for (key, value) in mapping {
            if key.as_str() == Some("sops") {
                metadata =
                    Some(serde_yaml::from_value::<Metadata>(value.clone()).map_err(malformed)?);
                continue;
            }
            branch.push(TreeItem {
                key: key_string(key).map_err(|err| malformed(err))?,
                value: value_to_tree(value).map_err(|err| malformed(err))?,
            });
        }
        let metadata = metadata.ok_or_else(|| malformed("sops metadata not found"))?;
        Ok(Tree { branch, metadata })
    }

    fn load_plain(&self, data: &[u8]) -> Result<TreeBranch> {
        let document: Value = serde_yaml::from_slice(data).map_err(invalid)?;
        let mapping = document
            .as_mapping()
            .ok_or_else(|| invalid("document is not a mapping"))?;
        mapping_to_branch(mapping).map_err(invalid)
    }

    fn emit_encrypted(&self, tree: &Tree) -> Result<Vec<u8>> {
        let mut mapping = branch_to_mapping(&tree.branch);
        let metadata = serde_yaml::to_value(&tree.metadata).map_err(emit)?;
        mapping.insert(Value::String("sops".into()), metadata);
        serde_yaml::to_string(&mapping)
            .map(String::into_bytes)
            .map_err(emit)
    }

    fn emit_plain(&self, branch: &TreeBranch) -> Result<Vec<u8>> {
        serde_yaml::to_string(&branch_to_mapping(branch))
            .map(String::into_bytes)
            .map_err(emit)
    }
}

fn malformed(reason: impl ToString) -> Error {
    Error::MalformedEnvelope {
        format: Format::Yaml,
        reason: reason.to_string(),
    }
}

fn invalid(reason: impl ToString) -> Error {
    Error::InvalidDocument {
        format: Format::Yaml,
        reason: reason.to_string(),
    }
}

fn emit(reason: impl ToString) -> Error {
    Error::EmitFailed {
        format: Format::Yaml,
        reason: reason.to_string(),
    }
}

fn key_string(key: &Value) -> std::result::Result<String, String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported mapping key: {other:?}")),
    }
}

pub(crate) fn value_to_tree(value: &Value) -> std::result::Result<TreeValue, String> {
    match value {
        Value::Null => Ok(TreeValue::Null),
        Value::Bool(b) => Ok(TreeValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(TreeValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(TreeValue::Float(f))
            } else {
                Err(format!("unsupported number: {n}"))
            }
        }
        Value::String(s) => Ok(TreeValue::String(s.clone())),
        Value::Sequence(items) => items
            .iter()
            .map(value_to_tree)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(TreeValue::Sequence),
        Value::Mapping(mapping) => mapping_to_branch(mapping).map(TreeValue::Branch),
        Value::Tagged(tagged) => value_to_tree(&tagged.value),
    }
}

pub(crate) fn mapping_to_branch(mapping: &Mapping) -> std::result::Result<TreeBranch, String> {
    mapping
        .iter()
        .map(|(key, value)| {
            Ok(TreeItem {
                key: key_string(key)?,
                value: value_to_tree(value)?,
            })
        })
        .collect()
}

pub(crate) fn tree_to_value(value: &TreeValue) -> Value {
    match value {
        TreeValue::Null => Value::Null,
        TreeValue::Bool(b) => Value::Bool(*b),
        TreeValue::Int(i) => Value::Number((*i).into()),
        TreeValue::Float(f) => Value::Number((*f).into()),
        TreeValue::String(s) => Value::String(s.clone()),
        TreeValue::Sequence(items) => Value::Sequence(items.iter().map(tree_to_value).collect()),
        TreeValue::Branch(branch) => Value::Mapping(branch_to_mapping(branch)),
    }
}

pub(crate) fn branch_to_mapping(branch: &TreeBranch) -> Mapping {
    let mut mapping = Mapping::new();
    for item in branch {
        mapping.insert(Value::String(item.key.clone()), tree_to_value(&item.value));
    }
    mapping
}
