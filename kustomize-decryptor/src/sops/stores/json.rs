//! JSON store, and the binary store that wraps it.
//!
//! A binary envelope is a JSON document whose tree is a single `data` entry;
//! emitting its plaintext returns the raw bytes without structural
//! re-encoding.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::sops::metadata::Metadata;
use crate::sops::stores::Store;
use crate::sops::tree::{Tree, TreeBranch, TreeItem, TreeValue};

pub struct JsonStore;

pub struct BinaryStore;

impl Store for JsonStore {
    fn load_encrypted(&self, data: &[u8]) -> Result<Tree> {
        load_encrypted_json(data, Format::Json)
    }

    fn load_plain(&self, data: &[u8]) -> Result<TreeBranch> {
        let document: Value = serde_json::from_slice(data).map_err(invalid)?;
        let object = document
            .as_object()
            .ok_or_else(|| invalid("document is not an object"))?;
        object_to_branch(object).map_err(invalid)
    }

    fn emit_encrypted(&self, tree: &Tree) -> Result<Vec<u8>> {
        let mut object = branch_to_object(&tree.branch)?;
        let metadata = serde_json::to_value(&tree.metadata).map_err(emit)?;
        object.insert("sops".into(), metadata);
        emit_object(&object)
    }

    fn emit_plain(&self, branch: &TreeBranch) -> Result<Vec<u8>> {
        emit_object(&branch_to_object(branch)?)
    }
}

impl Store for BinaryStore {
    fn load_encrypted(&self, data: &[u8]) -> Result<Tree> {
        load_encrypted_json(data, Format::Binary)
    }

    fn load_plain(&self, data: &[u8]) -> Result<TreeBranch> {
        let text = std::str::from_utf8(data).map_err(|_| Error::InvalidDocument {
            format: Format::Binary,
            reason: "binary data is not valid UTF-8".into(),
        })?;
        Ok(vec![TreeItem {
            key: "data".into(),
            value: TreeValue::String(text.to_string()),
        }])
    }

    fn emit_encrypted(&self, tree: &Tree) -> Result<Vec<u8>> {
        JsonStore.emit_encrypted(tree)
    }

    fn emit_plain(&self, branch: &TreeBranch) -> Result<Vec<u8>> {
        match branch.first() {
            Some(TreeItem { key, value }) if branch.len() == 1 && key == "data" => match value {
                TreeValue::String(s) => Ok(s.clone().into_bytes()),
                _ => Err(Error::EmitFailed {
                    format: Format::Binary,
                    reason: "'data' value is not a string".into(),
                }),
            },
            _ => Err(Error::EmitFailed {
                format: Format::Binary,
                reason: "tree does not hold a single 'data' value".into(),
            }),
        }
    }
}

fn load_encrypted_json(data: &[u8], format: Format) -> Result<Tree> {
    let document: Value =
        serde_json::from_slice(data).map_err(|err| malformed(format, err))?;
    let object = document
        .as_object()
        .ok_or_else(|| malformed(format, "document is not an object"))?;

    let mut branch = TreeBranch::new();
    let mut metadata = None;
    for (key, value) in object {
        if key == "sops" {
            metadata = Some(
                serde_json::from_value::<Metadata>(value.clone())
                    .map_err(|err| malformed(format, err))?,
            );
            continue;
        }
        branch.push(TreeItem {
            key: key.clone(),
            value: value_to_tree(value).map_err(|err| malformed(format, err))?,
        });
    }
    let metadata = metadata.ok_or_else(|| malformed(format, "sops metadata not found"))?;
    Ok(Tree { branch, metadata })
}

fn malformed(format: Format, reason: impl ToString) -> Error {
    Error::MalformedEnvelope {
        format,
        reason: reason.to_string(),
    }
}

fn emit_object(object: &Map<String, Value>) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(object).map_err(emit)?;
    out.push(b'\n');
    Ok(out)
}

fn invalid(reason: impl ToString) -> Error {
    Error::InvalidDocument {
        format: Format::Json,
        reason: reason.to_string(),
    }
}

fn emit(reason: impl ToString) -> Error {
    Error::EmitFailed {
        format: Format::Json,
        reason: reason.to_string(),
    }
}

fn value_to_tree(value: &Value) -> std::result::Result<TreeValue, String> {
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
        Value::Array(items) => items
            .iter()
            .map(value_to_tree)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(TreeValue::Sequence),
        Value::Object(object) => object_to_branch(object).map(TreeValue::Branch),
    }
}

fn object_to_branch(object: &Map<String, Value>) -> std::result::Result<TreeBranch, String> {
    object
        .iter()
        .map(|(key, value)| {
            Ok(TreeItem {
                key: key.clone(),
                value: value_to_tree(value)?,
            })
        })
        .collect()
}

fn tree_to_value(value: &TreeValue) -> Result<Value> {
    match value {
        TreeValue::Null => Ok(Value::Null),
        TreeValue::Bool(b) => Ok(Value::Bool(*b)),
        TreeValue::Int(i) => Ok(Value::Number((*i).into())),
        TreeValue::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
            Error::EmitFailed {
                format: Format::Json,
                reason: format!("non-finite float: {f}"),
            }
        }),
        TreeValue::String(s) => Ok(Value::String(s.clone())),
        TreeValue::Sequence(items) => items
            .iter()
            .map(tree_to_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        TreeValue::Branch(branch) => branch_to_object(branch).map(Value::Object),
    }
}

fn branch_to_object(branch: &TreeBranch) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    for item in branch {
        object.insert(item.key.clone(), tree_to_value(&item.value)?);
    }
    Ok(object)
}
