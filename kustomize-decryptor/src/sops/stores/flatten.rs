//! Flattened metadata encoding shared by the dotenv and INI stores.
//!
//! Structured metadata is encoded into flat `key=value` pairs: map entries
//! append `__map_<key>` to their parent's name and list elements append
//! `__list_<index>`, so `age[0].enc` becomes `age__list_0__map_enc`.

use serde_json::{Map, Value};

const MAP_SEPARATOR: &str = "__map_";
const LIST_SEPARATOR: &str = "__list_";

/// Flatten an object into ordered `(key, value)` pairs. Null entries are
/// dropped.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Value::Object(object) = value {
        for (key, value) in object {
            flatten_into(key.clone(), value, &mut out);
        }
    }
    out
}

fn flatten_into(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(object) => {
            for (child, value) in object {
                flatten_into(format!("{key}{MAP_SEPARATOR}{child}"), value, out);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_into(format!("{key}{LIST_SEPARATOR}{index}"), value, out);
            }
        }
        Value::String(s) => out.push((key, s.clone())),
        Value::Bool(_) | Value::Number(_) => out.push((key, value.to_string())),
        Value::Null => {}
    }
}

/// Rebuild the object a sequence of flattened pairs encodes.
pub fn unflatten(pairs: &[(String, String)]) -> Result<Value, String> {
    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        let segments = parse_key(key)?;
        insert(&mut root, &segments, Value::String(value.clone()))?;
    }
    Ok(root)
}

enum Segment {
    Key(String),
    Index(usize),
}

fn parse_key(key: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = key;
    let mut in_list = false;
    loop {
        let next_map = rest.find(MAP_SEPARATOR);
        let next_list = rest.find(LIST_SEPARATOR);
        let (position, next_in_list, separator_len) = match (next_map, next_list) {
            (None, None) => {
                segments.push(segment(rest, in_list)?);
                return Ok(segments);
            }
            (Some(m), None) => (m, false, MAP_SEPARATOR.len()),
            (None, Some(l)) => (l, true, LIST_SEPARATOR.len()),
            (Some(m), Some(l)) if m < l => (m, false, MAP_SEPARATOR.len()),
            (Some(_), Some(l)) => (l, true, LIST_SEPARATOR.len()),
        };
        segments.push(segment(&rest[..position], in_list)?);
        rest = &rest[position + separator_len..];
        in_list = next_in_list;
    }
}

fn segment(text: &str, in_list: bool) -> Result<Segment, String> {
    if in_list {
        text.parse::<usize>()
            .map(Segment::Index)
            .map_err(|_| format!("invalid list index: {text}"))
    } else {
        Ok(Segment::Key(text.to_string()))
    }
}

fn insert(container: &mut Value, segments: &[Segment], value: Value) -> Result<(), String> {
    let (head, rest) = segments
        .split_first()
        .ok_or_else(|| "empty flattened key".to_string())?;

    let slot = match (container, head) {
        (Value::Object(object), Segment::Key(key)) => {
            object.entry(key.clone()).or_insert(Value::Null)
        }
        (Value::Array(items), Segment::Index(index)) => {
            while items.len() <= *index {
                items.push(Value::Null);
            }
            &mut items[*index]
        }
        _ => return Err("flattened key does not match container shape".into()),
    };

    if rest.is_empty() {
        *slot = value;
        return Ok(());
    }
    if slot.is_null() {
        *slot = match rest[0] {
            Segment::Key(_) => Value::Object(Map::new()),
            Segment::Index(_) => Value::Array(Vec::new()),
        };
    }
    insert(slot, rest, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_encodes_lists_and_maps() {
        let value = json!({
            "age": [{"recipient": "age1abc", "enc": "ct"}],
            "mac": "ENC[...]",
            "version": "3.7.3",
        });
        let pairs = flatten(&value);
        assert_eq!(
            pairs,
            vec![
                ("age__list_0__map_recipient".to_string(), "age1abc".to_string()),
                ("age__list_0__map_enc".to_string(), "ct".to_string()),
                ("mac".to_string(), "ENC[...]".to_string()),
                ("version".to_string(), "3.7.3".to_string()),
            ]
        );
    }

    #[test]
    fn unflatten_inverts_flatten() {
        let value = json!({
            "age": [
                {"recipient": "age1abc", "enc": "a"},
                {"recipient": "age1def", "enc": "b"},
            ],
            "lastmodified": "2023-05-04T12:00:00Z",
            "mac": "ENC[...]",
        });
        let pairs = flatten(&value);
        assert_eq!(unflatten(&pairs).unwrap(), value);
    }

    #[test]
    fn unflatten_rejects_bad_indices() {
        let pairs = vec![("age__list_x__map_enc".to_string(), "v".to_string())];
        assert!(unflatten(&pairs).is_err());
    }
}
