//! Nested-object helpers shared by the local store backends.

use serde_json::{Map, Value};

/// Replaces the node under `segments`, creating parent objects and
/// overwriting any scalar that sits where a parent must go. `Null` removes
/// the node, and parents left empty are pruned.
pub fn set_at(root: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return;
    };

    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let Value::Object(map) = root else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() || is_empty_object(&value) {
            map.remove(*first);
        } else {
            map.insert((*first).to_string(), value);
        }
        return;
    }

    let child = map
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    set_at(child, rest, value);
    if is_empty_object(child) {
        map.remove(*first);
    }
}

pub fn get_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(*segment))
}

/// Leaf paths of `value`, relative to `prefix`. Objects are expanded; any
/// other value, arrays included, is a leaf.
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{prefix}/{key}"), child, out);
            }
        }
        Value::Null => {}
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
