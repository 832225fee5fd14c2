//! JSON Patch (RFC 6902)
//!
//! Operations are applied in order to a copy of the target document; the
//! original is untouched and a failing operation discards the whole patch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{PatchError, PatchResult};

/// One patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// Parses a patch document (a JSON array of operations).
pub fn parse_patch(patch: &Value) -> PatchResult<Vec<PatchOperation>> {
    serde_json::from_value(patch.clone()).map_err(|e| PatchError::InvalidPatch(e.to_string()))
}

/// Applies every operation to a copy of `document`.
///
/// # Errors
///
/// Returns `PatchError` on the first operation that cannot be applied.
pub fn apply_patch(document: &Value, operations: &[PatchOperation]) -> PatchResult<Value> {
    let mut patched = document.clone();
    for operation in operations {
        apply_operation(&mut patched, operation)?;
    }
    Ok(patched)
}

fn apply_operation(doc: &mut Value, operation: &PatchOperation) -> PatchResult<()> {
    match operation {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOperation::Replace { path, value } => {
            let target = pointer_mut(doc, &parse_pointer(path)?).ok_or_else(|| PatchError::PathNotFound(path.clone()))?;
            *target = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            let from_tokens = parse_pointer(from)?;
            let to_tokens = parse_pointer(path)?;
            if to_tokens.len() > from_tokens.len() && to_tokens.starts_with(&from_tokens) {
                return Err(PatchError::InvalidPointer(format!("cannot move {} into its own child {}", from, path)));
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = pointer(doc, &parse_pointer(from)?)
                .cloned()
                .ok_or_else(|| PatchError::PathNotFound(from.clone()))?;
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => match pointer(doc, &parse_pointer(path)?) {
            Some(actual) if actual == value => Ok(()),
            _ => Err(PatchError::TestFailed(path.clone())),
        },
    }
}

/// Splits a JSON pointer into unescaped reference tokens.
fn parse_pointer(path: &str) -> PatchResult<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(path.to_string()));
    };
    Ok(rest.split('/').map(|token| token.replace("~1", "/").replace("~0", "~")).collect())
}

fn array_index(token: &str, len: usize, allow_end: bool) -> Option<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    let index = token.parse::<usize>().ok()?;
    let limit = if allow_end { len } else { len.saturating_sub(1) };
    (index <= limit && (allow_end || len > 0)).then_some(index)
}

fn pointer<'a>(doc: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    tokens.iter().try_fold(doc, |current, token| match current {
        Value::Object(map) => map.get(token),
        Value::Array(items) => items.get(array_index(token, items.len(), false)?),
        _ => None,
    })
}

fn pointer_mut<'a>(doc: &'a mut Value, tokens: &[String]) -> Option<&'a mut Value> {
    tokens.iter().try_fold(doc, |current, token| match current {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => {
            let index = array_index(token, items.len(), false)?;
            items.get_mut(index)
        }
        _ => None,
    })
}

fn add(doc: &mut Value, path: &str, value: Value) -> PatchResult<()> {
    let tokens = parse_pointer(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = pointer_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = array_index(last, items.len(), true).ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn remove(doc: &mut Value, path: &str) -> PatchResult<Value> {
    let tokens = parse_pointer(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        return Err(PatchError::InvalidPointer("cannot remove the document root".to_string()));
    };
    let parent = pointer_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    let removed = match parent {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => array_index(last, items.len(), false).map(|index| items.remove(index)),
        _ => None,
    };
    removed.ok_or_else(|| PatchError::PathNotFound(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(ops: Value) -> Vec<PatchOperation> {
        parse_patch(&ops).unwrap()
    }

    #[test]
    fn test_add_replace_remove() {
        let doc = json!({ "data": { "name": "Ada", "tags": ["a"] } });
        let ops = patch(json!([
            { "op": "replace", "path": "/data/name", "value": "Grace" },
            { "op": "add", "path": "/data/tags/-", "value": "b" },
            { "op": "add", "path": "/data/tags/0", "value": "z" },
            { "op": "add", "path": "/data/age", "value": 40 },
            { "op": "remove", "path": "/data/age" }
        ]));

        let patched = apply_patch(&doc, &ops).unwrap();
        assert_eq!(patched, json!({ "data": { "name": "Grace", "tags": ["z", "a", "b"] } }));
        // Original untouched
        assert_eq!(doc["data"]["name"], "Ada");
    }

    #[test]
    fn test_move_copy_test() {
        let doc = json!({ "a": { "x": 1 }, "b": {} });
        let ops = patch(json!([
            { "op": "copy", "from": "/a/x", "path": "/b/y" },
            { "op": "move", "from": "/a/x", "path": "/b/x" },
            { "op": "test", "path": "/b/y", "value": 1 }
        ]));

        let patched = apply_patch(&doc, &ops).unwrap();
        assert_eq!(patched, json!({ "a": {}, "b": { "x": 1, "y": 1 } }));
    }

    #[test]
    fn test_escaped_pointer_tokens() {
        let doc = json!({ "a/b": { "m~n": 1 } });
        let ops = patch(json!([{ "op": "replace", "path": "/a~1b/m~0n", "value": 2 }]));
        assert_eq!(apply_patch(&doc, &ops).unwrap(), json!({ "a/b": { "m~n": 2 } }));
    }

    #[test]
    fn test_failures() {
        let doc = json!({ "a": [1] });

        let failed_test = patch(json!([{ "op": "test", "path": "/a/0", "value": 2 }]));
        assert!(matches!(apply_patch(&doc, &failed_test), Err(PatchError::TestFailed(_))));

        let missing = patch(json!([{ "op": "remove", "path": "/b" }]));
        assert!(matches!(apply_patch(&doc, &missing), Err(PatchError::PathNotFound(_))));

        let out_of_range = patch(json!([{ "op": "add", "path": "/a/5", "value": 0 }]));
        assert!(matches!(apply_patch(&doc, &out_of_range), Err(PatchError::PathNotFound(_))));

        let bad_pointer = patch(json!([{ "op": "add", "path": "a", "value": 0 }]));
        assert!(matches!(apply_patch(&doc, &bad_pointer), Err(PatchError::InvalidPointer(_))));

        let into_child = patch(json!([{ "op": "move", "from": "/a", "path": "/a/0" }]));
        assert!(matches!(apply_patch(&doc, &into_child), Err(PatchError::InvalidPointer(_))));

        assert!(matches!(parse_patch(&json!([{ "op": "explode" }])), Err(PatchError::InvalidPatch(_))));
    }
}
