// Scope expressions and the merge-assign that writes extracted values into
// the shared result tree.
//
// A scope expression is a dotted path. Segment forms:
//
//   name        literal map key
//   $var        map key substituted from the session variable scope
//   name[]      sequence under `name`, always append a fresh element
//   name[key]   sequence under `name`, upsert: reuse the first element
//               whose `key` entry equals the session variable `key`,
//               otherwise append
//
// `resolve` turns an expression into concrete key/index steps against the
// current tree; `assign` then writes a value at those steps, creating
// intermediate containers and merging rather than replacing.

use crate::error::{EngineError, Result};
use crate::value::stringify;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// Resolve a scope expression into concrete path steps. Sequence segments
/// are resolved against the tree as it stands: an upsert that finds no
/// matching element and a plain `[]` both land one past the end.
pub fn resolve(
    expr: &str,
    tree: &Value,
    vars: &HashMap<String, Value>,
) -> Result<Vec<PathStep>> {
    let mut steps = Vec::new();
    let mut cursor: Option<&Value> = Some(tree);

    for raw in expr.split('.') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::Config(format!(
                "empty segment in scope expression: {}",
                expr
            )));
        }

        let (name, seq) = match raw.find('[') {
            Some(open) if raw.ends_with(']') => {
                (&raw[..open], Some(&raw[open + 1..raw.len() - 1]))
            }
            Some(_) => {
                return Err(EngineError::Config(format!(
                    "unbalanced brackets in scope segment: {}",
                    raw
                )));
            }
            None => (raw, None),
        };

        let key = if let Some(var) = name.strip_prefix('$') {
            let value = vars.get(var).ok_or_else(|| {
                EngineError::Config(format!(
                    "scope expression references unset variable: ${}",
                    var
                ))
            })?;
            stringify(value)
        } else {
            name.to_string()
        };

        if key.is_empty() {
            return Err(EngineError::Config(format!(
                "scope segment resolves to an empty key: {}",
                raw
            )));
        }

        cursor = cursor.and_then(|v| v.get(&key));
        steps.push(PathStep::Key(key));

        if let Some(seq) = seq {
            let index = resolve_sequence_index(seq, cursor, vars)?;
            cursor = cursor.and_then(|v| v.get(index));
            steps.push(PathStep::Index(index));
        }
    }

    Ok(steps)
}

fn resolve_sequence_index(
    seq: &str,
    current: Option<&Value>,
    vars: &HashMap<String, Value>,
) -> Result<usize> {
    let existing = current.and_then(Value::as_array);
    let len = existing.map(|a| a.len()).unwrap_or(0);
    let seq = seq.trim();

    if seq.is_empty() {
        // Plain append marker.
        return Ok(len);
    }

    // Upsert: match on equality between the element's `seq` entry and the
    // session variable of the same name.
    let wanted = vars.get(seq).ok_or_else(|| {
        EngineError::Config(format!(
            "upsert key references unset variable: {}",
            seq
        ))
    })?;

    if let Some(items) = existing {
        for (i, item) in items.iter().enumerate() {
            if item.get(seq) == Some(wanted) {
                return Ok(i);
            }
        }
    }

    Ok(len)
}

/// Write `value` into `tree` at `path`, creating intermediate containers.
/// With `merge` set, maps deep-merge (incoming keys win on scalar
/// conflicts) and sequences concatenate; anything else replaces. Sibling
/// keys along the path are never touched.
pub fn assign(tree: &mut Value, path: &[PathStep], value: Value, merge: bool) {
    let Some((last, parents)) = path.split_last() else {
        merge_into(tree, value, merge);
        return;
    };

    let mut cursor = tree;
    let mut parents = parents.iter().peekable();

    while let Some(step) = parents.next() {
        let next_step = parents.peek().copied().unwrap_or(last);
        cursor = descend(cursor, step, next_step);
    }

    let slot = descend_terminal(cursor, last);
    merge_into(slot, value, merge);
}

fn descend<'a>(cursor: &'a mut Value, step: &PathStep, next: &PathStep) -> &'a mut Value {
    let slot = descend_terminal(cursor, step);

    // Make the slot a container shaped for the next step.
    match next {
        PathStep::Key(_) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
        }
        PathStep::Index(_) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
        }
    }
    slot
}

fn descend_terminal<'a>(cursor: &'a mut Value, step: &PathStep) -> &'a mut Value {
    match step {
        PathStep::Key(key) => {
            if !cursor.is_object() {
                *cursor = Value::Object(Map::new());
            }
            cursor
                .as_object_mut()
                .unwrap()
                .entry(key.clone())
                .or_insert(Value::Null)
        }
        PathStep::Index(i) => {
            if !cursor.is_array() {
                *cursor = Value::Array(Vec::new());
            }
            let arr = cursor.as_array_mut().unwrap();
            while arr.len() <= *i {
                arr.push(Value::Null);
            }
            &mut arr[*i]
        }
    }
}

fn merge_into(slot: &mut Value, value: Value, merge: bool) {
    if !merge {
        *slot = value;
        return;
    }

    match (&mut *slot, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                match existing.get_mut(&k) {
                    Some(old) => merge_into(old, v, true),
                    None => {
                        existing.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(existing), Value::Array(incoming)) => {
            existing.extend(incoming);
        }
        (slot, value) => *slot = value,
    }
}

/// Human-readable rendering of a concrete path, for progress logs.
pub fn to_string(path: &[PathStep]) -> String {
    let mut out = String::new();
    for step in path {
        match step {
            PathStep::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathStep::Index(i) => {
                out.push_str(&format!("[{}]", i));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn literal_path_resolves_to_keys() {
        let tree = json!({});
        let path = resolve("a.b.c", &tree, &HashMap::new()).unwrap();
        assert_eq!(to_string(&path), "a.b.c");
    }

    #[test]
    fn dynamic_segment_substitutes_variable() {
        let tree = json!({});
        let v = vars(&[("_node", json!("hero-card"))]);
        let path = resolve("pages.$_node.title", &tree, &v).unwrap();
        assert_eq!(to_string(&path), "pages.hero-card.title");
    }

    #[test]
    fn unset_variable_is_a_config_error() {
        let tree = json!({});
        assert!(resolve("pages.$missing", &tree, &HashMap::new()).is_err());
    }

    #[test]
    fn append_marker_lands_past_the_end() {
        let tree = json!({"items": [{"x": 1}, {"x": 2}]});
        let path = resolve("items[].x", &tree, &HashMap::new()).unwrap();
        assert_eq!(
            path,
            vec![
                PathStep::Key("items".into()),
                PathStep::Index(2),
                PathStep::Key("x".into())
            ]
        );
    }

    #[test]
    fn upsert_finds_matching_element() {
        let tree = json!({"items": [{"id": "a"}, {"id": "b"}]});
        let v = vars(&[("id", json!("b"))]);
        let path = resolve("items[id].name", &tree, &v).unwrap();
        assert_eq!(path[1], PathStep::Index(1));
    }

    #[test]
    fn upsert_appends_when_no_match() {
        let tree = json!({"items": [{"id": "a"}]});
        let v = vars(&[("id", json!("z"))]);
        let path = resolve("items[id].name", &tree, &v).unwrap();
        assert_eq!(path[1], PathStep::Index(1));
    }

    #[test]
    fn assign_creates_intermediate_containers() {
        let mut tree = json!({});
        let path = resolve("a.b[].c", &tree, &HashMap::new()).unwrap();
        assign(&mut tree, &path, json!("v"), true);
        assert_eq!(tree, json!({"a": {"b": [{"c": "v"}]}}));
    }

    #[test]
    fn assign_preserves_siblings() {
        let mut tree = json!({"a": {"keep": 1}});
        let path = resolve("a.b", &tree, &HashMap::new()).unwrap();
        assign(&mut tree, &path, json!(2), true);
        assert_eq!(tree, json!({"a": {"keep": 1, "b": 2}}));
    }

    #[test]
    fn scalar_assign_is_idempotent() {
        let mut once = json!({});
        let path = resolve("a.b", &once, &HashMap::new()).unwrap();
        assign(&mut once, &path, json!("v"), true);
        let snapshot = once.clone();
        assign(&mut once, &path, json!("v"), true);
        assert_eq!(once, snapshot);
    }

    #[test]
    fn disjoint_maps_merge_to_union() {
        let mut tree = json!({});
        let path = resolve("spot", &tree, &HashMap::new()).unwrap();
        assign(&mut tree, &path, json!({"x": 1}), true);
        assign(&mut tree, &path, json!({"y": 2}), true);
        assert_eq!(tree, json!({"spot": {"x": 1, "y": 2}}));
    }

    #[test]
    fn conflicting_scalars_take_the_new_value() {
        let mut tree = json!({});
        let path = resolve("spot", &tree, &HashMap::new()).unwrap();
        assign(&mut tree, &path, json!({"x": 1}), true);
        assign(&mut tree, &path, json!({"x": 9}), true);
        assert_eq!(tree, json!({"spot": {"x": 9}}));
    }

    #[test]
    fn sequences_concatenate_under_merge() {
        let mut tree = json!({});
        let path = resolve("rows", &tree, &HashMap::new()).unwrap();
        assign(&mut tree, &path, json!([1]), true);
        assign(&mut tree, &path, json!([2, 3]), true);
        assert_eq!(tree, json!({"rows": [1, 2, 3]}));
    }

    #[test]
    fn replace_without_merge() {
        let mut tree = json!({"spot": {"x": 1}});
        let path = resolve("spot", &tree, &HashMap::new()).unwrap();
        assign(&mut tree, &path, json!({"y": 2}), false);
        assert_eq!(tree, json!({"spot": {"y": 2}}));
    }
}
