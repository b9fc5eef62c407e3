// ABOUTME: RFC-7396-style diff merge for the opaque cached server/group state objects
// ABOUTME: null at a leaf deletes; object-on-object merges one level deep; anything else replaces

use serde_json::{Map, Value};

/// Merge `diff` into `existing` in place, per the rules:
/// - `null` at a key deletes that key from `existing`.
/// - if both `existing[key]` and `diff[key]` are objects, their fields are
///   merged one level deep (deletions/replacements happen at that nested
///   level; anything nested further simply replaces wholesale).
/// - any other value at `key` replaces `existing[key]` outright.
/// - arrays are treated as leaves: they are replaced, never merged.
pub fn merge_one_level(existing: &mut Map<String, Value>, diff: &Map<String, Value>) {
    for (key, diff_value) in diff {
        if diff_value.is_null() {
            existing.remove(key);
            continue;
        }

        let existing_is_object = existing.get(key).map(Value::is_object).unwrap_or(false);
        if diff_value.is_object() && existing_is_object {
            let nested = existing.get_mut(key).unwrap().as_object_mut().unwrap();
            merge_leaf_level(nested, diff_value.as_object().unwrap());
        } else {
            existing.insert(key.clone(), diff_value.clone());
        }
    }
}

/// One level below the top: still honors null-deletes, but does not
/// recurse into further nested objects; those replace wholesale.
fn merge_leaf_level(existing: &mut Map<String, Value>, diff: &Map<String, Value>) {
    for (key, diff_value) in diff {
        if diff_value.is_null() {
            existing.remove(key);
        } else {
            existing.insert(key.clone(), diff_value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn null_deletes_leaf() {
        let mut s = obj(json!({"volume": 50, "muted": false}));
        let d = obj(json!({"muted": null}));
        merge_one_level(&mut s, &d);
        assert_eq!(Value::Object(s), json!({"volume": 50}));
    }

    #[test]
    fn nested_object_merges_one_level() {
        let mut s = obj(json!({"controller": {"volume": 50, "muted": false}}));
        let d = obj(json!({"controller": {"volume": 75}}));
        merge_one_level(&mut s, &d);
        assert_eq!(
            Value::Object(s),
            json!({"controller": {"volume": 75, "muted": false}})
        );
    }

    #[test]
    fn nested_object_null_deletes_nested_leaf() {
        let mut s = obj(json!({"controller": {"volume": 50, "muted": false}}));
        let d = obj(json!({"controller": {"muted": null}}));
        merge_one_level(&mut s, &d);
        assert_eq!(Value::Object(s), json!({"controller": {"volume": 50}}));
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let mut s = obj(json!({"supported_commands": ["play", "pause"]}));
        let d = obj(json!({"supported_commands": ["stop"]}));
        merge_one_level(&mut s, &d);
        assert_eq!(Value::Object(s), json!({"supported_commands": ["stop"]}));
    }

    #[test]
    fn other_value_replaces_outright() {
        let mut s = obj(json!({"metadata": {"title": "A"}}));
        let d = obj(json!({"metadata": "unavailable"}));
        merge_one_level(&mut s, &d);
        assert_eq!(Value::Object(s), json!({"metadata": "unavailable"}));
    }

    #[test]
    fn empty_diff_is_identity() {
        let s = obj(json!({"a": 1, "b": {"c": 2}}));
        let mut merged = s.clone();
        merge_one_level(&mut merged, &Map::new());
        assert_eq!(merged, s);
    }

    #[test]
    fn leaf_only_diff_merge_is_idempotent() {
        let s = obj(json!({"a": 1, "b": {"c": 2, "d": 3}}));
        let d = obj(json!({"a": 5, "b": {"c": 9}}));

        let mut once = s.clone();
        merge_one_level(&mut once, &d);

        let mut twice = once.clone();
        merge_one_level(&mut twice, &d);

        assert_eq!(once, twice);
    }
}
