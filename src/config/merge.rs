//! Override merge logic
//!
//! Every cascade level is a partial record. Levels are applied in order with
//! shallow, last-write-wins semantics:
//! - Top-level keys: overlay wins
//! - Nested objects: REPLACE (no recursion)
//! - Null: override (null can override any value)

use serde_json::{Map, Value};

/// Shallow merge `overlay` into `base`, overlay keys winning.
pub fn shallow_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Owned variant of [`shallow_merge`], avoiding clones of the overlay.
pub fn shallow_merge_owned(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        base.insert(key, value);
    }
}

/// Reduce an ordered list of optional levels (first is base, last has
/// highest precedence). Absent levels are skipped.
pub fn merge_in_order<'a, I>(levels: I) -> Map<String, Value>
where
    I: IntoIterator<Item = Option<&'a Map<String, Value>>>,
{
    levels.into_iter().flatten().fold(Map::new(), |mut acc, level| {
        shallow_merge(&mut acc, level);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_scalar_override() {
        let mut base = obj(json!({"height": 30}));
        shallow_merge(&mut base, &obj(json!({"height": 40})));
        assert_eq!(base["height"], 40);
    }

    #[test]
    fn test_nested_object_replaced_not_merged() {
        let mut base = obj(json!({
            "margins": {"top": 4, "bottom": 4}
        }));
        shallow_merge(&mut base, &obj(json!({
            "margins": {"top": 8}
        })));

        assert_eq!(base["margins"], json!({"top": 8}));
    }

    #[test]
    fn test_array_replace() {
        let mut base = obj(json!({"items": ["clock", "tray", "power"]}));
        shallow_merge(&mut base, &obj(json!({"items": ["clock"]})));
        assert_eq!(base["items"], json!(["clock"]));
    }

    #[test]
    fn test_add_new_key() {
        let mut base = obj(json!({"a": 1}));
        shallow_merge_owned(&mut base, obj(json!({"b": 2})));
        assert_eq!(base["a"], 1);
        assert_eq!(base["b"], 2);
    }

    #[test]
    fn test_null_override() {
        let mut base = obj(json!({"value": 100}));
        shallow_merge(&mut base, &obj(json!({"value": null})));
        assert!(base["value"].is_null());
    }

    #[test]
    fn test_merge_in_order_skips_absent_levels() {
        let root = obj(json!({"a": 1, "b": 2}));
        let monitor = obj(json!({"b": 4}));

        let result = merge_in_order([Some(&root), None, Some(&monitor)]);
        assert_eq!(Value::Object(result), json!({"a": 1, "b": 4}));
    }

    #[test]
    fn test_merge_in_order_empty() {
        let result = merge_in_order(Vec::<Option<&Map<String, Value>>>::new());
        assert!(result.is_empty());
    }
}
