//! Declarative `{when, eq, show}` conditions

use serde_json::Value;

/// Finds the first value stored under `key`, searching nested objects and
/// lists depth-first. Null values count as not found.
pub fn find_value<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    match data {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return (!found.is_null()).then_some(found);
            }
            map.values().find_map(|child| find_value(child, key))
        }
        Value::Array(items) => items.iter().find_map(|item| find_value(item, key)),
        _ => None,
    }
}

/// String form used when comparing condition operands.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Evaluates a simple condition. `None` when the `when` field has no value.
pub fn check_simple(data: &Value, when: &str, eq: &Value, show: &Value) -> Option<bool> {
    let value = find_value(data, when)?;
    let eq_text = text(eq);
    let show_text = text(show);

    Some(match value {
        // Select boxes store a map of option -> checked.
        Value::Object(options) if options.contains_key(&eq_text) => {
            options.get(&eq_text).map(text).unwrap_or_default() == show_text
        }
        Value::Array(items) if items.iter().any(|item| text(item) == eq_text) => show_text == "true",
        other => (text(other) == eq_text) == (show_text == "true"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_value_depth_first() {
        let data = json!({
            "outer": { "inner": { "target": 1 } },
            "grid": [ { "target": 2 } ],
            "nulled": { "target": null }
        });
        assert!(find_value(&data, "target").is_some());
        assert_eq!(find_value(&json!({ "target": null }), "target"), None);
        assert_eq!(find_value(&json!({ "grid": [ { "x": 5 } ] }), "x"), Some(&json!(5)));
        assert_eq!(find_value(&data, "absent"), None);
    }

    #[test]
    fn test_plain_equality() {
        let data = json!({ "kind": "business" });
        assert_eq!(check_simple(&data, "kind", &json!("business"), &json!(true)), Some(true));
        assert_eq!(check_simple(&data, "kind", &json!("personal"), &json!(true)), Some(false));
        assert_eq!(check_simple(&data, "kind", &json!("personal"), &json!("false")), Some(true));
    }

    #[test]
    fn test_numbers_compare_as_text() {
        let data = json!({ "count": 3 });
        assert_eq!(check_simple(&data, "count", &json!("3"), &json!("true")), Some(true));
    }

    #[test]
    fn test_select_boxes() {
        let data = json!({ "fruits": { "apple": true, "pear": false } });
        assert_eq!(check_simple(&data, "fruits", &json!("apple"), &json!(true)), Some(true));
        assert_eq!(check_simple(&data, "fruits", &json!("pear"), &json!(true)), Some(false));
    }

    #[test]
    fn test_list_membership() {
        let data = json!({ "tags": ["a", "b"] });
        assert_eq!(check_simple(&data, "tags", &json!("b"), &json!(true)), Some(true));
        assert_eq!(check_simple(&data, "tags", &json!("b"), &json!(false)), Some(false));
    }

    #[test]
    fn test_missing_value_is_unresolved() {
        assert_eq!(check_simple(&json!({}), "kind", &json!("x"), &json!(true)), None);
    }
}
