//! `{{ path }}` placeholder substitution for custom rule sources

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::component::lookup;

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").ok())
        .as_ref()
}

/// Replaces every `{{ path }}` with the value found at `path` in `data`.
///
/// Strings are inserted verbatim, other values as JSON text. Missing or
/// null values render as `undefined`.
pub fn interpolate(source: &str, data: &Value) -> String {
    let Some(pattern) = placeholder().filter(|_| source.contains("{{")) else {
        return source.to_string();
    };
    pattern
        .replace_all(source, |caps: &Captures<'_>| {
            let path = caps.get(1).map_or("", |m| m.as_str());
            match lookup(data, path) {
                None | Some(Value::Null) => "undefined".to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}
