//! Visibility resolution and document sanitizing

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::component::{walk_components, ComponentNode, Conditional, DataPath};
use crate::sandbox::Sandbox;

use super::condition::check_simple;

/// Per-key inclusion flags for one validation pass.
#[derive(Debug, Clone, Default)]
pub struct VisibilityMap {
    included: HashMap<String, bool>,
    omitted: Vec<DataPath>,
}

impl VisibilityMap {
    /// Whether the component's value takes part in validation. Unknown keys
    /// are included.
    pub fn is_included(&self, key: &str) -> bool {
        self.included.get(key).copied().unwrap_or(true)
    }

    /// Data paths removed by [`VisibilityMap::sanitize`], in tree order.
    pub fn omitted_paths(&self) -> &[DataPath] {
        &self.omitted
    }

    /// Returns a copy of `data` without the values of excluded components.
    pub fn sanitize(&self, data: &Value) -> Value {
        let mut sanitized = data.clone();
        for path in &self.omitted {
            path.remove(&mut sanitized);
        }
        sanitized
    }
}

/// Evaluates a component's own visibility, ignoring its ancestors.
pub fn own_visibility(node: &ComponentNode, data: &Value, sandbox: &Sandbox) -> bool {
    if node.key().is_none() {
        return true;
    }
    if let Some(script) = &node.constraints.custom_conditional {
        return sandbox.evaluate_conditional(script, data);
    }
    match &node.conditional {
        Some(Conditional::Simple { when, eq, show }) => check_simple(data, when, eq, show).unwrap_or_else(|| {
            debug!(key = node.key(), when = %when, "condition field has no value, showing component");
            true
        }),
        Some(Conditional::Logic(rule)) => sandbox.evaluate_logic_condition(rule, data),
        None => true,
    }
}

/// Resolves visibility for every keyed component in the tree.
///
/// A component is visible when its own condition holds and every ancestor is
/// visible. It is included when visible or when it keeps its value while
/// hidden (`clearOnHide` false).
pub fn resolve(components: &[ComponentNode], data: &Value, sandbox: &Sandbox) -> VisibilityMap {
    let mut map = VisibilityMap::default();

    walk_components(components, true, |node, path, parent_visible| {
        let visible = *parent_visible && own_visibility(node, data, sandbox);
        if let Some(key) = node.key() {
            let included = !node.constraints.clear_on_hide || visible;
            map.included.insert(key.to_string(), included);
            if !included {
                debug!(key, path = %path, "omitting hidden component");
                map.omitted.push(path.clone());
            }
        }
        visible
    });

    map
}
