//! Depth-first traversal of component trees

use std::collections::HashMap;

use super::path::DataPath;
use super::types::ComponentNode;

/// Walks the tree depth-first, threading a state from parent to children.
///
/// `visit` receives each node, the node's own data path and the state
/// produced for its parent; its return value becomes the state seen by the
/// node's children. Layout nodes are visited too, and their children keep
/// the parent's nesting level.
pub fn walk_components<'a, S, F>(components: &'a [ComponentNode], initial: S, mut visit: F)
where
    F: FnMut(&'a ComponentNode, &DataPath, &S) -> S,
{
    walk(components, &DataPath::root(), &initial, &mut visit);
}

fn walk<'a, S, F>(components: &'a [ComponentNode], path: &DataPath, state: &S, visit: &mut F)
where
    F: FnMut(&'a ComponentNode, &DataPath, &S) -> S,
{
    for node in components {
        let node_path = match node.key() {
            Some(key) => path.child(key),
            None => path.clone(),
        };
        let child_state = visit(node, &node_path, state);
        if !node.children.is_empty() {
            walk(&node.children, &node.child_path(path), &child_state, visit);
        }
    }
}

/// Visits every node with its data path.
pub fn each_component<'a, F>(components: &'a [ComponentNode], mut visit: F)
where
    F: FnMut(&'a ComponentNode, &DataPath),
{
    walk_components(components, (), |node, path, _| visit(node, path));
}

/// Maps each component key to its data path. Later keys win.
pub fn path_index(components: &[ComponentNode]) -> HashMap<String, DataPath> {
    let mut paths = HashMap::new();
    each_component(components, |node, path| {
        if let Some(key) = node.key() {
            paths.insert(key.to_string(), path.clone());
        }
    });
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::types::ComponentKind;
    use serde_json::json;

    fn sample_tree() -> Vec<ComponentNode> {
        let form: crate::component::Form = serde_json::from_value(json!({
            "components": [
                { "type": "textfield", "key": "name" },
                { "type": "panel", "key": "page", "components": [
                    { "type": "email", "key": "email" },
                    { "type": "datagrid", "key": "pets", "components": [
                        { "type": "textfield", "key": "petName" }
                    ]}
                ]},
                { "type": "container", "key": "addr", "components": [
                    { "type": "textfield", "key": "city" }
                ]}
            ]
        }))
        .unwrap();
        form.components
    }

    #[test]
    fn test_path_index() {
        let tree = sample_tree();
        let paths = path_index(&tree);

        assert_eq!(paths["name"].to_string(), "name");
        assert_eq!(paths["email"].to_string(), "email");
        assert_eq!(paths["petName"].to_string(), "pets[].petName");
        assert_eq!(paths["city"].to_string(), "addr.city");
        assert_eq!(paths["page"].to_string(), "page");
    }

    #[test]
    fn test_visits_layout_nodes_in_order() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        each_component(&tree, |node, _| seen.push(node.kind.tag().to_string()));

        assert_eq!(
            seen,
            vec!["textfield", "panel", "email", "datagrid", "textfield", "container", "textfield"]
        );
    }

    #[test]
    fn test_state_threads_to_children() {
        let tree = sample_tree();
        let mut depths = HashMap::new();
        walk_components(&tree, 0usize, |node, _, depth| {
            if let Some(key) = node.key() {
                depths.insert(key.to_string(), *depth);
            }
            depth + 1
        });

        assert_eq!(depths["name"], 0);
        assert_eq!(depths["petName"], 2);
        assert_eq!(depths["city"], 1);
    }

    #[test]
    fn test_later_duplicate_key_wins() {
        let tree = vec![
            ComponentNode::new(ComponentKind::TextField, Some("dup")),
            ComponentNode::new(ComponentKind::Container, Some("box"))
                .with_children(vec![ComponentNode::new(ComponentKind::TextField, Some("dup"))]),
        ];
        assert_eq!(path_index(&tree)["dup"].to_string(), "box.dup");
    }
}
