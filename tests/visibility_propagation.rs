//! Visibility Propagation Properties
//!
//! For arbitrary trees of layout, container and leaf components, a
//! component is included exactly when neither it nor any ancestor is
//! hidden, and sanitizing removes exactly the excluded values.

use formguard::component::Form;
use formguard::sandbox::Sandbox;
use formguard::visibility::resolve;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// =============================================================================
// Tree Generation
// =============================================================================

#[derive(Debug, Clone)]
enum Shape {
    Leaf,
    Panel(Vec<Node>),
    Container(Vec<Node>),
}

#[derive(Debug, Clone)]
struct Node {
    hidden: bool,
    shape: Shape,
}

fn node_strategy() -> impl Strategy<Value = Node> {
    let leaf = any::<bool>().prop_map(|hidden| Node {
        hidden,
        shape: Shape::Leaf,
    });
    leaf.prop_recursive(4, 32, 4, |inner| {
        (any::<bool>(), any::<bool>(), prop::collection::vec(inner, 0..4)).prop_map(|(hidden, nests, children)| Node {
            hidden,
            shape: if nests {
                Shape::Container(children)
            } else {
                Shape::Panel(children)
            },
        })
    })
}

/// A node with its assigned key, flattened in tree order.
struct Expected {
    key: String,
    included: bool,
}

struct Builder {
    next: usize,
    expected: Vec<Expected>,
}

impl Builder {
    /// Emits component JSON, fills `data` with a value for every leaf and
    /// `kept` with the values expected to survive sanitizing.
    fn build(&mut self, node: &Node, ancestors_visible: bool, data: &mut Map<String, Value>, kept: &mut Map<String, Value>) -> Value {
        let key = format!("n{}", self.next);
        self.next += 1;
        let included = ancestors_visible && !node.hidden;
        self.expected.push(Expected {
            key: key.clone(),
            included,
        });

        let mut component = match &node.shape {
            Shape::Leaf => {
                data.insert(key.clone(), json!("v"));
                if included {
                    kept.insert(key.clone(), json!("v"));
                }
                json!({ "type": "textfield", "key": key })
            }
            Shape::Panel(children) => {
                let components: Vec<Value> = children
                    .iter()
                    .map(|child| self.build(child, included, data, kept))
                    .collect();
                json!({ "type": "panel", "key": key, "components": components })
            }
            Shape::Container(children) => {
                let mut inner_data = Map::new();
                let mut inner_kept = Map::new();
                let components: Vec<Value> = children
                    .iter()
                    .map(|child| self.build(child, included, &mut inner_data, &mut inner_kept))
                    .collect();
                data.insert(key.clone(), Value::Object(inner_data));
                if included {
                    kept.insert(key.clone(), Value::Object(inner_kept));
                }
                json!({ "type": "container", "key": key, "components": components })
            }
        };

        if node.hidden {
            component["customConditional"] = json!("show = false;");
        }
        component
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Included iff the node and all its ancestors are visible.
    #[test]
    fn test_hidden_ancestor_excludes_descendants(roots in prop::collection::vec(node_strategy(), 1..4)) {
        let mut builder = Builder { next: 0, expected: Vec::new() };
        let mut data = Map::new();
        let mut kept = Map::new();
        let components: Vec<Value> = roots
            .iter()
            .map(|root| builder.build(root, true, &mut data, &mut kept))
            .collect();

        let form: Form = serde_json::from_value(json!({ "components": components })).unwrap();
        let data = Value::Object(data);
        let map = resolve(&form.components, &data, &Sandbox::default());

        for expected in &builder.expected {
            prop_assert_eq!(map.is_included(&expected.key), expected.included, "key {}", expected.key);
        }
        prop_assert_eq!(map.sanitize(&data), Value::Object(kept));
    }
}
