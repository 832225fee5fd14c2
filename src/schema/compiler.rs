//! Schema compilation
//!
//! Walks a component tree and builds the validator tree for one pass.
//! Layout components are transparent; data-bearing containers open a new
//! object level; grids become lists of row objects. Components excluded by
//! visibility are skipped together with their children.

use regex::Regex;

use crate::component::{ComponentKind, ComponentNode};
use crate::observability::{log_event_with_fields, Event};
use crate::unique::UniquenessRegistry;
use crate::visibility::VisibilityMap;

use super::types::{CompiledSchema, DynamicRule, FieldDef, FieldType, NumberRules, ObjectSchema};

/// Compiles the validator tree for a form.
///
/// The root and containers strip unknown keys; grid rows (and anything
/// nested in them) keep them.
pub fn compile(components: &[ComponentNode], visibility: &VisibilityMap) -> CompiledSchema {
    let mut compiler = Compiler {
        visibility,
        unique: UniquenessRegistry::new(),
    };
    let mut root = ObjectSchema::new(true);
    compiler.compile_into(components, &mut root);

    CompiledSchema {
        root,
        unique: compiler.unique,
    }
}

struct Compiler<'v> {
    visibility: &'v VisibilityMap,
    unique: UniquenessRegistry,
}

impl Compiler<'_> {
    fn compile_into(&mut self, nodes: &[ComponentNode], target: &mut ObjectSchema) {
        for node in nodes {
            self.compile_node(node, target);
        }
    }

    fn compile_node(&mut self, node: &ComponentNode, target: &mut ObjectSchema) {
        let key = node.key();
        if let Some(key) = key {
            if !self.visibility.is_included(key) {
                return;
            }
            if node.constraints.unique {
                self.unique.register(key, node.display_name());
            }
        }

        let field_type = match &node.kind {
            kind if kind.is_layout() => {
                self.compile_into(&node.children, target);
                None
            }
            ComponentKind::DataGrid | ComponentKind::EditGrid => {
                self.nested(node, target, false).map(FieldType::Rows)
            }
            ComponentKind::Container => {
                let strip = target.strip_unknown;
                self.nested(node, target, strip).map(FieldType::Object)
            }
            ComponentKind::TextField
            | ComponentKind::TextArea
            | ComponentKind::PhoneNumber => Some(FieldType::Text {
                email: false,
                min_length: length_bound(node.constraints.min_length),
                max_length: length_bound(node.constraints.max_length),
            }),
            ComponentKind::Email => Some(FieldType::Text {
                email: true,
                min_length: None,
                max_length: None,
            }),
            ComponentKind::Signature => Some(FieldType::text()),
            ComponentKind::Number => Some(FieldType::Number(number_rules(node))),
            ComponentKind::Other(_) if node.constraints.tree => {
                let strip = target.strip_unknown;
                self.nested(node, target, strip).map(FieldType::Object)
            }
            ComponentKind::Other(_) => {
                self.compile_into(&node.children, target);
                Some(FieldType::Any)
            }
            // Layout kinds are handled by the first arm.
            _ => None,
        };

        if let (Some(key), Some(field_type)) = (key, field_type) {
            target.insert(self.field(node, key, field_type));
        }
    }

    /// Compiles the children of a data-bearing container into their own
    /// object level. Keyless containers hold no data of their own; their
    /// children are compiled into the current level instead.
    fn nested(&mut self, node: &ComponentNode, target: &mut ObjectSchema, strip: bool) -> Option<ObjectSchema> {
        if node.key().is_none() {
            self.compile_into(&node.children, target);
            return None;
        }
        let mut schema = ObjectSchema::new(strip);
        self.compile_into(&node.children, &mut schema);
        Some(schema)
    }

    fn field(&self, node: &ComponentNode, key: &str, field_type: FieldType) -> FieldDef {
        let constraints = &node.constraints;
        let mut field = FieldDef::new(key, field_type);
        field.multiple = constraints.multiple;

        if !node.accepts_rules() {
            return field;
        }

        field.required = constraints.required;
        if field.field_type.is_text() {
            field.pattern = constraints.pattern.as_deref().and_then(|p| compile_pattern(key, p));
        }
        if let Some(script) = &constraints.custom {
            field.rules.push(DynamicRule::Script(script.clone()));
        }
        if let Some(logic) = &constraints.logic {
            field.rules.push(DynamicRule::Logic(logic.clone()));
        }
        if !field.rules.is_empty() {
            field.metadata = node.metadata();
        }
        field
    }
}

fn length_bound(bound: Option<f64>) -> Option<usize> {
    bound.filter(|b| *b >= 0.0 && b.is_finite()).map(|b| b as usize)
}

fn number_rules(node: &ComponentNode) -> NumberRules {
    let constraints = &node.constraints;
    let mut rules = NumberRules {
        min: constraints.min,
        max: constraints.max,
        greater: constraints.greater,
        less: constraints.less,
        ..NumberRules::default()
    };
    if let Some(step) = &constraints.step {
        rules.apply_step(step);
    }
    rules
}

fn compile_pattern(key: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            let error = e.to_string();
            log_event_with_fields(
                Event::PatternInvalid,
                &[("key", key), ("pattern", pattern), ("error", error.as_str())],
            );
            None
        }
    }
}
