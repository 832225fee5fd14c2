//! Component tree types
//!
//! Forms arrive as form-builder JSON. Loading is lenient: a property with the
//! wrong JSON type is treated as absent, and an entry of a `components` list
//! that is not an object becomes an unconstrained leaf. A form never fails to
//! load because of one bad node.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use tracing::warn;

use super::path::DataPath;

/// Component type tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    TextField,
    TextArea,
    PhoneNumber,
    Email,
    Number,
    Signature,
    DataGrid,
    EditGrid,
    Container,
    Fieldset,
    Panel,
    Well,
    Table,
    Columns,
    /// Unrecognized or custom tag
    Other(String),
}

impl ComponentKind {
    /// Maps a form-builder type tag onto a kind.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "textfield" => ComponentKind::TextField,
            "textarea" => ComponentKind::TextArea,
            "phonenumber" => ComponentKind::PhoneNumber,
            "email" => ComponentKind::Email,
            "number" => ComponentKind::Number,
            "signature" => ComponentKind::Signature,
            "datagrid" => ComponentKind::DataGrid,
            "editgrid" => ComponentKind::EditGrid,
            "container" => ComponentKind::Container,
            "fieldset" => ComponentKind::Fieldset,
            "panel" => ComponentKind::Panel,
            "well" => ComponentKind::Well,
            "table" => ComponentKind::Table,
            "columns" => ComponentKind::Columns,
            other => ComponentKind::Other(other.to_string()),
        }
    }

    /// Returns the form-builder type tag.
    pub fn tag(&self) -> &str {
        match self {
            ComponentKind::TextField => "textfield",
            ComponentKind::TextArea => "textarea",
            ComponentKind::PhoneNumber => "phonenumber",
            ComponentKind::Email => "email",
            ComponentKind::Number => "number",
            ComponentKind::Signature => "signature",
            ComponentKind::DataGrid => "datagrid",
            ComponentKind::EditGrid => "editgrid",
            ComponentKind::Container => "container",
            ComponentKind::Fieldset => "fieldset",
            ComponentKind::Panel => "panel",
            ComponentKind::Well => "well",
            ComponentKind::Table => "table",
            ComponentKind::Columns => "columns",
            ComponentKind::Other(tag) => tag,
        }
    }

    /// Layout kinds never hold data of their own.
    pub fn is_layout(&self) -> bool {
        matches!(
            self,
            ComponentKind::Fieldset
                | ComponentKind::Panel
                | ComponentKind::Well
                | ComponentKind::Table
                | ComponentKind::Columns
        )
    }

    /// Repeating kinds hold a list of row objects.
    pub fn is_repeating(&self) -> bool {
        matches!(self, ComponentKind::DataGrid | ComponentKind::EditGrid)
    }
}

impl Serialize for ComponentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// Constraint metadata attached to a component.
///
/// Combines the form-builder `validate` block with the top-level flags that
/// steer validation and sanitizing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greater: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub less: Option<f64>,
    /// Numeric step as written by the form author, e.g. `"0.01"` or `"any"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Scripted custom rule source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    /// Logic-tree rule
    #[serde(rename = "json", skip_serializing_if = "Option::is_none")]
    pub logic: Option<Value>,
    pub unique: bool,
    pub multiple: bool,
    pub persistent: bool,
    pub clear_on_hide: bool,
    pub tree: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_conditional: Option<String>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            required: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            greater: None,
            less: None,
            step: None,
            pattern: None,
            custom: None,
            logic: None,
            unique: false,
            multiple: false,
            persistent: true,
            clear_on_hide: true,
            tree: false,
            custom_conditional: None,
        }
    }
}

/// Declarative show/hide condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional {
    /// Show (or hide) when the field `when` equals `eq`
    Simple { when: String, eq: Value, show: Value },
    /// Logic tree evaluated against `{data, row}`
    Logic(Value),
}

/// One node of a form's component tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    key: Option<String>,
    pub kind: ComponentKind,
    pub label: Option<String>,
    pub children: Vec<ComponentNode>,
    pub constraints: Constraints,
    pub conditional: Option<Conditional>,
}

impl ComponentNode {
    /// Creates a node with default constraints and no children.
    pub fn new(kind: ComponentKind, key: Option<&str>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(str::to_string),
            kind,
            label: None,
            children: Vec::new(),
            constraints: Constraints::default(),
            conditional: None,
        }
    }

    /// Builds a node from form-builder JSON. Never fails.
    pub fn from_value(value: &Value) -> Self {
        if !value.is_object() {
            warn!(node = %value, "malformed component, treating as unconstrained leaf");
            return Self::new(ComponentKind::Other(String::new()), None);
        }

        match RawComponent::deserialize(value) {
            Ok(raw) => raw.into(),
            Err(e) => {
                warn!(error = %e, "malformed component, treating as unconstrained leaf");
                Self::new(ComponentKind::Other(String::new()), None)
            }
        }
    }

    /// Returns the data key, if the node has a non-empty one.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Label for messages; falls back to the key.
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.is_empty())
            .or(self.key.as_deref())
            .unwrap_or("")
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<ComponentNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_conditional(mut self, conditional: Conditional) -> Self {
        self.conditional = Some(conditional);
        self
    }

    /// Whether the node's data lives one level deeper than its parent's.
    pub fn introduces_nesting(&self) -> bool {
        self.key.is_some()
            && (self.kind.is_repeating()
                || self.kind == ComponentKind::Container
                || self.constraints.tree)
    }

    /// Path under which this node's children store their data.
    pub fn child_path(&self, parent: &DataPath) -> DataPath {
        match self.key() {
            Some(key) if self.introduces_nesting() => {
                let path = parent.child(key);
                if self.kind.is_repeating() || self.constraints.multiple {
                    path.each()
                } else {
                    path
                }
            }
            _ => parent.clone(),
        }
    }

    /// Whether constraint-driven rules may be attached to this node.
    ///
    /// Embedded keys (containing a dot) and non-persistent fields are
    /// composed but never constrained.
    pub fn accepts_rules(&self) -> bool {
        match self.key() {
            Some(key) => !key.contains('.') && self.constraints.persistent,
            None => false,
        }
    }

    /// Read-only metadata exposed to scripts as `component`.
    pub fn metadata(&self) -> Value {
        json!({
            "key": self.key,
            "label": self.label,
            "type": self.kind,
            "multiple": self.constraints.multiple,
            "unique": self.constraints.unique,
            "validate": self.constraints,
        })
    }
}

impl<'de> Deserialize<'de> for ComponentNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// A form definition: the root of a component tree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Form {
    #[serde(rename = "_id", default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub components: Vec<ComponentNode>,
}

impl Form {
    pub fn new(id: Option<&str>, components: Vec<ComponentNode>) -> Self {
        Self {
            id: id.map(str::to_string),
            components,
        }
    }
}

/// Form-builder JSON shape, before normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawComponent {
    #[serde(deserialize_with = "lenient")]
    key: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient")]
    kind: Option<String>,
    #[serde(deserialize_with = "lenient")]
    label: Option<String>,
    #[serde(deserialize_with = "lenient")]
    components: Option<Vec<Value>>,
    #[serde(deserialize_with = "lenient")]
    columns: Option<Vec<RawCell>>,
    #[serde(deserialize_with = "lenient")]
    rows: Option<Vec<Vec<RawCell>>>,
    #[serde(deserialize_with = "lenient")]
    validate: Option<RawValidate>,
    #[serde(deserialize_with = "flag")]
    unique: Option<bool>,
    #[serde(deserialize_with = "flag")]
    multiple: Option<bool>,
    #[serde(deserialize_with = "flag")]
    persistent: Option<bool>,
    #[serde(deserialize_with = "flag")]
    clear_on_hide: Option<bool>,
    #[serde(deserialize_with = "flag")]
    tree: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    custom_conditional: Option<String>,
    #[serde(deserialize_with = "lenient")]
    conditional: Option<RawConditional>,
}

/// A column of a `columns` component or a cell of a `table` row.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCell {
    #[serde(deserialize_with = "lenient")]
    components: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawValidate {
    #[serde(deserialize_with = "flag")]
    required: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    min_length: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    max_length: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    min: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    max: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    greater: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    less: Option<f64>,
    #[serde(deserialize_with = "step")]
    step: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pattern: Option<String>,
    #[serde(deserialize_with = "lenient")]
    custom: Option<String>,
    json: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConditional {
    show: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    when: Option<String>,
    eq: Option<Value>,
    json: Option<Value>,
}

impl From<RawComponent> for ComponentNode {
    fn from(raw: RawComponent) -> Self {
        // Columns take precedence over rows, rows over plain components.
        let child_values: Vec<Value> = if let Some(columns) = raw.columns {
            columns
                .into_iter()
                .flat_map(|cell| cell.components.unwrap_or_default())
                .collect()
        } else if let Some(rows) = raw.rows {
            rows.into_iter()
                .flatten()
                .flat_map(|cell| cell.components.unwrap_or_default())
                .collect()
        } else {
            raw.components.unwrap_or_default()
        };

        let validate = raw.validate.unwrap_or_default();
        let defaults = Constraints::default();
        let constraints = Constraints {
            required: validate.required.unwrap_or(false),
            min_length: validate.min_length,
            max_length: validate.max_length,
            min: validate.min,
            max: validate.max,
            greater: validate.greater,
            less: validate.less,
            step: validate.step,
            pattern: validate.pattern.filter(|p| !p.is_empty()),
            custom: validate.custom.filter(|c| !c.trim().is_empty()),
            logic: validate.json.filter(is_truthy_json),
            unique: raw.unique.unwrap_or(false),
            multiple: raw.multiple.unwrap_or(false),
            persistent: raw.persistent.unwrap_or(defaults.persistent),
            clear_on_hide: raw.clear_on_hide.unwrap_or(defaults.clear_on_hide),
            tree: raw.tree.unwrap_or(false),
            custom_conditional: raw.custom_conditional.filter(|c| !c.trim().is_empty()),
        };

        let conditional = raw.conditional.and_then(|c| match c.when {
            Some(when) if !when.is_empty() => Some(Conditional::Simple {
                when,
                eq: c.eq.unwrap_or(Value::Null),
                show: c.show.unwrap_or(Value::Null),
            }),
            _ => c.json.filter(is_truthy_json).map(Conditional::Logic),
        });

        Self {
            key: raw.key.filter(|k| !k.is_empty()),
            kind: ComponentKind::from_tag(raw.kind.as_deref().unwrap_or("")),
            label: raw.label,
            children: child_values.iter().map(ComponentNode::from_value).collect(),
            constraints,
            conditional,
        }
    }
}

fn is_truthy_json(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Deserializes a value, treating a type mismatch as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<ComponentNode>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(ComponentNode::from_value).collect(),
        _ => Vec::new(),
    })
}

/// Accepts booleans and the strings `"true"` / `"false"`.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => Some(b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    })
}

/// Steps are usually strings, but numeric steps are accepted as written.
fn step<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
