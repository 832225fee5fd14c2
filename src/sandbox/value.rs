//! Runtime values shared by the script interpreter and the logic evaluator
//!
//! Values borrow from the bound data document wherever possible, so member
//! access on `data` never copies the document. Coercions follow the loose
//! rules form authors expect from browser scripting.

use std::cmp::Ordering;

use serde_json::Value;

use super::errors::{EvalError, EvalResult};

#[derive(Debug, Clone)]
pub enum Val<'a> {
    Undefined,
    /// Numbers produced at runtime, NaN and infinities included
    Num(f64),
    /// Borrowed from a binding
    Ref(&'a Value),
    Own(Value),
}

/// Borrowed classification of a [`Val`].
#[derive(Debug, Clone, Copy)]
pub enum Kind<'v> {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(&'v str),
    Array(&'v [Value]),
    Object,
}

fn classify(value: &Value) -> Kind<'_> {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(b) => Kind::Bool(*b),
        Value::Number(n) => Kind::Num(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Kind::Str(s),
        Value::Array(items) => Kind::Array(items),
        Value::Object(_) => Kind::Object,
    }
}

impl<'a> Val<'a> {
    pub fn bool(b: bool) -> Self {
        Val::Own(Value::Bool(b))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Val::Own(Value::String(s.into()))
    }

    pub fn null() -> Self {
        Val::Own(Value::Null)
    }

    /// Wraps an optional borrowed value, `None` becoming undefined.
    pub fn from_ref(value: Option<&'a Value>) -> Self {
        value.map_or(Val::Undefined, Val::Ref)
    }

    pub fn kind(&self) -> Kind<'_> {
        match self {
            Val::Undefined => Kind::Undefined,
            Val::Num(n) => Kind::Num(*n),
            Val::Ref(v) => classify(v),
            Val::Own(v) => classify(v),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self.kind(), Kind::Undefined | Kind::Null)
    }

    /// Converts to JSON; undefined and non-finite numbers become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Val::Undefined => Value::Null,
            Val::Num(n) => number_value(*n),
            Val::Ref(v) => (*v).clone(),
            Val::Own(v) => v.clone(),
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            Val::Own(v) => v,
            other => other.to_json(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self.kind() {
            Kind::Undefined | Kind::Null => false,
            Kind::Bool(b) => b,
            Kind::Num(n) => n != 0.0 && !n.is_nan(),
            Kind::Str(s) => !s.is_empty(),
            Kind::Array(_) | Kind::Object => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self.kind() {
            Kind::Undefined => f64::NAN,
            Kind::Null => 0.0,
            Kind::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Kind::Num(n) => n,
            Kind::Str(s) => parse_number(s),
            Kind::Array(items) => match items {
                [] => 0.0,
                [single] => Val::Ref(single).to_number(),
                _ => f64::NAN,
            },
            Kind::Object => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> String {
        match self.kind() {
            Kind::Undefined => "undefined".to_string(),
            Kind::Null => "null".to_string(),
            Kind::Bool(b) => b.to_string(),
            Kind::Num(n) => format_number(n),
            Kind::Str(s) => s.to_string(),
            Kind::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => Val::Ref(other).to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Kind::Object => "[object Object]".to_string(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self.kind() {
            Kind::Undefined => "undefined",
            Kind::Bool(_) => "boolean",
            Kind::Num(_) => "number",
            Kind::Str(_) => "string",
            Kind::Null | Kind::Array(_) | Kind::Object => "object",
        }
    }

    /// Property access, `value.name`.
    pub fn member(&self, name: &str) -> EvalResult<Val<'a>> {
        match self {
            Val::Ref(v) => member_of(*v, name).map(|found| found.map_or(Val::Undefined, Val::Ref)),
            Val::Own(v) => member_of(v, name).map(|found| found.cloned().map_or(Val::Undefined, Val::Own)),
            Val::Undefined => Err(cannot_read(name, "undefined")),
            Val::Num(_) => Ok(Val::Undefined),
        }
        .or_else(|err| match (name, self.kind()) {
            ("length", Kind::Str(s)) => Ok(Val::Num(s.encode_utf16().count() as f64)),
            ("length", Kind::Array(items)) => Ok(Val::Num(items.len() as f64)),
            _ => Err(err),
        })
    }

    /// Computed access, `value[index]`.
    pub fn index(&self, index: &Val<'_>) -> EvalResult<Val<'a>> {
        if self.is_nullish() {
            return Err(cannot_read(&index.to_js_string(), &self.to_js_string()));
        }
        if let Some(i) = as_index(index) {
            match self.kind() {
                Kind::Str(s) => {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map_or(Val::Undefined, |c| Val::string(c.to_string())));
                }
                Kind::Array(_) => {
                    return Ok(match self {
                        Val::Ref(v) => Val::from_ref((*v).get(i)),
                        Val::Own(v) => v.get(i).cloned().map_or(Val::Undefined, Val::Own),
                        _ => Val::Undefined,
                    });
                }
                _ => {}
            }
        }
        self.member(&index.to_js_string())
    }
}

/// Returns `Ok(None)` for a missing property, `Err` only for access on null.
fn member_of<'v>(value: &'v Value, name: &str) -> EvalResult<Option<&'v Value>> {
    match value {
        Value::Null => Err(cannot_read(name, "null")),
        Value::Object(map) => Ok(map.get(name)),
        Value::String(_) | Value::Array(_) if name == "length" => {
            Err(EvalError::runtime("length is computed"))
        }
        _ => Ok(None),
    }
}

fn cannot_read(name: &str, of: &str) -> EvalError {
    EvalError::runtime(format!("TypeError: Cannot read property '{}' of {}", name, of))
}

fn as_index(index: &Val<'_>) -> Option<usize> {
    match index.kind() {
        Kind::Num(n) if n >= 0.0 && n.fract() == 0.0 && n.is_finite() => Some(n as usize),
        Kind::Str(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// String-to-number conversion used by `Number(x)` and arithmetic.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn same_ref(a: &Val<'_>, b: &Val<'_>) -> bool {
    match (a, b) {
        (Val::Ref(x), Val::Ref(y)) => std::ptr::eq(*x, *y),
        _ => false,
    }
}

/// `===`
pub fn strict_eq(a: &Val<'_>, b: &Val<'_>) -> bool {
    match (a.kind(), b.kind()) {
        (Kind::Undefined, Kind::Undefined) | (Kind::Null, Kind::Null) => true,
        (Kind::Bool(x), Kind::Bool(y)) => x == y,
        (Kind::Num(x), Kind::Num(y)) => x == y,
        (Kind::Str(x), Kind::Str(y)) => x == y,
        (Kind::Array(_), Kind::Array(_)) | (Kind::Object, Kind::Object) => same_ref(a, b),
        _ => false,
    }
}

/// `==`
pub fn loose_eq(a: &Val<'_>, b: &Val<'_>) -> bool {
    let composite = |k: &Kind<'_>| matches!(k, Kind::Array(_) | Kind::Object);
    let (ka, kb) = (a.kind(), b.kind());
    match (ka, kb) {
        (Kind::Undefined | Kind::Null, Kind::Undefined | Kind::Null) => true,
        (Kind::Undefined | Kind::Null, _) | (_, Kind::Undefined | Kind::Null) => false,
        (Kind::Str(x), Kind::Str(y)) => x == y,
        (Kind::Bool(x), Kind::Bool(y)) => x == y,
        (Kind::Num(x), Kind::Num(y)) => x == y,
        _ if composite(&ka) && composite(&kb) => same_ref(a, b),
        _ if composite(&ka) => loose_eq(&Val::string(a.to_js_string()), b),
        _ if composite(&kb) => loose_eq(a, &Val::string(b.to_js_string())),
        _ => a.to_number() == b.to_number(),
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`; `None` when either side is NaN.
pub fn compare(a: &Val<'_>, b: &Val<'_>) -> Option<Ordering> {
    match (a.kind(), b.kind()) {
        (Kind::Str(x), Kind::Str(y)) => Some(x.cmp(y)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    }
}
