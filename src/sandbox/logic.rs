//! Logic-tree evaluation
//!
//! Rules are JSON documents in the json-logic dialect: an object with a
//! single key is an operation whose value holds the arguments, arrays
//! evaluate element-wise and everything else is a literal. Variables resolve
//! against `{data, row}` at the top level and against the current element
//! inside `map`, `filter`, `reduce`, `all`, `some` and `none`.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::errors::{EvalError, EvalResult};
use super::value::{compare, loose_eq, strict_eq, Kind, Val};

/// Evaluates `rule` with `data` and `row` bound.
pub fn evaluate_logic(rule: &Value, data: &Value, row: &Value, max_depth: usize) -> EvalResult<Value> {
    let evaluator = Evaluator { max_depth };
    let scope = Scope::Root { data, row };
    evaluator.eval(rule, &scope, 0).map(Val::into_json)
}

/// Truthiness of a logic result; unlike script truthiness an empty list is
/// false.
pub fn logic_truthy(value: &Value) -> bool {
    truthy(&Val::Ref(value))
}

fn truthy(value: &Val<'_>) -> bool {
    match value.kind() {
        Kind::Array(items) => !items.is_empty(),
        _ => value.truthy(),
    }
}

enum Scope<'a> {
    Root { data: &'a Value, row: &'a Value },
    Item(Val<'a>),
}

impl<'a> Scope<'a> {
    fn whole(&self) -> Val<'a> {
        match self {
            Scope::Root { data, row } => {
                let mut root = Map::new();
                root.insert("data".to_string(), (*data).clone());
                root.insert("row".to_string(), (*row).clone());
                Val::Own(Value::Object(root))
            }
            Scope::Item(value) => value.clone(),
        }
    }

    fn resolve(&self, path: &str) -> Option<Val<'a>> {
        if path.is_empty() {
            return Some(self.whole());
        }
        match self {
            Scope::Root { data, row } => {
                let (head, rest) = path.split_once('.').unwrap_or((path, ""));
                let start = match head {
                    "data" => Val::Ref(*data),
                    "row" => Val::Ref(*row),
                    _ => return None,
                };
                descend(start, rest)
            }
            Scope::Item(value) => descend(value.clone(), path),
        }
    }
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn descend<'a>(start: Val<'a>, path: &str) -> Option<Val<'a>> {
    let mut current = start;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Val::Ref(value) => Val::Ref(step(value, segment)?),
            Val::Own(value) => Val::Own(step(&value, segment)?.clone()),
            Val::Undefined | Val::Num(_) => return None,
        };
    }
    Some(current)
}

static NULL: Value = Value::Null;

struct Evaluator {
    max_depth: usize,
}

impl Evaluator {
    fn eval<'a>(&self, rule: &'a Value, scope: &Scope<'a>, depth: usize) -> EvalResult<Val<'a>> {
        if depth > self.max_depth {
            return Err(EvalError::TooDeep(self.max_depth));
        }
        match rule {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, scope, depth + 1)?.into_json());
                }
                Ok(Val::Own(Value::Array(out)))
            }
            Value::Object(map) if map.len() == 1 => {
                let Some((op, raw)) = map.iter().next() else {
                    return Ok(Val::Ref(rule));
                };
                let args: Vec<&'a Value> = match raw {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                self.operation(op, &args, scope, depth + 1)
            }
            literal => Ok(Val::Ref(literal)),
        }
    }

    fn eval_all<'a>(&self, args: &[&'a Value], scope: &Scope<'a>, depth: usize) -> EvalResult<Vec<Val<'a>>> {
        args.iter().map(|&arg| self.eval(arg, scope, depth)).collect()
    }

    fn operation<'a>(
        &self,
        op: &str,
        args: &[&'a Value],
        scope: &Scope<'a>,
        depth: usize,
    ) -> EvalResult<Val<'a>> {
        match op {
            "if" | "?:" => return self.branch(args, scope, depth),
            "and" | "or" => {
                let mut last = Val::Undefined;
                for &arg in args {
                    last = self.eval(arg, scope, depth)?;
                    if truthy(&last) == (op == "or") {
                        return Ok(last);
                    }
                }
                return Ok(last);
            }
            "map" | "filter" | "all" | "some" | "none" | "reduce" => {
                return self.iterate(op, args, scope, depth);
            }
            _ => {}
        }

        let values = self.eval_all(args, scope, depth)?;
        let arg = |i: usize| values.get(i).cloned().unwrap_or(Val::Undefined);
        let num = |i: usize| arg(i).to_number();

        Ok(match op {
            "var" => {
                let path = match arg(0) {
                    Val::Undefined => String::new(),
                    p if p.is_nullish() => String::new(),
                    p => p.to_js_string(),
                };
                match scope.resolve(&path) {
                    Some(found) if !found.is_nullish() => found,
                    _ => match arg(1) {
                        Val::Undefined => Val::null(),
                        default => default,
                    },
                }
            }
            "missing" => Val::Own(Value::Array(self.missing(&values, scope))),
            "missing_some" => {
                let need = num(0);
                let keys = arg(1);
                let (total, missing) = match keys.kind() {
                    Kind::Array(items) => (items.len(), self.missing(std::slice::from_ref(&keys), scope)),
                    _ => (0, Vec::new()),
                };
                if (total - missing.len()) as f64 >= need {
                    Val::Own(Value::Array(Vec::new()))
                } else {
                    Val::Own(Value::Array(missing))
                }
            }
            "==" => Val::bool(loose_eq(&arg(0), &arg(1))),
            "!=" => Val::bool(!loose_eq(&arg(0), &arg(1))),
            "===" => Val::bool(strict_eq(&arg(0), &arg(1))),
            "!==" => Val::bool(!strict_eq(&arg(0), &arg(1))),
            "!" => Val::bool(!truthy(&arg(0))),
            "!!" => Val::bool(truthy(&arg(0))),
            "<" | "<=" => {
                let ok = |a: &Val<'_>, b: &Val<'_>| match compare(a, b) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => op == "<=",
                    _ => false,
                };
                if values.len() >= 3 {
                    Val::bool(ok(&arg(0), &arg(1)) && ok(&arg(1), &arg(2)))
                } else {
                    Val::bool(ok(&arg(0), &arg(1)))
                }
            }
            ">" => Val::bool(compare(&arg(0), &arg(1)) == Some(Ordering::Greater)),
            ">=" => Val::bool(matches!(compare(&arg(0), &arg(1)), Some(Ordering::Greater | Ordering::Equal))),
            "+" => Val::Num(values.iter().map(Val::to_number).sum()),
            "*" => Val::Num(values.iter().map(Val::to_number).product()),
            "-" if values.len() == 1 => Val::Num(-num(0)),
            "-" => Val::Num(num(0) - num(1)),
            "/" => Val::Num(num(0) / num(1)),
            "%" => Val::Num(num(0) % num(1)),
            "min" => Val::Num(values.iter().map(Val::to_number).fold(f64::INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
            })),
            "max" => Val::Num(values.iter().map(Val::to_number).fold(f64::NEG_INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
            })),
            "cat" => Val::string(values.iter().map(Val::to_js_string).collect::<String>()),
            "substr" => {
                let source: Vec<char> = arg(0).to_js_string().chars().collect();
                let len = source.len() as i64;
                let start = num(1);
                let start = if start.is_nan() { 0 } else { start as i64 };
                let start = if start < 0 { len.saturating_add(start).max(0) } else { start.min(len) };
                let end = match arg(2) {
                    Val::Undefined => len,
                    n => {
                        let n = n.to_number();
                        let n = if n.is_nan() { 0 } else { n as i64 };
                        if n < 0 {
                            len.saturating_add(n).max(start)
                        } else {
                            start.saturating_add(n).min(len)
                        }
                    }
                };
                let end = end.max(start);
                Val::string(source[start as usize..end as usize].iter().collect::<String>())
            }
            "in" => {
                let needle = arg(0);
                match arg(1).kind() {
                    Kind::Str(haystack) => Val::bool(haystack.contains(needle.to_js_string().as_str())),
                    Kind::Array(items) => Val::bool(items.iter().any(|item| strict_eq(&Val::Ref(item), &needle))),
                    _ => Val::bool(false),
                }
            }
            "merge" => {
                let mut merged = Vec::new();
                for value in &values {
                    match value.kind() {
                        Kind::Array(items) => merged.extend(items.iter().cloned()),
                        _ => merged.push(value.to_json()),
                    }
                }
                Val::Own(Value::Array(merged))
            }
            _ => return Err(EvalError::UnknownOperation(op.to_string())),
        })
    }

    fn branch<'a>(&self, args: &[&'a Value], scope: &Scope<'a>, depth: usize) -> EvalResult<Val<'a>> {
        let mut i = 0;
        while i + 1 < args.len() {
            if truthy(&self.eval(args[i], scope, depth)?) {
                return self.eval(args[i + 1], scope, depth);
            }
            i += 2;
        }
        match args.get(i) {
            Some(otherwise) => self.eval(otherwise, scope, depth),
            None => Ok(Val::null()),
        }
    }

    fn missing(&self, values: &[Val<'_>], scope: &Scope<'_>) -> Vec<Value> {
        let keys: Vec<Val<'_>> = match values.first().map(Val::kind) {
            Some(Kind::Array(items)) => items.iter().map(Val::Ref).collect(),
            _ => values.to_vec(),
        };
        keys.iter()
            .filter(|key| {
                let found = scope.resolve(&key.to_js_string());
                match found {
                    None => true,
                    Some(value) => {
                        value.is_nullish() || matches!(value.kind(), Kind::Str(s) if s.is_empty())
                    }
                }
            })
            .map(Val::to_json)
            .collect()
    }

    fn iterate<'a>(&self, op: &str, args: &[&'a Value], scope: &Scope<'a>, depth: usize) -> EvalResult<Val<'a>> {
        let source = match args.first().copied() {
            Some(arg) => self.eval(arg, scope, depth)?,
            None => Val::Undefined,
        };
        let items: Vec<Val<'a>> = match source {
            Val::Ref(value) => match value {
                Value::Array(items) => items.iter().map(Val::Ref).collect(),
                _ => Vec::new(),
            },
            Val::Own(Value::Array(items)) => items.into_iter().map(Val::Own).collect(),
            _ => Vec::new(),
        };
        let body: &'a Value = args.get(1).copied().unwrap_or(&NULL);

        match op {
            "map" => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(body, &Scope::Item(item), depth)?.into_json());
                }
                Ok(Val::Own(Value::Array(out)))
            }
            "filter" => {
                let mut out = Vec::new();
                for item in items {
                    if truthy(&self.eval(body, &Scope::Item(item.clone()), depth)?) {
                        out.push(item.into_json());
                    }
                }
                Ok(Val::Own(Value::Array(out)))
            }
            "all" => {
                if items.is_empty() {
                    return Ok(Val::bool(false));
                }
                for item in items {
                    if !truthy(&self.eval(body, &Scope::Item(item), depth)?) {
                        return Ok(Val::bool(false));
                    }
                }
                Ok(Val::bool(true))
            }
            "some" | "none" => {
                let mut any = false;
                for item in items {
                    if truthy(&self.eval(body, &Scope::Item(item), depth)?) {
                        any = true;
                        break;
                    }
                }
                Ok(Val::bool(if op == "some" { any } else { !any }))
            }
            _ => {
                let mut accumulator = match args.get(2).copied() {
                    Some(initial) => self.eval(initial, scope, depth)?,
                    None => Val::null(),
                };
                for item in items {
                    let mut frame = Map::new();
                    frame.insert("current".to_string(), item.into_json());
                    frame.insert("accumulator".to_string(), accumulator.into_json());
                    accumulator = self.eval(body, &Scope::Item(Val::Own(Value::Object(frame))), depth)?;
                }
                Ok(accumulator)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(rule: Value, data: Value) -> Value {
        evaluate_logic(&rule, &data, &Value::Null, 64).unwrap()
    }

    #[test]
    fn test_var_and_comparison() {
        let data = json!({ "age": 20, "name": "Ada" });
        assert_eq!(eval(json!({ ">=": [{ "var": "data.age" }, 18] }), data.clone()), json!(true));
        assert_eq!(eval(json!({ "var": ["data.missing", "fallback"] }), data.clone()), json!("fallback"));
        assert_eq!(eval(json!({ "==": [{ "var": "data.age" }, "20"] }), data), json!(true));
    }

    #[test]
    fn test_row_binding() {
        let row = json!({ "qty": 3 });
        let rule = json!({ "*": [{ "var": "row.qty" }, 2] });
        assert_eq!(evaluate_logic(&rule, &json!({}), &row, 64).unwrap(), json!(6));
    }

    #[test]
    fn test_between() {
        let rule = json!({ "<": [1, { "var": "data.x" }, 10] });
        assert_eq!(eval(rule.clone(), json!({ "x": 5 })), json!(true));
        assert_eq!(eval(rule, json!({ "x": 10 })), json!(false));
        assert_eq!(eval(json!({ "<=": [1, 1, 10] }), json!({})), json!(true));
    }

    #[test]
    fn test_if_and_logic() {
        let rule = json!({ "if": [{ "var": "data.a" }, "yes", { "var": "data.b" }, "maybe", "no"] });
        assert_eq!(eval(rule.clone(), json!({ "a": true })), json!("yes"));
        assert_eq!(eval(rule.clone(), json!({ "b": 1 })), json!("maybe"));
        assert_eq!(eval(rule, json!({})), json!("no"));
        assert_eq!(eval(json!({ "and": [true, 0, 5] }), json!({})), json!(0));
        assert_eq!(eval(json!({ "or": [false, "", "x"] }), json!({})), json!("x"));
        assert_eq!(eval(json!({ "!!": [[]] }), json!({})), json!(false));
    }

    #[test]
    fn test_missing() {
        let data = json!({ "a": 1, "b": "" });
        assert_eq!(eval(json!({ "missing": ["data.a", "data.b", "data.c"] }), data.clone()), json!(["data.b", "data.c"]));
        assert_eq!(eval(json!({ "missing_some": [1, ["data.a", "data.c"]] }), data.clone()), json!([]));
        assert_eq!(eval(json!({ "missing_some": [2, ["data.a", "data.c"]] }), data), json!(["data.c"]));
    }

    #[test]
    fn test_array_operations() {
        let data = json!({ "items": [1, 2, 3, 4] });
        assert_eq!(
            eval(json!({ "map": [{ "var": "data.items" }, { "*": [{ "var": "" }, 2] }] }), data.clone()),
            json!([2, 4, 6, 8])
        );
        assert_eq!(
            eval(json!({ "filter": [{ "var": "data.items" }, { ">": [{ "var": "" }, 2] }] }), data.clone()),
            json!([3, 4])
        );
        assert_eq!(
            eval(
                json!({ "reduce": [{ "var": "data.items" }, { "+": [{ "var": "current" }, { "var": "accumulator" }] }, 0] }),
                data.clone()
            ),
            json!(10)
        );
        assert_eq!(eval(json!({ "all": [{ "var": "data.items" }, { ">": [{ "var": "" }, 0] }] }), data.clone()), json!(true));
        assert_eq!(eval(json!({ "some": [{ "var": "data.items" }, { ">": [{ "var": "" }, 3] }] }), data.clone()), json!(true));
        assert_eq!(eval(json!({ "none": [{ "var": "data.items" }, { ">": [{ "var": "" }, 9] }] }), data.clone()), json!(true));
        assert_eq!(eval(json!({ "all": [[], true] }), data), json!(false));
    }

    #[test]
    fn test_strings() {
        assert_eq!(eval(json!({ "cat": ["a", 1, true] }), json!({})), json!("a1true"));
        assert_eq!(eval(json!({ "substr": ["jsonlogic", 4] }), json!({})), json!("logic"));
        assert_eq!(eval(json!({ "substr": ["jsonlogic", -5, 3] }), json!({})), json!("log"));
        assert_eq!(eval(json!({ "substr": ["jsonlogic", 1, -3] }), json!({})), json!("sonlo"));
        assert_eq!(eval(json!({ "in": ["log", "jsonlogic"] }), json!({})), json!(true));
        assert_eq!(eval(json!({ "in": ["b", ["a", "b"]] }), json!({})), json!(true));
        assert_eq!(eval(json!({ "merge": [[1], 2, [3, 4]] }), json!({})), json!([1, 2, 3, 4]));
    }

    #[test]
    fn test_substr_with_out_of_range_bounds() {
        assert_eq!(eval(json!({ "substr": ["abc", 1, 1e300] }), json!({})), json!("bc"));
        assert_eq!(eval(json!({ "substr": ["abc", 1, -1e300] }), json!({})), json!(""));
        assert_eq!(eval(json!({ "substr": ["abc", -1e300] }), json!({})), json!("abc"));
        assert_eq!(eval(json!({ "substr": ["abc", 1e300, 2] }), json!({})), json!(""));
    }

    #[test]
    fn test_unknown_operation() {
        let err = evaluate_logic(&json!({ "frobnicate": [1] }), &json!({}), &Value::Null, 64).unwrap_err();
        assert_eq!(err, EvalError::UnknownOperation("frobnicate".into()));
        assert_eq!(err.to_string(), "Unrecognized operation frobnicate");
    }

    #[test]
    fn test_depth_limit() {
        let mut rule = json!(true);
        for _ in 0..50 {
            rule = json!({ "!": [rule] });
        }
        assert_eq!(evaluate_logic(&rule, &json!({}), &Value::Null, 16).unwrap_err(), EvalError::TooDeep(16));
        assert!(evaluate_logic(&rule, &json!({}), &Value::Null, 128).is_ok());
    }
}
