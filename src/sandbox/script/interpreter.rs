//! Tree-walking interpreter for rule scripts
//!
//! Bound values are read-only; scripts only ever write into their own flat
//! local table. Every statement and expression costs one step. The step
//! ceiling is checked on each step, the wall clock every 64 steps.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::sandbox::errors::{EvalError, EvalResult};
use crate::sandbox::value::{compare, format_number, loose_eq, strict_eq, Kind, Val};

use super::parser::{AssignOp, BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};

const CLOCK_CHECK_INTERVAL: u64 = 64;

/// Largest string a script may build, in bytes.
const MAX_STRING_BYTES: usize = 1 << 20;

/// Execution budget for one script run.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub timeout_ms: u64,
    pub max_steps: u64,
}

enum Flow<'a> {
    Normal,
    Break,
    Continue,
    Return(Val<'a>),
}

pub struct Interpreter<'a> {
    globals: Vec<(&'static str, Val<'a>)>,
    locals: HashMap<String, Val<'a>>,
    constants: HashSet<String>,
    budget: Budget,
    steps: u64,
    started: Instant,
}

impl<'a> Interpreter<'a> {
    pub fn new(globals: Vec<(&'static str, Val<'a>)>, budget: Budget) -> Self {
        Self {
            globals,
            locals: HashMap::new(),
            constants: HashSet::new(),
            budget,
            steps: 0,
            started: Instant::now(),
        }
    }

    /// Pre-declares a mutable local such as `valid`.
    pub fn declare(&mut self, name: &str, value: Val<'a>) {
        self.locals.insert(name.to_string(), value);
    }

    pub fn local(&self, name: &str) -> Option<&Val<'a>> {
        self.locals.get(name)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs the program. Returns the `return` value if one was hit.
    pub fn run(&mut self, program: &Program) -> EvalResult<Option<Val<'a>>> {
        self.started = Instant::now();
        for stmt in &program.body {
            match self.exec(stmt)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(Some(value)),
                Flow::Break | Flow::Continue => {
                    return Err(EvalError::runtime("SyntaxError: Illegal break or continue statement"));
                }
            }
        }
        Ok(None)
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.budget.max_steps {
            return Err(EvalError::StepLimit(self.budget.max_steps));
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0
            && self.started.elapsed() >= Duration::from_millis(self.budget.timeout_ms)
        {
            return Err(EvalError::Timeout(self.budget.timeout_ms));
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<Flow<'a>> {
        self.tick()?;
        match stmt {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Declare { constant, names } => {
                for (name, init) in names {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Val::Undefined,
                    };
                    self.locals.insert(name.clone(), value);
                    if *constant {
                        self.constants.insert(name.clone());
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => {
                for stmt in body {
                    match self.exec(stmt)? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::If(test, consequent, alternate) => {
                if self.eval(test)?.truthy() {
                    self.exec(consequent)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(test, body) => {
                while self.eval(test)?.truthy() {
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { init, test, update, body } => {
                if let Some(init) = init {
                    self.exec(init)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test)?.truthy() {
                            break;
                        }
                    } else {
                        self.tick()?;
                    }
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Val::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn lookup(&self, name: &str) -> Option<Val<'a>> {
        if let Some(value) = self.locals.get(name) {
            return Some(value.clone());
        }
        if let Some((_, value)) = self.globals.iter().find(|(global, _)| *global == name) {
            return Some(value.clone());
        }
        match name {
            "undefined" => Some(Val::Undefined),
            "NaN" => Some(Val::Num(f64::NAN)),
            "Infinity" => Some(Val::Num(f64::INFINITY)),
            _ => None,
        }
    }

    fn resolve(&self, name: &str) -> EvalResult<Val<'a>> {
        self.lookup(name)
            .ok_or_else(|| EvalError::runtime(format!("ReferenceError: {} is not defined", name)))
    }

    fn assign(&mut self, name: &str, value: Val<'a>) -> EvalResult<()> {
        if self.constants.contains(name) {
            return Err(EvalError::runtime("TypeError: Assignment to constant variable."));
        }
        self.locals.insert(name.to_string(), value);
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Val<'a>> {
        self.tick()?;
        match expr {
            Expr::Num(n) => Ok(Val::Num(*n)),
            Expr::Str(s) => Ok(Val::string(s.clone())),
            Expr::Bool(b) => Ok(Val::bool(*b)),
            Expr::Null => Ok(Val::null()),
            Expr::Ident(name) => self.resolve(name),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?.into_json());
                }
                Ok(Val::Own(Value::Array(out)))
            }
            Expr::Object(entries) => {
                let mut out = Map::new();
                for (key, value) in entries {
                    out.insert(key.clone(), self.eval(value)?.into_json());
                }
                Ok(Val::Own(Value::Object(out)))
            }
            Expr::Member(object, name) => self.eval(object)?.member(name),
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                object.index(&index)
            }
            Expr::Call(callee, args) => self.call(callee, args),
            Expr::Unary(op, operand) => self.unary(*op, operand),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign(op, name, value) => {
                let value = self.eval(value)?;
                let value = match op {
                    AssignOp::Set => value,
                    AssignOp::Add => binary(BinaryOp::Add, &self.resolve(name)?, &value)?,
                    AssignOp::Sub => binary(BinaryOp::Sub, &self.resolve(name)?, &value)?,
                    AssignOp::Mul => binary(BinaryOp::Mul, &self.resolve(name)?, &value)?,
                    AssignOp::Div => binary(BinaryOp::Div, &self.resolve(name)?, &value)?,
                };
                self.assign(name, value.clone())?;
                Ok(value)
            }
            Expr::Update { name, delta, prefix } => {
                let old = self.resolve(name)?.to_number();
                let new = old + delta;
                self.assign(name, Val::Num(new))?;
                Ok(Val::Num(if *prefix { new } else { old }))
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> EvalResult<Val<'a>> {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = operand {
                return Ok(Val::string(self.lookup(name).map_or("undefined", |v| v.type_of())));
            }
        }
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Not => Val::bool(!value.truthy()),
            UnaryOp::Neg => Val::Num(-value.to_number()),
            UnaryOp::Plus => Val::Num(value.to_number()),
            UnaryOp::TypeOf => Val::string(value.type_of()),
        })
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> EvalResult<Val<'a>> {
        match callee {
            Expr::Member(object, method) => {
                if let Expr::Ident(namespace) = object.as_ref() {
                    if self.lookup(namespace).is_none() {
                        let args = self.eval_args(args)?;
                        return namespace_call(namespace, method, &args);
                    }
                }
                let receiver = self.eval(object)?;
                let args = self.eval_args(args)?;
                call_method(&receiver, method, &args)
            }
            Expr::Ident(name) if !self.locals.contains_key(name) => {
                let args = self.eval_args(args)?;
                global_call(name, &args)
            }
            _ => Err(EvalError::runtime("TypeError: expression is not a function")),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> EvalResult<Vec<Val<'a>>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }
}

fn arg<'a, 'v>(args: &'v [Val<'a>], i: usize) -> &'v Val<'a> {
    const UNDEFINED: &Val<'static> = &Val::Undefined;
    args.get(i).unwrap_or(UNDEFINED)
}

fn checked_string<'a>(s: String) -> EvalResult<Val<'a>> {
    if s.len() > MAX_STRING_BYTES {
        return Err(EvalError::runtime("RangeError: Invalid string length"));
    }
    Ok(Val::string(s))
}

fn binary<'a>(op: BinaryOp, left: &Val<'a>, right: &Val<'a>) -> EvalResult<Val<'a>> {
    use std::cmp::Ordering;

    let textual = |v: &Val<'_>| matches!(v.kind(), Kind::Str(_) | Kind::Array(_) | Kind::Object);
    Ok(match op {
        BinaryOp::Add if textual(left) || textual(right) => {
            checked_string(left.to_js_string() + &right.to_js_string())?
        }
        BinaryOp::Add => Val::Num(left.to_number() + right.to_number()),
        BinaryOp::Sub => Val::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Val::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Val::Num(left.to_number() / right.to_number()),
        BinaryOp::Rem => Val::Num(left.to_number() % right.to_number()),
        BinaryOp::Eq => Val::bool(loose_eq(left, right)),
        BinaryOp::NotEq => Val::bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Val::bool(strict_eq(left, right)),
        BinaryOp::StrictNotEq => Val::bool(!strict_eq(left, right)),
        BinaryOp::Lt => Val::bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LtEq => Val::bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Val::bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GtEq => Val::bool(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal))),
    })
}

fn global_call<'a>(name: &str, args: &[Val<'a>]) -> EvalResult<Val<'a>> {
    let first = arg(args, 0);
    Ok(match name {
        "Number" if args.is_empty() => Val::Num(0.0),
        "Number" => Val::Num(first.to_number()),
        "String" if args.is_empty() => Val::string(""),
        "String" => Val::string(first.to_js_string()),
        "Boolean" => Val::bool(first.truthy()),
        "isNaN" => Val::bool(first.to_number().is_nan()),
        "parseFloat" => Val::Num(parse_float(&first.to_js_string())),
        "parseInt" => {
            let radix = match arg(args, 1) {
                Val::Undefined => None,
                r => Some(r.to_number()),
            };
            Val::Num(parse_int(&first.to_js_string(), radix))
        }
        _ => {
            return Err(EvalError::runtime(format!("ReferenceError: {} is not defined", name)));
        }
    })
}

fn namespace_call<'a>(namespace: &str, method: &str, args: &[Val<'a>]) -> EvalResult<Val<'a>> {
    let nums: Vec<f64> = args.iter().map(|a| a.to_number()).collect();
    let first = nums.first().copied().unwrap_or(f64::NAN);
    Ok(match (namespace, method) {
        ("Math", "abs") => Val::Num(first.abs()),
        ("Math", "floor") => Val::Num(first.floor()),
        ("Math", "ceil") => Val::Num(first.ceil()),
        ("Math", "round") => Val::Num((first + 0.5).floor()),
        ("Math", "sqrt") => Val::Num(first.sqrt()),
        ("Math", "pow") => Val::Num(first.powf(nums.get(1).copied().unwrap_or(f64::NAN))),
        ("Math", "min") => Val::Num(nums.iter().copied().fold(f64::INFINITY, js_min)),
        ("Math", "max") => Val::Num(nums.iter().copied().fold(f64::NEG_INFINITY, js_max)),
        ("Array", "isArray") => Val::bool(matches!(arg(args, 0).kind(), Kind::Array(_))),
        _ => {
            return Err(EvalError::runtime(format!("ReferenceError: {} is not defined", namespace)));
        }
    })
}

fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn elements<'a>(receiver: &Val<'a>) -> Vec<Val<'a>> {
    match receiver {
        Val::Ref(value) => match *value {
            Value::Array(items) => items.iter().map(Val::Ref).collect(),
            _ => Vec::new(),
        },
        Val::Own(Value::Array(items)) => items.iter().cloned().map(Val::Own).collect(),
        _ => Vec::new(),
    }
}

/// Resolves a possibly negative relative index against `len`.
fn relative_index(value: &Val<'_>, len: usize, default: usize) -> usize {
    if matches!(value, Val::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn call_method<'a>(receiver: &Val<'a>, method: &str, args: &[Val<'a>]) -> EvalResult<Val<'a>> {
    match receiver.kind() {
        Kind::Str(s) => string_method(s, method, args),
        Kind::Array(_) => array_method(receiver, method, args),
        Kind::Num(n) => match method {
            "toString" => Ok(Val::string(format_number(n))),
            "toFixed" => {
                let digits = arg(args, 0).to_number();
                let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
                Ok(Val::string(format!("{:.*}", digits, n)))
            }
            _ => Err(not_a_function(receiver, method)),
        },
        Kind::Undefined | Kind::Null => Err(EvalError::runtime(format!(
            "TypeError: Cannot read property '{}' of {}",
            method,
            receiver.to_js_string()
        ))),
        _ => Err(not_a_function(receiver, method)),
    }
}

fn not_a_function(receiver: &Val<'_>, method: &str) -> EvalError {
    EvalError::runtime(format!("TypeError: {}.{} is not a function", receiver.type_of(), method))
}

fn char_index(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

fn string_method<'a>(s: &str, method: &str, args: &[Val<'a>]) -> EvalResult<Val<'a>> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text_arg = |i: usize| arg(args, i).to_js_string();

    Ok(match method {
        "toString" => Val::string(s),
        "toLowerCase" => Val::string(s.to_lowercase()),
        "toUpperCase" => Val::string(s.to_uppercase()),
        "trim" => Val::string(s.trim()),
        "includes" => Val::bool(s.contains(text_arg(0).as_str())),
        "startsWith" => Val::bool(s.starts_with(text_arg(0).as_str())),
        "endsWith" => Val::bool(s.ends_with(text_arg(0).as_str())),
        "indexOf" => {
            let from = relative_index(arg(args, 1), len, 0);
            let rest: String = chars[from..].iter().collect();
            match rest.find(text_arg(0).as_str()) {
                Some(byte) => Val::Num((from + char_index(&rest, byte)) as f64),
                None => Val::Num(-1.0),
            }
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            match chars.get(i as usize).filter(|_| i >= 0.0) {
                Some(c) => Val::string(c.to_string()),
                None => Val::string(""),
            }
        }
        "slice" => {
            let start = relative_index(arg(args, 0), len, 0);
            let end = relative_index(arg(args, 1), len, len);
            Val::string(if start < end { chars[start..end].iter().collect() } else { String::new() })
        }
        "substring" => {
            let clamp = |v: &Val<'_>, default: usize| {
                if matches!(v, Val::Undefined) {
                    return default;
                }
                let n = v.to_number();
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    (n as usize).min(len)
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Val::string(chars[start..end].iter().collect::<String>())
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Val::Undefined => vec![Value::String(s.to_string())],
                sep => {
                    let sep = sep.to_js_string();
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
                    }
                }
            };
            Val::Own(Value::Array(parts))
        }
        _ => return Err(not_a_function(&Val::string(s), method)),
    })
}

fn array_method<'a>(receiver: &Val<'a>, method: &str, args: &[Val<'a>]) -> EvalResult<Val<'a>> {
    let items = elements(receiver);
    let len = items.len();

    Ok(match method {
        "toString" => checked_string(receiver.to_js_string())?,
        "indexOf" => {
            let needle = arg(args, 0);
            let from = relative_index(arg(args, 1), len, 0);
            let found = items.iter().skip(from).position(|item| strict_eq(item, needle));
            Val::Num(found.map_or(-1.0, |i| (i + from) as f64))
        }
        "includes" => {
            let needle = arg(args, 0);
            let nan = needle.to_number().is_nan() && matches!(needle.kind(), Kind::Num(_));
            Val::bool(items.iter().any(|item| {
                strict_eq(item, needle) || (nan && matches!(item.kind(), Kind::Num(n) if n.is_nan()))
            }))
        }
        "join" => {
            let sep = match arg(args, 0) {
                Val::Undefined => ",".to_string(),
                sep => sep.to_js_string(),
            };
            let joined = items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                .collect::<Vec<_>>()
                .join(&sep);
            checked_string(joined)?
        }
        "slice" => {
            let start = relative_index(arg(args, 0), len, 0);
            let end = relative_index(arg(args, 1), len, len);
            let picked = if start < end {
                items[start..end].iter().map(Val::to_json).collect()
            } else {
                Vec::new()
            };
            Val::Own(Value::Array(picked))
        }
        _ => return Err(not_a_function(receiver, method)),
    })
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    if trimmed.trim_start_matches(['+', '-']).starts_with("Infinity") {
        return if trimmed.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let candidate = trimmed
        .find(|c: char| !matches!(c, '0'..='9' | '+' | '-' | '.' | 'e' | 'E'))
        .unwrap_or(trimmed.len());
    (1..=candidate)
        .rev()
        .find_map(|end| trimmed[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn parse_int(text: &str, radix: Option<f64>) -> f64 {
    let mut rest = text.trim();
    let negative = rest.starts_with('-');
    if negative || rest.starts_with('+') {
        rest = &rest[1..];
    }

    // 0 means "not given"
    let mut radix = match radix {
        Some(r) if r.is_finite() => r.trunc() as i64,
        _ => 0,
    };
    if (radix == 0 || radix == 16) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let radix = radix as u32;

    let digits: Vec<u32> = rest.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits.iter().fold(0.0, |acc, d| acc * radix as f64 + *d as f64);
    if negative {
        -value
    } else {
        value
    }
}
