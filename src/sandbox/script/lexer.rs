//! Tokenizer for rule scripts

use crate::sandbox::errors::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    /// Identifiers and keywords
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
    /// A line break separates this token from the previous one
    pub line_break: bool,
}

/// Longest first so `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "(",
    ")", "[", "]", "{", "}", ",", ";", ".", "?", ":", "+", "-", "*", "/", "%", "<", ">", "=", "!",
];

pub fn tokenize(source: &str) -> EvalResult<Vec<Spanned>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line_break = false;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            line_break |= c == '\n';
            i += 1;
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(EvalError::syntax("unterminated comment", start));
                }
                if chars[i] == '*' && chars[i + 1] == '/' {
                    i += 2;
                    break;
                }
                line_break |= chars[i] == '\n';
                i += 1;
            }
            continue;
        }

        let start = i;

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let (value, next) = read_number(&chars, i)?;
            tokens.push(Spanned { token: Token::Num(value), pos: start, line_break });
            line_break = false;
            i = next;
            continue;
        }

        if c == '"' || c == '\'' {
            let (value, next) = read_string(&chars, i)?;
            tokens.push(Spanned { token: Token::Str(value), pos: start, line_break });
            line_break = false;
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push(Spanned { token: Token::Ident(ident), pos: start, line_break });
            line_break = false;
            continue;
        }

        let punct = PUNCTUATORS.iter().find(|p| {
            let len = p.chars().count();
            i + len <= chars.len() && p.chars().zip(&chars[i..i + len]).all(|(a, b)| a == *b)
        });
        match punct {
            Some(p) => {
                tokens.push(Spanned { token: Token::Punct(p), pos: start, line_break });
                line_break = false;
                i += p.len();
            }
            None => {
                return Err(EvalError::syntax(format!("Unexpected character '{}'", c), start));
            }
        }
    }

    tokens.push(Spanned { token: Token::Eof, pos: chars.len(), line_break });
    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> EvalResult<(f64, usize)> {
    let mut i = start;
    let digits = |i: &mut usize| {
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
    };

    digits(&mut i);
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        digits(&mut i);
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            i = j;
            digits(&mut i);
        }
    }
    if i < chars.len() && (chars[i].is_alphabetic() || chars[i] == '_') {
        return Err(EvalError::syntax("Invalid or unexpected token", i));
    }

    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|value| (value, i))
        .map_err(|_| EvalError::syntax(format!("Invalid number '{}'", text), start))
}

fn read_string(chars: &[char], start: usize) -> EvalResult<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    loop {
        let Some(&c) = chars.get(i) else {
            return Err(EvalError::syntax("Invalid or unexpected token", start));
        };
        i += 1;
        match c {
            c if c == quote => return Ok((out, i)),
            '\n' => return Err(EvalError::syntax("Invalid or unexpected token", start)),
            '\\' => {
                let Some(&escaped) = chars.get(i) else {
                    return Err(EvalError::syntax("Invalid or unexpected token", start));
                };
                i += 1;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'v' => out.push('\u{b}'),
                    '0' => out.push('\0'),
                    'u' => {
                        let hex: String = chars.iter().skip(i).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| EvalError::syntax("Invalid Unicode escape sequence", i))?;
                        out.push(code);
                        i += 4;
                    }
                    '\n' => {}
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
}
