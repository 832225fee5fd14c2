//! Recursive-descent parser for rule scripts
//!
//! Produces a small statement/expression tree. Assignments only target plain
//! identifiers; member assignment is rejected at parse time so scripts can
//! never write into the bound data.

use crate::sandbox::errors::{EvalError, EvalResult};

use super::lexer::{tokenize, Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(AssignOp, String, Box<Expr>),
    Update { name: String, delta: f64, prefix: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare { constant: bool, names: Vec<(String, Option<Expr>)> },
    Expr(Expr),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Break,
    Continue,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

const RESERVED: &[&str] = &[
    "var", "let", "const", "if", "else", "while", "for", "return", "break", "continue", "true",
    "false", "null", "typeof", "function", "new", "this", "delete", "class", "do", "switch",
    "throw", "try",
];

/// Parses a script, enforcing the nesting limit.
pub fn parse(source: &str, max_depth: usize) -> EvalResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, cursor: 0, depth: 0, max_depth };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)].token
    }

    fn pos(&self) -> usize {
        self.tokens[self.cursor.min(self.tokens.len() - 1)].pos
    }

    fn on_new_line(&self) -> bool {
        self.tokens[self.cursor.min(self.tokens.len() - 1)].line_break
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(q) if *q == p)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(w) if w == word)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> EvalResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> EvalError {
        let found = match self.peek() {
            Token::Eof => "end of input".to_string(),
            Token::Num(n) => format!("number {}", n),
            Token::Str(_) => "string".to_string(),
            Token::Ident(name) => format!("token '{}'", name),
            Token::Punct(p) => format!("token '{}'", p),
        };
        EvalError::syntax(format!("Unexpected {}", found), self.pos())
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvalError::TooDeep(self.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Releases the levels taken by operators folded into a chain.
    fn leave_folded(&mut self, folded: usize) {
        self.depth -= folded;
    }

    fn identifier(&mut self) -> EvalResult<String> {
        match self.peek().clone() {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Consumes a statement terminator; semicolons are optional before `}`,
    /// end of input, or a new line of source.
    fn end_statement(&mut self) -> EvalResult<()> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() {
            return Ok(());
        }
        if self.on_new_line() {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn statement(&mut self) -> EvalResult<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> EvalResult<Stmt> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.eat_punct("{") {
            let mut body = Vec::new();
            while !self.eat_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            return Ok(Stmt::Block(body));
        }

        let keyword = match self.peek() {
            Token::Ident(word) => word.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "var" | "let" | "const" => {
                let decl = self.declaration()?;
                self.end_statement()?;
                Ok(decl)
            }
            "if" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.statement()?);
                let alternate = if self.is_keyword("else") {
                    self.advance();
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If(test, consequent, alternate))
            }
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                Ok(Stmt::While(test, Box::new(self.statement()?)))
            }
            "for" => self.for_statement(),
            "return" => {
                self.advance();
                let value = if self.is_punct(";") || self.is_punct("}") || self.at_eof() || self.on_new_line() {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            "break" => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt::Break)
            }
            "continue" => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt::Continue)
            }
            "function" | "new" | "this" | "delete" | "class" | "do" | "switch" | "throw" | "try" => {
                Err(EvalError::syntax(format!("'{}' is not supported", keyword), self.pos()))
            }
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn declaration(&mut self) -> EvalResult<Stmt> {
        let constant = self.is_keyword("const");
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.identifier()?;
            let init = if self.eat_punct("=") { Some(self.assignment()?) } else { None };
            if constant && init.is_none() {
                return Err(EvalError::syntax("Missing initializer in const declaration", self.pos()));
            }
            names.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare { constant, names })
    }

    fn for_statement(&mut self) -> EvalResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;

        let init = if self.eat_punct(";") {
            None
        } else {
            let init = if self.is_keyword("var") || self.is_keyword("let") || self.is_keyword("const") {
                self.declaration()?
            } else {
                Stmt::Expr(self.expression()?)
            };
            self.expect_punct(";")?;
            Some(Box::new(init))
        };

        let test = if self.is_punct(";") { None } else { Some(self.expression()?) };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") { None } else { Some(self.expression()?) };
        self.expect_punct(")")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::For { init, test, update, body })
    }

    fn expression(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let expr = self.assignment();
        self.leave();
        expr
    }

    fn assignment(&mut self) -> EvalResult<Expr> {
        let pos = self.pos();
        let target = self.conditional()?;

        let op = match self.peek() {
            Token::Punct("=") => AssignOp::Set,
            Token::Punct("+=") => AssignOp::Add,
            Token::Punct("-=") => AssignOp::Sub,
            Token::Punct("*=") => AssignOp::Mul,
            Token::Punct("/=") => AssignOp::Div,
            _ => return Ok(target),
        };
        self.advance();

        match target {
            Expr::Ident(name) => {
                let value = self.expression()?;
                Ok(Expr::Assign(op, name, Box::new(value)))
            }
            _ => Err(EvalError::syntax("Invalid left-hand side in assignment", pos)),
        }
    }

    fn conditional(&mut self) -> EvalResult<Expr> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect_punct(":")?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate)))
    }

    fn logical_or(&mut self) -> EvalResult<Expr> {
        let mut left = self.logical_and()?;
        let mut folded = 0;
        while self.eat_punct("||") {
            self.enter()?;
            folded += 1;
            let right = self.logical_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        self.leave_folded(folded);
        Ok(left)
    }

    fn logical_and(&mut self) -> EvalResult<Expr> {
        let mut left = self.equality()?;
        let mut folded = 0;
        while self.eat_punct("&&") {
            self.enter()?;
            folded += 1;
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        self.leave_folded(folded);
        Ok(left)
    }

    fn binary_level(
        &mut self,
        table: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> EvalResult<Expr>,
    ) -> EvalResult<Expr> {
        // Each folded operator nests the tree one level deeper.
        let mut left = next(self)?;
        let mut folded = 0;
        loop {
            let op = table.iter().find(|(p, _)| self.is_punct(p)).map(|(_, op)| *op);
            let Some(op) = op else {
                self.leave_folded(folded);
                return Ok(left);
            };
            self.advance();
            self.enter()?;
            folded += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn equality(&mut self) -> EvalResult<Expr> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNotEq),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> EvalResult<Expr> {
        self.binary_level(
            &[
                ("<=", BinaryOp::LtEq),
                (">=", BinaryOp::GtEq),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> EvalResult<Expr> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Ident(word) if word == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            self.enter()?;
            let operand = self.unary();
            self.leave();
            return Ok(Expr::Unary(op, Box::new(operand?)));
        }

        if self.is_punct("++") || self.is_punct("--") {
            let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
            self.advance();
            let pos = self.pos();
            return match self.postfix()? {
                Expr::Ident(name) => Ok(Expr::Update { name, delta, prefix: true }),
                _ => Err(EvalError::syntax("Invalid left-hand side expression in prefix operation", pos)),
            };
        }

        let pos = self.pos();
        let expr = self.postfix()?;
        if self.is_punct("++") || self.is_punct("--") {
            let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
            self.advance();
            return match expr {
                Expr::Ident(name) => Ok(Expr::Update { name, delta, prefix: false }),
                _ => Err(EvalError::syntax("Invalid left-hand side expression in postfix operation", pos)),
            };
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.primary()?;
        let mut folded = 0;
        loop {
            if self.is_punct(".") || self.is_punct("[") || self.is_punct("(") {
                self.enter()?;
                folded += 1;
            }
            if self.eat_punct(".") {
                let name = match self.advance() {
                    Token::Ident(name) => name,
                    _ => return Err(self.unexpected()),
                };
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_punct("(") {
                let mut args = Vec::new();
                if !self.eat_punct(")") {
                    loop {
                        args.push(self.expression()?);
                        if self.eat_punct(")") {
                            break;
                        }
                        self.expect_punct(",")?;
                    }
                }
                expr = Expr::Call(Box::new(expr), args);
            } else {
                self.leave_folded(folded);
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        match self.peek().clone() {
            Token::Num(n) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::Ident(word) => match word.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                _ => self.identifier().map(Expr::Ident),
            },
            Token::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.expression()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => {
                self.advance();
                let mut entries = Vec::new();
                while !self.eat_punct("}") {
                    let key = match self.advance() {
                        Token::Ident(name) => name,
                        Token::Str(s) => s,
                        Token::Num(n) => crate::sandbox::value::format_number(n),
                        _ => return Err(self.unexpected()),
                    };
                    self.expect_punct(":")?;
                    entries.push((key, self.expression()?));
                    if !self.eat_punct(",") {
                        self.expect_punct("}")?;
                        break;
                    }
                }
                Ok(Expr::Object(entries))
            }
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source, 64).unwrap()
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("x = 1 + 2 * 3;");
        let Stmt::Expr(Expr::Assign(AssignOp::Set, name, value)) = &program.body[0] else {
            panic!("expected assignment");
        };
        assert_eq!(name, "x");
        assert_eq!(
            **value,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Num(1.0)),
                Box::new(Expr::Binary(BinaryOp::Mul, Box::new(Expr::Num(2.0)), Box::new(Expr::Num(3.0))))
            )
        );
    }

    #[test]
    fn test_optional_semicolons() {
        let program = parse_ok("var a = 1\nvalid = a > 0\n");
        assert_eq!(program.body.len(), 2);
        assert!(parse("var a = 1 valid = 2", 64).is_err());
    }

    #[test]
    fn test_member_assignment_rejected() {
        let err = parse("data.name = 'x'", 64).unwrap_err();
        assert!(err.to_string().contains("Invalid left-hand side"));
        assert!(parse("row['a'] += 1", 64).is_err());
    }

    #[test]
    fn test_control_flow() {
        let program = parse_ok(
            "for (var i = 0; i < 3; i++) { if (i == 1) continue; else break; } while (false) {} return;",
        );
        assert!(matches!(program.body[0], Stmt::For { .. }));
        assert!(matches!(program.body[1], Stmt::While(..)));
        assert_eq!(program.body[2], Stmt::Return(None));
    }

    #[test]
    fn test_literals_and_calls() {
        let program = parse_ok("valid = ['a', 'b'].indexOf(input) !== -1 ? true : {msg: 'no'}");
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("valid = {}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&source, 32).unwrap_err(), EvalError::TooDeep(32));
        assert!(parse(&source, 512).is_ok());
    }

    #[test]
    fn test_long_operator_chains_count_toward_nesting() {
        let sum = format!("valid = 1{}", "+1".repeat(30_000));
        assert_eq!(parse(&sum, 64).unwrap_err(), EvalError::TooDeep(64));

        let conjunction = format!("valid = true{}", " && true".repeat(30_000));
        assert_eq!(parse(&conjunction, 64).unwrap_err(), EvalError::TooDeep(64));

        let members = format!("valid = input{}", ".length".repeat(30_000));
        assert_eq!(parse(&members, 64).unwrap_err(), EvalError::TooDeep(64));

        // Short chains and sibling statements stay within the limit
        assert!(parse(&format!("valid = 1{}", "+1".repeat(20)), 64).is_ok());
        assert!(parse(&"x = 1 + 1;\n".repeat(500), 64).is_ok());
    }

    #[test]
    fn test_unsupported_keywords() {
        assert!(parse("function f() {}", 64).is_err());
        assert!(parse("new Date()", 64).is_err());
    }
}
