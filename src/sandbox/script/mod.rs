//! Restricted scripting language for custom rules and conditionals

mod interpreter;
mod lexer;
mod parser;

pub use interpreter::{Budget, Interpreter};
pub use parser::parse;
