/*!
# Tarn Syntax

Lexer, AST and parser for the Tarn language.

Tarn is a small statically typed, expression-oriented language. This crate
covers the surface syntax only: it turns source text into a token stream
([`token::tokenize`]) and a token stream into an AST ([`parser::parse_program`]).
Type checking and code generation live in `tarn-core`.

## Example

```
use tarn_syntax::parse_program;

let program = parse_program("fun main(): Int { 40 + 2 }").unwrap();
assert_eq!(program.items.len(), 1);
```
*/

pub mod ast;
pub mod parser;
pub mod token;

pub use ast::{
    BinaryOp, Expr, Field, FieldInit, Function, Item, Param, Program, Stmt, StructDef, TypeExpr,
    UnaryOp,
};
pub use parser::{parse_program, Parser};
pub use token::{tokenize, Spanned, SpannedToken, Token};

use thiserror::Error;

/// Errors produced while tokenizing or parsing Tarn source text.
///
/// Positions are 1-based line/column pairs computed from byte offsets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unrecognized token `{text}` at line {line}, column {column}")]
    InvalidToken {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("expected {expected}, found {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("string literals cannot be used as values at line {line}, column {column}")]
    StringLiteral { line: usize, column: usize },
}

pub type Result<T> = std::result::Result<T, ParseError>;
