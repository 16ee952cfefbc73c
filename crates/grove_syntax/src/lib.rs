//! Syntax layer for grove.
//!
//! This crate provides:
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: Executable document AST
//! - `parser`: Recursive descent parser
//!
//! Only executable documents (operations and fragments) are supported.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use error::ParseError;
pub use lexer::Lexer;
pub use parser::{parse, parse_document, ParseResult};
pub use token::{Token, TokenKind};
