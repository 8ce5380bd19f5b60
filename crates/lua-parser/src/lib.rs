//! `lua-parser`: builds a syntax tree from a token stream produced by `lua-lexer`.

pub mod ast;
pub mod parser;

pub use ast::{Block, Expr, FuncBody, Stmt};
pub use parser::Parser;

use lua_core::LuaError;

/// Lex and parse a whole chunk.
pub fn parse(src: &str) -> Result<Block, LuaError> {
    Parser::new(src)?.parse()
}
