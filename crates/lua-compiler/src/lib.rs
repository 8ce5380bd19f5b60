//! `lua-compiler`: compiles the syntax tree into directly executable closures.

pub mod compiler;
pub mod flow;
mod proto;

pub use compiler::{Compiler, DEFAULT_MAX_CALL_DEPTH};
pub use flow::Flow;
