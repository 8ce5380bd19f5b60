//! `lua-core`: foundational types shared across the lua-rust workspace.
//!
//! This crate defines:
//! - [`LuaValue`]: the dynamically-typed value enum
//! - [`LuaTable`] and [`LuaFunction`]: the reference types behind it
//! - [`LuaError`]: the unified error type
//! - [`Scope`]: the lexical environment chain compiled code runs in
//! - [`events`]: metatable-driven dispatch for every dynamic operator

pub mod args;
pub mod error;
pub mod events;
pub mod function;
pub mod scope;
pub mod table;
pub mod value;

pub use args::LuaArgs;
pub use error::LuaError;
pub use function::{LuaFunction, NativeFn, WeakLuaFunction};
pub use scope::Scope;
pub use table::{LuaTable, TableKey, TableRef};
pub use value::{format_number, LuaValue, ThreadHandle, UserData};
