//! `lua-runtime`: execution contexts, chunk loading and the base library.

mod lua;
pub mod stdlib;

pub use lua::{Lua, LuaConfig};
pub use lua_core::{LuaArgs, LuaError, LuaFunction, LuaTable, LuaValue, Scope, TableRef, UserData};
