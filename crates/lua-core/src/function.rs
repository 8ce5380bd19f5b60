//! Callable values.

use crate::args::LuaArgs;
use crate::error::LuaError;
use std::sync::{Arc, Weak};

/// Signature shared by script-compiled and host-provided functions.
pub type NativeFn = dyn Fn(LuaArgs) -> Result<LuaArgs, LuaError> + Send + Sync;

/// A function value: a shared native closure plus a debug name.
///
/// Compiled script functions and host functions have the same shape, so
/// `call_event` never needs to distinguish them.
#[derive(Clone)]
pub struct LuaFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl LuaFunction {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(LuaArgs) -> Result<LuaArgs, LuaError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function directly, bypassing `__call`.
    pub fn call(&self, args: LuaArgs) -> Result<LuaArgs, LuaError> {
        (self.func)(args)
    }

    /// Identity comparison; two clones of one function are equal.
    pub fn ptr_eq(&self, other: &LuaFunction) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.func), Arc::as_ptr(&other.func))
    }

    /// A handle that does not keep the function alive.
    pub fn downgrade(&self) -> WeakLuaFunction {
        WeakLuaFunction {
            name: Arc::clone(&self.name),
            func: Arc::downgrade(&self.func),
        }
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.func) as *const () as usize
    }
}

/// Non-owning reference to a [`LuaFunction`], used for self-references
/// that would otherwise form a cycle.
#[derive(Clone)]
pub struct WeakLuaFunction {
    name: Arc<str>,
    func: Weak<NativeFn>,
}

impl WeakLuaFunction {
    pub fn upgrade(&self) -> Option<LuaFunction> {
        Some(LuaFunction {
            name: Arc::clone(&self.name),
            func: self.func.upgrade()?,
        })
    }
}

impl std::fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<function {} @ {:#x}>", self.name, self.addr())
    }
}
