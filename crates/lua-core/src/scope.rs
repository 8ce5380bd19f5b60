//! Lexical scope chain.
//!
//! A [`Scope`] is one node of a singly-linked chain of name → value maps.
//! Compiled functions capture the scope active at their definition and
//! create a child of it per invocation. The root of every chain is the
//! global scope of an embedding context.

use crate::args::LuaArgs;
use crate::value::LuaValue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Frame {
    vars: HashMap<String, LuaValue>,
    /// Extra arguments of the invocation that created this scope, if the
    /// function is variadic.
    varargs: Option<LuaArgs>,
    parent: Option<Scope>,
}

/// Shared handle to one scope node.
#[derive(Clone, Default)]
pub struct Scope(Arc<RwLock<Frame>>);

impl Scope {
    /// A fresh global scope with no bindings.
    pub fn root() -> Self {
        Self::default()
    }

    /// A new innermost scope whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Scope(Arc::new(RwLock::new(Frame {
            parent: Some(self.clone()),
            ..Frame::default()
        })))
    }

    /// Introduce (or shadow) `name` in this scope.
    pub fn declare(&self, name: impl Into<String>, value: LuaValue) {
        self.0.write().vars.insert(name.into(), value);
    }

    /// Walk outward and return the first binding of `name`, or `nil`.
    pub fn get(&self, name: &str) -> LuaValue {
        let mut cur = self.clone();
        loop {
            let parent = {
                let frame = cur.0.read();
                if let Some(v) = frame.vars.get(name) {
                    return v.clone();
                }
                match &frame.parent {
                    Some(p) => p.clone(),
                    None => return LuaValue::Nil,
                }
            };
            cur = parent;
        }
    }

    /// Assign to the innermost scope already binding `name`; if no scope
    /// binds it, create a global binding at the root.
    pub fn set(&self, name: &str, value: LuaValue) {
        let mut cur = self.clone();
        loop {
            let parent = {
                let mut frame = cur.0.write();
                if let Some(slot) = frame.vars.get_mut(name) {
                    *slot = value;
                    return;
                }
                match &frame.parent {
                    Some(p) => p.clone(),
                    None => {
                        frame.vars.insert(name.to_owned(), value);
                        return;
                    }
                }
            };
            cur = parent;
        }
    }

    /// `true` if some scope in the chain binds `name` (even to `nil`).
    pub fn is_bound(&self, name: &str) -> bool {
        let mut cur = self.clone();
        loop {
            let parent = {
                let frame = cur.0.read();
                if frame.vars.contains_key(name) {
                    return true;
                }
                match &frame.parent {
                    Some(p) => p.clone(),
                    None => return false,
                }
            };
            cur = parent;
        }
    }

    /// Attach the variadic arguments of the current invocation.
    pub fn set_varargs(&self, args: LuaArgs) {
        self.0.write().varargs = Some(args);
    }

    /// Variadic arguments of the nearest enclosing variadic invocation.
    pub fn varargs(&self) -> LuaArgs {
        let mut cur = self.clone();
        loop {
            let parent = {
                let frame = cur.0.read();
                if let Some(v) = &frame.varargs {
                    return v.clone();
                }
                match &frame.parent {
                    Some(p) => p.clone(),
                    None => return LuaArgs::new(),
                }
            };
            cur = parent;
        }
    }

    /// Names bound directly in this scope, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.0.read().vars.keys().cloned().collect()
    }

    /// Drop every binding of this scope.
    ///
    /// Closures stored in globals capture the global scope, so a context
    /// clears its root on drop to release those reference cycles.
    pub fn clear(&self) {
        let drained: Vec<LuaValue> = {
            let mut frame = self.0.write();
            frame.varargs = None;
            frame.vars.drain().map(|(_, v)| v).collect()
        };
        drop(drained);
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frame = self.0.read();
        f.debug_struct("Scope")
            .field("vars", &frame.vars.len())
            .field("root", &frame.parent.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_walks_outward() {
        let global = Scope::root();
        global.declare("x", LuaValue::Number(1.0));
        let inner = global.child().child();
        assert_eq!(inner.get("x"), LuaValue::Number(1.0));
    }

    #[test]
    fn missing_name_is_nil() {
        assert_eq!(Scope::root().child().get("nope"), LuaValue::Nil);
    }

    #[test]
    fn inner_declaration_shadows() {
        let global = Scope::root();
        global.declare("x", LuaValue::Number(1.0));
        let inner = global.child();
        inner.declare("x", LuaValue::Number(2.0));
        assert_eq!(inner.get("x"), LuaValue::Number(2.0));
        assert_eq!(global.get("x"), LuaValue::Number(1.0));
    }

    #[test]
    fn set_mutates_nearest_binding() {
        let global = Scope::root();
        let outer = global.child();
        outer.declare("x", LuaValue::Number(1.0));
        let inner = outer.child();
        inner.set("x", LuaValue::Number(5.0));
        assert_eq!(outer.get("x"), LuaValue::Number(5.0));
        assert!(!global.is_bound("x"));
    }

    #[test]
    fn set_of_unbound_name_creates_global() {
        let global = Scope::root();
        let inner = global.child().child();
        inner.set("g", LuaValue::Boolean(true));
        assert_eq!(global.get("g"), LuaValue::Boolean(true));
    }

    #[test]
    fn local_bound_to_nil_still_captures_assignment() {
        let global = Scope::root();
        let local = global.child();
        local.declare("x", LuaValue::Nil);
        local.child().set("x", LuaValue::Number(3.0));
        assert_eq!(local.get("x"), LuaValue::Number(3.0));
        assert!(!global.is_bound("x"));
    }

    #[test]
    fn varargs_found_in_enclosing_invocation() {
        let global = Scope::root();
        let call = global.child();
        call.set_varargs(LuaArgs::from(vec![LuaValue::Number(9.0)]));
        let block = call.child();
        assert_eq!(block.varargs().first(), LuaValue::Number(9.0));
        assert!(global.varargs().is_empty());
    }

    #[test]
    fn clear_releases_bindings() {
        let global = Scope::root();
        global.declare("t", LuaValue::new_table());
        global.clear();
        assert!(global.names().is_empty());
    }
}
