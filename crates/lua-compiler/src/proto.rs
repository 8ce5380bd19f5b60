use crate::flow::{CompiledBlock, Flow};
use lua_core::{LuaArgs, LuaError, LuaFunction, LuaValue, Scope, WeakLuaFunction};
use std::cell::Cell;
use std::sync::{Arc, OnceLock};

/// Compiled form of a function body, shared by every closure created from it.
pub(crate) struct Proto {
    pub(crate) name: Arc<str>,
    pub(crate) params: Vec<String>,
    pub(crate) vararg: bool,
    pub(crate) body: CompiledBlock,
    pub(crate) max_call_depth: usize,
}

impl Proto {
    /// Create a function value closing over `scope`.
    pub(crate) fn instantiate(proto: &Arc<Proto>, scope: &Scope) -> LuaFunction {
        let proto = Arc::clone(proto);
        let captured = scope.clone();
        LuaFunction::new(Arc::clone(&proto.name), move |args| proto.invoke(&captured, args))
    }

    /// Create the closure of `local function name`.
    ///
    /// The function closes over `scope` and rebinds `name` to itself in a
    /// fresh frame on every call. It holds itself only weakly, so storing it
    /// in the caller's scope does not form a cycle.
    pub(crate) fn instantiate_recursive(proto: &Arc<Proto>, scope: &Scope, name: &str) -> LuaFunction {
        let proto = Arc::clone(proto);
        let captured = scope.clone();
        let binding = name.to_owned();
        let this: Arc<OnceLock<WeakLuaFunction>> = Arc::default();
        let slot = Arc::clone(&this);
        let func = LuaFunction::new(Arc::clone(&proto.name), move |args| {
            let frame = captured.child();
            let me = slot.get().and_then(WeakLuaFunction::upgrade);
            frame.declare(binding.as_str(), me.map_or(LuaValue::Nil, LuaValue::Function));
            proto.invoke(&frame, args)
        });
        let _ = this.set(func.downgrade());
        func
    }

    fn invoke(&self, captured: &Scope, args: LuaArgs) -> Result<LuaArgs, LuaError> {
        let _depth = DepthGuard::enter(self.max_call_depth)?;
        let scope = captured.child();
        for (i, param) in self.params.iter().enumerate() {
            scope.declare(param.as_str(), args.get(i));
        }
        if self.vararg {
            scope.set_varargs(args.tail(self.params.len()));
        }
        match self.body.run(scope)?.0 {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(LuaArgs::new()),
        }
    }
}

// ── Call-depth guard ─────────────────────────────────────────────────────────

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts nested compiled-function invocations on this thread; the count is
/// released when the guard drops, including on error paths.
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> Result<Self, LuaError> {
        CALL_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(LuaError::StackOverflow);
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
pub(crate) fn current_depth() -> usize {
    CALL_DEPTH.with(Cell::get)
}
