//! Compiled node shapes and block execution.

use crate::proto::Proto;
use lua_core::{LuaArgs, LuaError, LuaValue, Scope};
use std::sync::Arc;

/// Control signal returned by every compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Continue with the next statement.
    Normal,
    /// Leave the innermost enclosing loop.
    Break,
    /// Leave the enclosing function with these values.
    Return(LuaArgs),
}

/// An expression adjusted to exactly one value.
pub(crate) type ExprFn = Arc<dyn Fn(&Scope) -> Result<LuaValue, LuaError> + Send + Sync>;

/// An expression list, with the last multi-valued expression expanded.
pub(crate) type ListFn = Arc<dyn Fn(&Scope) -> Result<LuaArgs, LuaError> + Send + Sync>;

pub(crate) type StmtFn = Arc<dyn Fn(&Scope) -> Result<Flow, LuaError> + Send + Sync>;

/// One step of a compiled block.
///
/// Local declarations are steps rather than plain statements because each one
/// opens a fresh scope for the rest of the block. Closures created earlier in
/// the block keep the scope they captured and never see the new local.
pub(crate) enum Step {
    Exec(StmtFn),
    Local { names: Vec<String>, values: ListFn },
    LocalFunction { name: String, proto: Arc<Proto> },
}

pub(crate) struct CompiledBlock {
    pub(crate) steps: Vec<Step>,
    pub(crate) ret: Option<ListFn>,
}

impl CompiledBlock {
    /// Run the block in `scope`, which the caller has already created for it.
    ///
    /// Returns the final flow signal together with the innermost scope the
    /// block ended in, so `repeat ... until` can evaluate its condition with
    /// the body's locals visible.
    pub(crate) fn run(&self, scope: Scope) -> Result<(Flow, Scope), LuaError> {
        let mut scope = scope;
        for step in &self.steps {
            match step {
                Step::Exec(stmt) => match stmt(&scope)? {
                    Flow::Normal => {}
                    flow => return Ok((flow, scope)),
                },
                Step::Local { names, values } => {
                    let values = values(&scope)?;
                    scope = scope.child();
                    for (i, name) in names.iter().enumerate() {
                        scope.declare(name.as_str(), values.get(i));
                    }
                }
                Step::LocalFunction { name, proto } => {
                    let func = Proto::instantiate_recursive(proto, &scope, name);
                    scope = scope.child();
                    scope.declare(name.as_str(), LuaValue::Function(func));
                }
            }
        }
        match &self.ret {
            Some(values) => {
                let values = values(&scope)?;
                Ok((Flow::Return(values), scope))
            }
            None => Ok((Flow::Normal, scope)),
        }
    }

    /// Run the block in a fresh child of `parent` and return only its flow.
    pub(crate) fn exec(&self, parent: &Scope) -> Result<Flow, LuaError> {
        Ok(self.run(parent.child())?.0)
    }
}
