use crate::flow::{CompiledBlock, ExprFn, Flow, ListFn, Step, StmtFn};
use crate::proto::Proto;
use lua_core::events::{self, ArithOp};
use lua_core::{LuaArgs, LuaError, LuaFunction, LuaTable, LuaValue, Scope};
use lua_parser::ast::{BinOp, Block, CallArgs, Expr, Field, FuncBody, FuncName, Line, Stmt, UnOp};
use std::sync::Arc;

/// Nesting limit for compiled-function invocations unless configured otherwise.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

// ── Closure constructors ─────────────────────────────────────────────────────

fn expr_fn(f: impl Fn(&Scope) -> Result<LuaValue, LuaError> + Send + Sync + 'static) -> ExprFn {
    Arc::new(f)
}

fn list_fn(f: impl Fn(&Scope) -> Result<LuaArgs, LuaError> + Send + Sync + 'static) -> ListFn {
    Arc::new(f)
}

fn stmt_fn(f: impl Fn(&Scope) -> Result<Flow, LuaError> + Send + Sync + 'static) -> StmtFn {
    Arc::new(f)
}

fn constant(value: LuaValue) -> ExprFn {
    expr_fn(move |_| Ok(value.clone()))
}

fn syntax_error(line: Line, message: impl Into<String>) -> LuaError {
    LuaError::Parse {
        line,
        message: message.into(),
    }
}

// ── Compiler ─────────────────────────────────────────────────────────────────

/// Compiles syntax trees into callable [`LuaFunction`]s.
///
/// There is no bytecode: each node becomes a closure that calls the closures
/// of its children. Compile-time state is per function body; nested function
/// bodies are compiled by a fresh copy.
#[derive(Debug, Clone)]
pub struct Compiler {
    chunk_name: Arc<str>,
    max_call_depth: usize,
    /// Enclosing loops in the function body being compiled.
    loop_depth: usize,
    /// Whether the function body being compiled may use `...`.
    vararg: bool,
}

impl Compiler {
    pub fn new(chunk_name: impl Into<Arc<str>>) -> Self {
        Self {
            chunk_name: chunk_name.into(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            loop_depth: 0,
            vararg: true,
        }
    }

    /// Limit nested invocations of functions compiled by this compiler.
    pub fn max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    pub fn chunk_name(&self) -> &str {
        &self.chunk_name
    }

    /// Compile a whole chunk into a variadic function closing over `scope`.
    #[tracing::instrument(level = "debug", skip_all, fields(chunk = %self.chunk_name))]
    pub fn compile_chunk(&self, block: &Block, scope: &Scope) -> Result<LuaFunction, LuaError> {
        let proto = self.compile_proto(Arc::clone(&self.chunk_name), &[], true, block)?;
        tracing::debug!(statements = block.stmts.len(), "compiled chunk");
        Ok(Proto::instantiate(&proto, scope))
    }

    fn compile_proto(
        &self,
        name: Arc<str>,
        params: &[String],
        vararg: bool,
        block: &Block,
    ) -> Result<Arc<Proto>, LuaError> {
        let mut inner = Compiler {
            loop_depth: 0,
            vararg,
            ..self.clone()
        };
        let body = inner.compile_block(block)?;
        Ok(Arc::new(Proto {
            name,
            params: params.to_vec(),
            vararg,
            body,
            max_call_depth: self.max_call_depth,
        }))
    }

    // ── Blocks & statements ───────────────────────────────────────────────────

    fn compile_block(&mut self, block: &Block) -> Result<CompiledBlock, LuaError> {
        let mut steps = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            steps.push(self.compile_stmt(stmt)?);
        }
        let ret = match &block.ret {
            Some(ret) => Some(self.compile_expr_list(&ret.values)?),
            None => None,
        };
        Ok(CompiledBlock { steps, ret })
    }

    fn compile_loop_body(&mut self, body: &Block) -> Result<CompiledBlock, LuaError> {
        self.loop_depth += 1;
        let compiled = self.compile_block(body);
        self.loop_depth -= 1;
        compiled
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<Step, LuaError> {
        let exec = match stmt {
            Stmt::Local { names, values, .. } => {
                return Ok(Step::Local {
                    names: names.clone(),
                    values: self.compile_expr_list(values)?,
                });
            }
            Stmt::LocalFunction { name, body, .. } => {
                let proto =
                    self.compile_proto(Arc::from(name.as_str()), &body.params, body.vararg, &body.body)?;
                return Ok(Step::LocalFunction {
                    name: name.clone(),
                    proto,
                });
            }
            Stmt::Assign { targets, values, .. } => self.compile_assign(targets, values)?,
            Stmt::Call(call) => {
                let call = self.compile_multi(call)?;
                stmt_fn(move |scope| {
                    call(scope)?;
                    Ok(Flow::Normal)
                })
            }
            Stmt::Do(body) => {
                let body = self.compile_block(body)?;
                stmt_fn(move |scope| body.exec(scope))
            }
            Stmt::While { cond, body, .. } => self.compile_while(cond, body)?,
            Stmt::Repeat { body, cond, .. } => self.compile_repeat(body, cond)?,
            Stmt::If { clauses, else_, .. } => self.compile_if(clauses, else_.as_ref())?,
            Stmt::NumericFor {
                var,
                start,
                limit,
                step,
                body,
                ..
            } => self.compile_numeric_for(var, start, limit, step.as_ref(), body)?,
            Stmt::GenericFor {
                vars,
                iterators,
                body,
                ..
            } => self.compile_generic_for(vars, iterators, body)?,
            Stmt::Function { name, body, .. } => self.compile_function_stat(name, body)?,
            Stmt::Break(line) => {
                if self.loop_depth == 0 {
                    return Err(syntax_error(*line, "break outside a loop"));
                }
                stmt_fn(|_| Ok(Flow::Break))
            }
        };
        Ok(Step::Exec(exec))
    }

    /// All target prefixes and keys are evaluated, then every right-hand
    /// side, then the stores happen left to right.
    fn compile_assign(&mut self, targets: &[Expr], values: &[Expr]) -> Result<StmtFn, LuaError> {
        enum Target {
            Name(String),
            Index(ExprFn, ExprFn),
        }
        enum Place<'a> {
            Name(&'a str),
            Index(LuaValue, LuaValue),
        }

        let mut compiled = Vec::with_capacity(targets.len());
        for target in targets {
            compiled.push(match target {
                Expr::Name(name, _) => Target::Name(name.clone()),
                Expr::Index { table, key, .. } => {
                    Target::Index(self.compile_expr(table)?, self.compile_expr(key)?)
                }
                other => return Err(syntax_error(other.line(), "cannot assign to this expression")),
            });
        }
        let values = self.compile_expr_list(values)?;

        Ok(stmt_fn(move |scope| {
            let mut places = Vec::with_capacity(compiled.len());
            for target in &compiled {
                places.push(match target {
                    Target::Name(name) => Place::Name(name),
                    Target::Index(table, key) => Place::Index(table(scope)?, key(scope)?),
                });
            }
            let values = values(scope)?;
            for (i, place) in places.into_iter().enumerate() {
                match place {
                    Place::Name(name) => scope.set(name, values.get(i)),
                    Place::Index(table, key) => events::newindex_event(&table, key, values.get(i))?,
                }
            }
            Ok(Flow::Normal)
        }))
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block) -> Result<StmtFn, LuaError> {
        let cond = self.compile_expr(cond)?;
        let body = self.compile_loop_body(body)?;
        Ok(stmt_fn(move |scope| {
            while cond(scope)?.is_truthy() {
                match body.exec(scope)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            }
            Ok(Flow::Normal)
        }))
    }

    /// The `until` condition runs in the body's scope, so it sees body locals.
    fn compile_repeat(&mut self, body: &Block, cond: &Expr) -> Result<StmtFn, LuaError> {
        let body = self.compile_loop_body(body)?;
        let cond = self.compile_expr(cond)?;
        Ok(stmt_fn(move |scope| loop {
            let (flow, inner) = body.run(scope.child())?;
            match flow {
                Flow::Normal => {}
                Flow::Break => return Ok(Flow::Normal),
                ret @ Flow::Return(_) => return Ok(ret),
            }
            if cond(&inner)?.is_truthy() {
                return Ok(Flow::Normal);
            }
        }))
    }

    fn compile_if(&mut self, clauses: &[(Expr, Block)], else_: Option<&Block>) -> Result<StmtFn, LuaError> {
        let mut arms = Vec::with_capacity(clauses.len());
        for (cond, body) in clauses {
            arms.push((self.compile_expr(cond)?, self.compile_block(body)?));
        }
        let else_ = match else_ {
            Some(body) => Some(self.compile_block(body)?),
            None => None,
        };
        Ok(stmt_fn(move |scope| {
            for (cond, body) in &arms {
                if cond(scope)?.is_truthy() {
                    return body.exec(scope);
                }
            }
            match &else_ {
                Some(body) => body.exec(scope),
                None => Ok(Flow::Normal),
            }
        }))
    }

    fn compile_numeric_for(
        &mut self,
        var: &str,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> Result<StmtFn, LuaError> {
        let start = self.compile_expr(start)?;
        let limit = self.compile_expr(limit)?;
        let step = match step {
            Some(step) => Some(self.compile_expr(step)?),
            None => None,
        };
        let body = self.compile_loop_body(body)?;
        let var = var.to_owned();

        Ok(stmt_fn(move |scope| {
            let start = for_number(start(scope)?, "initial")?;
            let limit = for_number(limit(scope)?, "limit")?;
            let step = match &step {
                Some(step) => for_number(step(scope)?, "step")?,
                None => 1.0,
            };
            if step == 0.0 {
                return Err(LuaError::Arithmetic("'for' step is zero".into()));
            }
            let mut i = start;
            while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
                let iteration = scope.child();
                iteration.declare(var.as_str(), LuaValue::Number(i));
                match body.run(iteration)?.0 {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
                i += step;
            }
            Ok(Flow::Normal)
        }))
    }

    /// `for v1, ..., vn in f, s, c` calls `f(s, c)` until its first result is nil.
    fn compile_generic_for(
        &mut self,
        vars: &[String],
        iterators: &[Expr],
        body: &Block,
    ) -> Result<StmtFn, LuaError> {
        let iterators = self.compile_expr_list(iterators)?;
        let body = self.compile_loop_body(body)?;
        let vars = vars.to_vec();

        Ok(stmt_fn(move |scope| {
            let triple = iterators(scope)?;
            let func = triple.get(0);
            let state = triple.get(1);
            let mut control = triple.get(2);
            loop {
                let results = events::call_event(&func, LuaArgs::from(vec![state.clone(), control]))?;
                control = results.first();
                if control.is_nil() {
                    return Ok(Flow::Normal);
                }
                let iteration = scope.child();
                for (i, var) in vars.iter().enumerate() {
                    iteration.declare(var.as_str(), results.get(i));
                }
                match body.run(iteration)?.0 {
                    Flow::Normal => {}
                    Flow::Break => return Ok(Flow::Normal),
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            }
        }))
    }

    /// `function a.b.c:m() end` stores into `a.b.c["m"]` through the event
    /// protocol; a plain `function f() end` assigns like `f = function ...`.
    fn compile_function_stat(&mut self, name: &FuncName, body: &FuncBody) -> Result<StmtFn, LuaError> {
        let mut display = name.parts.join(".");
        if let Some(method) = &name.method {
            display.push(':');
            display.push_str(method);
        }
        let proto = self.compile_proto(Arc::from(display), &body.params, body.vararg, &body.body)?;

        let root = name.parts[0].clone();
        let mut keys: Vec<LuaValue> = name.parts[1..]
            .iter()
            .map(|part| LuaValue::from(part.as_str()))
            .collect();
        if let Some(method) = &name.method {
            keys.push(LuaValue::from(method.as_str()));
        }

        Ok(stmt_fn(move |scope| {
            let func = LuaValue::Function(Proto::instantiate(&proto, scope));
            match keys.split_last() {
                None => scope.set(&root, func),
                Some((last, path)) => {
                    let mut target = scope.get(&root);
                    for key in path {
                        target = events::index_event(&target, key)?;
                    }
                    events::newindex_event(&target, last.clone(), func)?;
                }
            }
            Ok(Flow::Normal)
        }))
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn check_vararg(&self, line: Line) -> Result<(), LuaError> {
        if self.vararg {
            Ok(())
        } else {
            Err(syntax_error(line, "cannot use '...' outside a vararg function"))
        }
    }

    /// Compile `expr` adjusted to exactly one value.
    fn compile_expr(&mut self, expr: &Expr) -> Result<ExprFn, LuaError> {
        Ok(match expr {
            Expr::Nil(_) => constant(LuaValue::Nil),
            Expr::True(_) => constant(LuaValue::Boolean(true)),
            Expr::False(_) => constant(LuaValue::Boolean(false)),
            Expr::Number(n, _) => constant(LuaValue::Number(*n)),
            Expr::Str(s, _) => constant(LuaValue::from(s.as_str())),
            Expr::Vararg(line) => {
                self.check_vararg(*line)?;
                expr_fn(|scope| Ok(scope.varargs().into_first()))
            }
            Expr::Name(name, _) => {
                let name = name.clone();
                expr_fn(move |scope| Ok(scope.get(&name)))
            }
            Expr::Paren(inner, _) => self.compile_expr(inner)?,
            Expr::BinOp { op, lhs, rhs, .. } => self.compile_binop(*op, lhs, rhs)?,
            Expr::UnOp { op, operand, .. } => {
                let operand = self.compile_expr(operand)?;
                match op {
                    UnOp::Neg => expr_fn(move |scope| events::unm_event(&operand(scope)?)),
                    UnOp::Not => expr_fn(move |scope| Ok(LuaValue::Boolean(!operand(scope)?.is_truthy()))),
                    UnOp::Len => expr_fn(move |scope| events::len_event(&operand(scope)?)),
                }
            }
            Expr::Index { table, key, .. } => {
                let table = self.compile_expr(table)?;
                let key = self.compile_expr(key)?;
                expr_fn(move |scope| {
                    let t = table(scope)?;
                    let k = key(scope)?;
                    events::index_event(&t, &k)
                })
            }
            Expr::Call { .. } | Expr::MethodCall { .. } => {
                let call = self.compile_multi(expr)?;
                expr_fn(move |scope| Ok(call(scope)?.into_first()))
            }
            Expr::Function(body) => {
                let proto = self.compile_proto(Arc::from("anonymous"), &body.params, body.vararg, &body.body)?;
                expr_fn(move |scope| Ok(LuaValue::Function(Proto::instantiate(&proto, scope))))
            }
            Expr::Table(fields, _) => self.compile_table(fields)?,
        })
    }

    /// Compile `expr` keeping all of its values (calls and `...`).
    fn compile_multi(&mut self, expr: &Expr) -> Result<ListFn, LuaError> {
        match expr {
            Expr::Call { func, args, .. } => {
                let callee = self.compile_expr(func)?;
                let args = self.compile_call_args(args)?;
                Ok(list_fn(move |scope| {
                    let f = callee(scope)?;
                    let args = args(scope)?;
                    events::call_event(&f, args)
                }))
            }
            Expr::MethodCall { obj, method, args, .. } => {
                let obj = self.compile_expr(obj)?;
                let method = LuaValue::from(method.as_str());
                let args = self.compile_call_args(args)?;
                Ok(list_fn(move |scope| {
                    let receiver = obj(scope)?;
                    let f = events::index_event(&receiver, &method)?;
                    let mut args = args(scope)?;
                    args.prepend(receiver);
                    events::call_event(&f, args)
                }))
            }
            Expr::Vararg(line) => {
                self.check_vararg(*line)?;
                Ok(list_fn(|scope| Ok(scope.varargs())))
            }
            single => {
                let value = self.compile_expr(single)?;
                Ok(list_fn(move |scope| Ok(LuaArgs::from(value(scope)?))))
            }
        }
    }

    fn compile_call_args(&mut self, args: &CallArgs) -> Result<ListFn, LuaError> {
        self.compile_expr_list(&args.clone().into_exprs())
    }

    /// Every expression but the last contributes one value; the last
    /// contributes all of its values.
    fn compile_expr_list(&mut self, exprs: &[Expr]) -> Result<ListFn, LuaError> {
        let Some((last, init)) = exprs.split_last() else {
            return Ok(list_fn(|_| Ok(LuaArgs::new())));
        };
        let mut singles = Vec::with_capacity(init.len());
        for expr in init {
            singles.push(self.compile_expr(expr)?);
        }
        let last = self.compile_multi(last)?;
        Ok(list_fn(move |scope| {
            let mut values = LuaArgs::new();
            for expr in &singles {
                values.push(expr(scope)?);
            }
            values.extend(last(scope)?);
            Ok(values)
        }))
    }

    fn compile_binop(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<ExprFn, LuaError> {
        let a = self.compile_expr(lhs)?;
        let b = self.compile_expr(rhs)?;
        Ok(match op {
            BinOp::And => expr_fn(move |scope| {
                let left = a(scope)?;
                if left.is_truthy() {
                    b(scope)
                } else {
                    Ok(left)
                }
            }),
            BinOp::Or => expr_fn(move |scope| {
                let left = a(scope)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    b(scope)
                }
            }),
            BinOp::Add => arith(ArithOp::Add, a, b),
            BinOp::Sub => arith(ArithOp::Sub, a, b),
            BinOp::Mul => arith(ArithOp::Mul, a, b),
            BinOp::Div => arith(ArithOp::Div, a, b),
            BinOp::Mod => arith(ArithOp::Mod, a, b),
            BinOp::Pow => arith(ArithOp::Pow, a, b),
            BinOp::Concat => expr_fn(move |scope| {
                let left = a(scope)?;
                let right = b(scope)?;
                events::concat_event(&left, &right)
            }),
            BinOp::Eq => compare(a, b, events::eq_event),
            BinOp::NotEq => compare(a, b, |l, r| Ok(!events::eq_event(l, r)?)),
            BinOp::Lt => compare(a, b, events::lt_event),
            BinOp::LtEq => compare(a, b, events::le_event),
            // `a > b` is `b < a`, `a >= b` is `b <= a`; operands still evaluate left first.
            BinOp::Gt => compare(a, b, |l, r| events::lt_event(r, l)),
            BinOp::GtEq => compare(a, b, |l, r| events::le_event(r, l)),
        })
    }

    /// Positional fields are numbered from 1; a trailing call or `...`
    /// contributes all of its values.
    fn compile_table(&mut self, fields: &[Field]) -> Result<ExprFn, LuaError> {
        enum FieldFn {
            Positional(ExprFn),
            Expand(ListFn),
            Keyed(ExprFn, ExprFn),
        }

        let mut compiled = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let is_last = i + 1 == fields.len();
            compiled.push(match field {
                Field::Positional(e) if is_last && e.is_multi() => FieldFn::Expand(self.compile_multi(e)?),
                Field::Positional(e) => FieldFn::Positional(self.compile_expr(e)?),
                Field::Named(name, e) => {
                    FieldFn::Keyed(constant(LuaValue::from(name.as_str())), self.compile_expr(e)?)
                }
                Field::Index(k, v) => FieldFn::Keyed(self.compile_expr(k)?, self.compile_expr(v)?),
            });
        }

        Ok(expr_fn(move |scope| {
            let mut table = LuaTable::new();
            let mut next_index = 1usize;
            for field in &compiled {
                match field {
                    FieldFn::Positional(value) => {
                        table.set(LuaValue::from(next_index), value(scope)?)?;
                        next_index += 1;
                    }
                    FieldFn::Expand(values) => {
                        for value in values(scope)? {
                            table.set(LuaValue::from(next_index), value)?;
                            next_index += 1;
                        }
                    }
                    FieldFn::Keyed(key, value) => {
                        let key = key(scope)?;
                        let value = value(scope)?;
                        table.set(key, value)?;
                    }
                }
            }
            Ok(LuaValue::from(table))
        }))
    }
}

fn arith(op: ArithOp, a: ExprFn, b: ExprFn) -> ExprFn {
    expr_fn(move |scope| {
        let left = a(scope)?;
        let right = b(scope)?;
        events::arith_event(op, &left, &right)
    })
}

fn compare(a: ExprFn, b: ExprFn, test: fn(&LuaValue, &LuaValue) -> Result<bool, LuaError>) -> ExprFn {
    expr_fn(move |scope| {
        let left = a(scope)?;
        let right = b(scope)?;
        Ok(LuaValue::Boolean(test(&left, &right)?))
    })
}

fn for_number(value: LuaValue, what: &str) -> Result<f64, LuaError> {
    match value {
        LuaValue::Number(n) => Ok(n),
        other => Err(LuaError::type_error(format!(
            "'for' {what} value must be a number, got {}",
            other.type_name()
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
