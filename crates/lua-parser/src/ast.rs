//! Syntax tree types.
//!
//! A source chunk parses to a top-level [`Block`]. Every node the compiler
//! may report an error for carries its 1-based source line.

/// 1-based source line number attached to nodes that need it for error messages.
pub type Line = u32;

// ── Blocks & Statements ──────────────────────────────────────────────────────

/// A sequence of statements, optionally terminated by an explicit `return`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub ret: Option<ReturnStmt>,
    pub line: Line,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub values: Vec<Expr>,
    pub line: Line,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `varlist = explist`
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
        line: Line,
    },

    /// `local namelist [= explist]`
    Local {
        names: Vec<String>,
        values: Vec<Expr>,
        line: Line,
    },

    /// A call used as a statement; its results are discarded.
    Call(Expr),

    /// `do block end`
    Do(Block),

    /// `while exp do block end`
    While { cond: Expr, body: Block, line: Line },

    /// `repeat block until exp`
    Repeat { body: Block, cond: Expr, line: Line },

    /// `if exp then block {elseif exp then block} [else block] end`
    ///
    /// `clauses` holds the `if` arm followed by every `elseif` arm.
    If {
        clauses: Vec<(Expr, Block)>,
        else_: Option<Block>,
        line: Line,
    },

    /// `for Name = exp, exp [, exp] do block end`
    NumericFor {
        var: String,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
        line: Line,
    },

    /// `for namelist in explist do block end`
    GenericFor {
        vars: Vec<String>,
        iterators: Vec<Expr>,
        body: Block,
        line: Line,
    },

    /// `function a.b.c:m() ... end`
    Function {
        name: FuncName,
        body: FuncBody,
        line: Line,
    },

    /// `local function Name funcbody`
    LocalFunction {
        name: String,
        body: FuncBody,
        line: Line,
    },

    Break(Line),
}

/// Dotted function name, e.g. `a.b.c:method`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncName {
    pub parts: Vec<String>,
    pub method: Option<String>,
}

/// Function parameters + body block. Method definitions list `self` first.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub params: Vec<String>,
    pub vararg: bool,
    pub body: Block,
    pub line: Line,
}

// ── Expressions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil(Line),
    True(Line),
    False(Line),
    Number(f64, Line),
    Str(String, Line),
    /// `...`
    Vararg(Line),

    Name(String, Line),

    /// `( exp )`; adjusts a multi-valued expression to one value.
    Paren(Box<Expr>, Line),

    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        line: Line,
    },

    UnOp {
        op: UnOp,
        operand: Box<Expr>,
        line: Line,
    },

    /// `table[key]`; `table.name` parses to an index with a string key.
    Index {
        table: Box<Expr>,
        key: Box<Expr>,
        line: Line,
    },

    /// `func(args)`, `func{...}` or `func"..."`
    Call {
        func: Box<Expr>,
        args: CallArgs,
        line: Line,
    },

    /// `obj:method(args)`
    MethodCall {
        obj: Box<Expr>,
        method: String,
        args: CallArgs,
        line: Line,
    },

    /// `function(params) body end`
    Function(FuncBody),

    /// `{ field, field, ... }`
    Table(Vec<Field>, Line),
}

impl Expr {
    pub fn line(&self) -> Line {
        match self {
            Expr::Nil(l) | Expr::True(l) | Expr::False(l) | Expr::Vararg(l) => *l,
            Expr::Number(_, l) | Expr::Str(_, l) | Expr::Name(_, l) | Expr::Paren(_, l) => *l,
            Expr::BinOp { line, .. } | Expr::UnOp { line, .. } | Expr::Index { line, .. } => *line,
            Expr::Call { line, .. } | Expr::MethodCall { line, .. } => *line,
            Expr::Function(fb) => fb.line,
            Expr::Table(_, l) => *l,
        }
    }

    /// Calls and `...` produce a variable number of values.
    pub fn is_multi(&self) -> bool {
        matches!(self, Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Vararg(_))
    }
}

/// Arguments passed to a function call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    /// `(explist)`
    Exprs(Vec<Expr>),
    /// `{table}`
    Table(Vec<Field>, Line),
    /// `"string"`
    Str(String, Line),
}

impl CallArgs {
    /// The argument list as ordinary expressions.
    pub fn into_exprs(self) -> Vec<Expr> {
        match self {
            CallArgs::Exprs(exprs) => exprs,
            CallArgs::Table(fields, line) => vec![Expr::Table(fields, line)],
            CallArgs::Str(s, line) => vec![Expr::Str(s, line)],
        }
    }
}

/// A single field in a table constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// `[expr] = expr`
    Index(Expr, Expr),
    /// `Name = expr`
    Named(String, Expr),
    /// `expr`
    Positional(Expr),
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinOp {
    /// `(left, right)` binding power. Right-associative operators bind
    /// weaker on the right.
    pub fn priority(self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 1),
            BinOp::And => (2, 2),
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => (3, 3),
            BinOp::Concat => (5, 4),
            BinOp::Add | BinOp::Sub => (6, 6),
            BinOp::Mul | BinOp::Div | BinOp::Mod => (7, 7),
            BinOp::Pow => (10, 9),
        }
    }
}

/// Operand binding power of `not`, `-` and `#`.
pub const UNARY_PRIORITY: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg, // -
    Not, // not
    Len, // #
}
