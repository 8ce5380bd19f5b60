use crate::ast::*;
use lua_core::LuaError;
use lua_lexer::{Lexer, Token, TokenKind};

/// Recursive-descent parser.
///
/// Usage:
/// ```ignore
/// let block = Parser::new("local x = 1 + 2")?.parse()?;
/// ```
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current nesting of blocks and subexpressions.
    depth: usize,
}

/// Nesting limit for blocks and expressions; keeps deeply nested input from
/// exhausting the host stack here and in the compiler.
const MAX_SYNTAX_LEVELS: usize = 200;

// ── Constructor ───────────────────────────────────────────────────────────────

impl Parser {
    /// Lex `src` and create a parser over the token stream.
    pub fn new(src: &str) -> Result<Self, LuaError> {
        let tokens = Lexer::new(src).tokenize()?;
        Ok(Self { tokens, pos: 0, depth: 0 })
    }

    /// Parse the entire source as a [`Block`] and return it.
    pub fn parse(mut self) -> Result<Block, LuaError> {
        let block = self.parse_block()?;
        self.expect(TokenKind::Eof)?;
        Ok(block)
    }
}

// ── Token navigation ──────────────────────────────────────────────────────────

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_line(&self) -> Line {
        self.tokens[self.pos].line
    }

    fn peek_next(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    /// Advance past the current token. `Eof` is never consumed.
    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> LuaError {
        LuaError::Parse {
            line: self.peek_line(),
            message: message.into(),
        }
    }

    /// Error for a token that cannot appear here.
    fn unexpected(&self, what: &str) -> LuaError {
        let tok = self.peek();
        if tok.is_unsupported() {
            self.error(format!("unsupported syntax near {tok}"))
        } else {
            self.error(format!("{what} expected near {tok}"))
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), LuaError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    /// `what` must be closed by `closer`, opened at `open_line`.
    fn expect_closing(&mut self, closer: TokenKind, opener: TokenKind, open_line: Line) -> Result<(), LuaError> {
        if *self.peek() == closer {
            self.advance();
            return Ok(());
        }
        if open_line == self.peek_line() {
            Err(self.unexpected(&closer.to_string()))
        } else {
            Err(self.error(format!(
                "{closer} expected (to close {opener} at line {open_line}) near {}",
                self.peek()
            )))
        }
    }

    fn enter_level(&mut self) -> Result<(), LuaError> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_LEVELS {
            return Err(self.error("chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn expect_name(&mut self) -> Result<String, LuaError> {
        match self.peek() {
            TokenKind::Name(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("<name>")),
        }
    }
}

// ── Block & Statements ────────────────────────────────────────────────────────

impl Parser {
    /// `block ::= {stat} [retstat]`
    fn parse_block(&mut self) -> Result<Block, LuaError> {
        self.enter_level()?;
        let block = self.parse_block_body()?;
        self.depth -= 1;
        Ok(block)
    }

    fn parse_block_body(&mut self) -> Result<Block, LuaError> {
        let line = self.peek_line();
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if self.is_block_end() {
                return Ok(Block { stmts, ret: None, line });
            }
            if *self.peek() == TokenKind::Return {
                let ret = self.parse_return()?;
                return Ok(Block {
                    stmts,
                    ret: Some(ret),
                    line,
                });
            }
            stmts.push(self.parse_stmt()?);
        }
    }

    fn is_block_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Eof | TokenKind::End | TokenKind::Else | TokenKind::Elseif | TokenKind::Until
        )
    }

    /// `retstat ::= return [explist] [';']`; must close its block.
    fn parse_return(&mut self) -> Result<ReturnStmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        let values = if self.is_block_end() || *self.peek() == TokenKind::Semicolon {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.eat(&TokenKind::Semicolon);
        if !self.is_block_end() {
            return Err(self.unexpected("<eof>"));
        }
        Ok(ReturnStmt { values, line })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        match self.peek() {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.expect_closing(TokenKind::End, TokenKind::Do, line)?;
                Ok(Stmt::Do(body))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::Function => self.parse_function_stat(),
            TokenKind::Local => self.parse_local(),
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break(line))
            }
            TokenKind::Goto | TokenKind::ColonColon => Err(self.unexpected("statement")),
            _ => self.parse_expr_stat(),
        }
    }

    // ── Control flow ─────────────────────────────────────────────────────────

    fn parse_if(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        let mut clauses = Vec::new();
        let mut else_ = None;
        loop {
            let cond = self.parse_expr()?;
            self.expect(TokenKind::Then)?;
            clauses.push((cond, self.parse_block()?));
            if self.eat(&TokenKind::Elseif) {
                continue;
            }
            if self.eat(&TokenKind::Else) {
                else_ = Some(self.parse_block()?);
            }
            break;
        }
        self.expect_closing(TokenKind::End, TokenKind::If, line)?;
        Ok(Stmt::If { clauses, else_, line })
    }

    fn parse_while(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect_closing(TokenKind::End, TokenKind::While, line)?;
        Ok(Stmt::While { cond, body, line })
    }

    fn parse_repeat(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        let body = self.parse_block()?;
        self.expect_closing(TokenKind::Until, TokenKind::Repeat, line)?;
        let cond = self.parse_expr()?;
        Ok(Stmt::Repeat { body, cond, line })
    }

    fn parse_for(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        let first = self.expect_name()?;

        if self.eat(&TokenKind::Assign) {
            let start = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.eat(&TokenKind::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(TokenKind::Do)?;
            let body = self.parse_block()?;
            self.expect_closing(TokenKind::End, TokenKind::For, line)?;
            return Ok(Stmt::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
                line,
            });
        }

        let mut vars = vec![first];
        while self.eat(&TokenKind::Comma) {
            vars.push(self.expect_name()?);
        }
        if *self.peek() != TokenKind::In {
            return Err(self.unexpected("'=' or 'in'"));
        }
        self.advance();
        let iterators = self.parse_expr_list()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect_closing(TokenKind::End, TokenKind::For, line)?;
        Ok(Stmt::GenericFor {
            vars,
            iterators,
            body,
            line,
        })
    }

    fn parse_function_stat(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        let name = self.parse_func_name()?;
        let body = self.parse_func_body(name.method.is_some(), line)?;
        Ok(Stmt::Function { name, body, line })
    }

    fn parse_local(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        self.advance();
        if self.eat(&TokenKind::Function) {
            let name = self.expect_name()?;
            let body = self.parse_func_body(false, line)?;
            return Ok(Stmt::LocalFunction { name, body, line });
        }
        let mut names = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        let values = if self.eat(&TokenKind::Assign) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        Ok(Stmt::Local { names, values, line })
    }

    /// Assignment or call statement.
    fn parse_expr_stat(&mut self) -> Result<Stmt, LuaError> {
        let line = self.peek_line();
        let first = self.parse_suffixed_expr()?;

        if matches!(self.peek(), TokenKind::Assign | TokenKind::Comma) {
            let mut targets = vec![first];
            while self.eat(&TokenKind::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            if targets
                .iter()
                .any(|t| !matches!(t, Expr::Name(..) | Expr::Index { .. }))
            {
                return Err(LuaError::Parse {
                    line,
                    message: "syntax error: cannot assign to this expression".into(),
                });
            }
            self.expect(TokenKind::Assign)?;
            let values = self.parse_expr_list()?;
            return Ok(Stmt::Assign { targets, values, line });
        }

        match first {
            Expr::Call { .. } | Expr::MethodCall { .. } => Ok(Stmt::Call(first)),
            _ => Err(self.unexpected("'='")),
        }
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// `funcname ::= Name {'.' Name} [':' Name]`
    fn parse_func_name(&mut self) -> Result<FuncName, LuaError> {
        let mut parts = vec![self.expect_name()?];
        while self.eat(&TokenKind::Dot) {
            parts.push(self.expect_name()?);
        }
        let method = if self.eat(&TokenKind::Colon) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(FuncName { parts, method })
    }

    /// `funcbody ::= '(' [parlist] ')' block end`
    fn parse_func_body(&mut self, is_method: bool, line: Line) -> Result<FuncBody, LuaError> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        let mut vararg = false;
        if *self.peek() != TokenKind::RParen {
            loop {
                if self.eat(&TokenKind::DotDotDot) {
                    vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        self.expect_closing(TokenKind::End, TokenKind::Function, line)?;
        Ok(FuncBody {
            params,
            vararg,
            body,
            line,
        })
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, LuaError> {
        let mut list = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, LuaError> {
        self.parse_subexpr(0)
    }

    /// Precedence climbing: consume binary operators whose left priority is
    /// strictly greater than `limit`.
    ///
    /// Each folded operator also counts as a level, since the left-leaning
    /// tree it builds is walked recursively later.
    fn parse_subexpr(&mut self, limit: u8) -> Result<Expr, LuaError> {
        self.enter_level()?;
        let entered = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            if self.peek().is_unsupported() {
                return Err(self.unexpected("operator"));
            }
            let Some(op) = self.peek_binop() else { break };
            let (left, right) = op.priority();
            if left <= limit {
                break;
            }
            let line = self.peek_line();
            self.advance();
            let rhs = self.parse_subexpr(right)?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
            self.enter_level()?;
        }
        self.depth = entered - 1;
        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        Some(match self.peek() {
            TokenKind::Or => BinOp::Or,
            TokenKind::And => BinOp::And,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::LtEq => BinOp::LtEq,
            TokenKind::GtEq => BinOp::GtEq,
            TokenKind::Eq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            TokenKind::DotDot => BinOp::Concat,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::Caret => BinOp::Pow,
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, LuaError> {
        let line = self.peek_line();
        let op = match self.peek() {
            TokenKind::Not => UnOp::Not,
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Hash => UnOp::Len,
            TokenKind::Tilde => return Err(self.unexpected("expression")),
            _ => return self.parse_simple_expr(),
        };
        self.advance();
        let operand = self.parse_subexpr(UNARY_PRIORITY)?;
        Ok(Expr::UnOp {
            op,
            operand: Box::new(operand),
            line,
        })
    }

    fn parse_simple_expr(&mut self) -> Result<Expr, LuaError> {
        let line = self.peek_line();
        let expr = match self.peek() {
            TokenKind::Number(n) => Expr::Number(*n, line),
            TokenKind::Str(s) => Expr::Str(s.clone(), line),
            TokenKind::Nil => Expr::Nil(line),
            TokenKind::True => Expr::True(line),
            TokenKind::False => Expr::False(line),
            TokenKind::DotDotDot => Expr::Vararg(line),
            TokenKind::Function => {
                self.advance();
                return Ok(Expr::Function(self.parse_func_body(false, line)?));
            }
            TokenKind::LBrace => {
                let fields = self.parse_table_fields()?;
                return Ok(Expr::Table(fields, line));
            }
            _ => return self.parse_suffixed_expr(),
        };
        self.advance();
        Ok(expr)
    }

    /// Primary + chain of `.field`, `[key]`, `(args)`, `:method(args)` suffixes.
    fn parse_suffixed_expr(&mut self) -> Result<Expr, LuaError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            let line = self.peek_line();
            expr = match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_name()?;
                    Expr::Index {
                        table: Box::new(expr),
                        key: Box::new(Expr::Str(name, line)),
                        line,
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    Expr::Index {
                        table: Box::new(expr),
                        key: Box::new(key),
                        line,
                    }
                }
                TokenKind::Colon => {
                    self.advance();
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    Expr::MethodCall {
                        obj: Box::new(expr),
                        method,
                        args,
                        line,
                    }
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::Str(_) => {
                    let args = self.parse_call_args()?;
                    Expr::Call {
                        func: Box::new(expr),
                        args,
                        line,
                    }
                }
                _ => return Ok(expr),
            };
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, LuaError> {
        let line = self.peek_line();
        match self.peek() {
            TokenKind::Name(n) => {
                let expr = Expr::Name(n.clone(), line);
                self.advance();
                Ok(expr)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_closing(TokenKind::RParen, TokenKind::LParen, line)?;
                Ok(Expr::Paren(Box::new(inner), line))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_call_args(&mut self) -> Result<CallArgs, LuaError> {
        let line = self.peek_line();
        match self.peek() {
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(CallArgs::Exprs(Vec::new()));
                }
                let exprs = self.parse_expr_list()?;
                self.expect_closing(TokenKind::RParen, TokenKind::LParen, line)?;
                Ok(CallArgs::Exprs(exprs))
            }
            TokenKind::LBrace => Ok(CallArgs::Table(self.parse_table_fields()?, line)),
            TokenKind::Str(s) => {
                let args = CallArgs::Str(s.clone(), line);
                self.advance();
                Ok(args)
            }
            _ => Err(self.unexpected("function arguments")),
        }
    }

    // ── Table constructors ────────────────────────────────────────────────────

    fn parse_table_fields(&mut self) -> Result<Vec<Field>, LuaError> {
        let line = self.peek_line();
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while *self.peek() != TokenKind::RBrace {
            fields.push(self.parse_field()?);
            if !self.eat(&TokenKind::Comma) && !self.eat(&TokenKind::Semicolon) {
                break;
            }
        }
        self.expect_closing(TokenKind::RBrace, TokenKind::LBrace, line)?;
        Ok(fields)
    }

    fn parse_field(&mut self) -> Result<Field, LuaError> {
        match self.peek() {
            TokenKind::LBracket => {
                self.advance();
                let key = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                self.expect(TokenKind::Assign)?;
                Ok(Field::Index(key, self.parse_expr()?))
            }
            TokenKind::Name(n) if self.peek_next() == Some(&TokenKind::Assign) => {
                let name = n.clone();
                self.advance();
                self.advance();
                Ok(Field::Named(name, self.parse_expr()?))
            }
            _ => Ok(Field::Positional(self.parse_expr()?)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
