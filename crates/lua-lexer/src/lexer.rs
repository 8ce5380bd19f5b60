use crate::token::{Token, TokenKind};
use lua_core::LuaError;

/// Tokenises source text into a flat list of [`Token`]s.
///
/// Works on `char`s so string literals keep non-ASCII text intact.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    /// Consume the entire source and return all tokens, including a final `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LuaError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    // ── cursor ──────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn text(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn error(&self, line: u32, message: impl Into<String>) -> LuaError {
        LuaError::Parse {
            line,
            message: message.into(),
        }
    }

    // ── whitespace & comments ───────────────────────────────────────────────

    fn skip_trivia(&mut self) -> Result<(), LuaError> {
        loop {
            self.eat_while(char::is_whitespace);
            if !(self.peek() == Some('-') && self.peek_at(1) == Some('-')) {
                return Ok(());
            }
            self.pos += 2;
            if let Some(level) = self.long_bracket_level() {
                self.long_bracket_body(level)?;
            } else {
                self.eat_while(|c| c != '\n');
            }
        }
    }

    /// If the cursor sits on `[`, `[=`, `[==` ... followed by `[`, consume the
    /// opening bracket and return its level.
    fn long_bracket_level(&mut self) -> Option<usize> {
        if self.peek() != Some('[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some('=') {
            level += 1;
        }
        if self.peek_at(1 + level) != Some('[') {
            return None;
        }
        self.pos += level + 2;
        Some(level)
    }

    /// Body of a long string or comment, after its opening bracket.
    fn long_bracket_body(&mut self, level: usize) -> Result<String, LuaError> {
        let start_line = self.line;
        // A newline right after the opening bracket is not part of the text.
        if self.eat('\r') {
            self.eat('\n');
        } else {
            self.eat('\n');
        }
        let mut buf = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(start_line, "unfinished long string near <eof>")),
                Some(']') => {
                    let mut eq = 0;
                    while self.peek_at(eq) == Some('=') {
                        eq += 1;
                    }
                    if eq == level && self.peek_at(eq) == Some(']') {
                        self.pos += eq + 1;
                        return Ok(buf);
                    }
                    buf.push(']');
                }
                Some(c) => buf.push(c),
            }
        }
    }

    // ── string literals ─────────────────────────────────────────────────────

    fn short_string(&mut self, delim: char) -> Result<String, LuaError> {
        let start_line = self.line;
        let mut buf = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(start_line, "unfinished string near <eof>")),
                Some('\n') => return Err(self.error(start_line, "unfinished string")),
                Some('\\') => {
                    if let Some(c) = self.escape()? {
                        buf.push(c);
                    }
                }
                Some(c) if c == delim => return Ok(buf),
                Some(c) => buf.push(c),
            }
        }
    }

    /// Decode one escape sequence after `\`. `\z` yields nothing.
    fn escape(&mut self) -> Result<Option<char>, LuaError> {
        let line = self.line;
        let c = self
            .bump()
            .ok_or_else(|| self.error(line, "unfinished string near <eof>"))?;
        let decoded = match c {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0C',
            'n' | '\n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0B',
            '\\' | '\'' | '"' => c,
            'x' => {
                let mut code = 0;
                for _ in 0..2 {
                    let d = self
                        .bump()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| self.error(line, "hexadecimal digit expected"))?;
                    code = code * 16 + d;
                }
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            'z' => {
                self.eat_while(char::is_whitespace);
                return Ok(None);
            }
            d if d.is_ascii_digit() => {
                let mut code = d.to_digit(10).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(10)) {
                        Some(v) => {
                            self.bump();
                            code = code * 10 + v;
                        }
                        None => break,
                    }
                }
                if code > 255 {
                    return Err(self.error(line, "decimal escape too large"));
                }
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            other => return Err(self.error(line, format!("invalid escape sequence '\\{other}'"))),
        };
        Ok(Some(decoded))
    }

    // ── number literals ─────────────────────────────────────────────────────

    /// Every numeric literal is a double. Hexadecimal literals are integers.
    fn number(&mut self, start: usize) -> Result<TokenKind, LuaError> {
        let line = self.line;
        if self.chars[start] == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.bump();
            let digits_start = self.pos;
            self.eat_while(|c| c.is_ascii_hexdigit());
            let digits = self.text(digits_start);
            if digits.is_empty() {
                return Err(self.error(line, format!("malformed number near '{}'", self.text(start))));
            }
            let value = digits
                .chars()
                .filter_map(|c| c.to_digit(16))
                .fold(0.0, |acc, d| acc * 16.0 + f64::from(d));
            return Ok(TokenKind::Number(value));
        }

        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            self.eat_while(|c| c.is_ascii_digit());
        }
        // `3x` and similar are malformed, not a number followed by a name.
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.eat_while(|c| c.is_alphanumeric() || c == '_');
        }
        let raw = self.text(start);
        raw.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(line, format!("malformed number near '{raw}'")))
    }

    // ── main dispatch ────────────────────────────────────────────────────────

    fn next_token(&mut self) -> Result<Token, LuaError> {
        self.skip_trivia()?;
        let line = self.line;
        let start = self.pos;

        if let Some(level) = self.long_bracket_level() {
            let s = self.long_bracket_body(level)?;
            return Ok(Token::new(TokenKind::Str(s), line));
        }

        let Some(c) = self.bump() else {
            return Ok(Token::new(TokenKind::Eof, line));
        };

        let kind = match c {
            '0'..='9' => self.number(start)?,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number(start)?,
            '"' | '\'' => TokenKind::Str(self.short_string(c)?),
            c if c == '_' || c.is_ascii_alphabetic() => {
                self.eat_while(|c| c == '_' || c.is_ascii_alphanumeric());
                let word = self.text(start);
                TokenKind::keyword(&word).unwrap_or(TokenKind::Name(word))
            }

            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '#' => TokenKind::Hash,
            '&' => TokenKind::Ampersand,
            '|' => TokenKind::Pipe,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '/' if self.eat('/') => TokenKind::SlashSlash,
            '/' => TokenKind::Slash,
            '~' if self.eat('=') => TokenKind::NotEq,
            '~' => TokenKind::Tilde,
            '=' if self.eat('=') => TokenKind::Eq,
            '=' => TokenKind::Assign,
            '<' if self.eat('=') => TokenKind::LtEq,
            '<' if self.eat('<') => TokenKind::ShiftLeft,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::GtEq,
            '>' if self.eat('>') => TokenKind::ShiftRight,
            '>' => TokenKind::Gt,
            ':' if self.eat(':') => TokenKind::ColonColon,
            ':' => TokenKind::Colon,
            '.' if self.eat('.') => {
                if self.eat('.') {
                    TokenKind::DotDotDot
                } else {
                    TokenKind::DotDot
                }
            }
            '.' => TokenKind::Dot,

            other => return Err(self.error(line, format!("unexpected symbol near '{other}'"))),
        };

        Ok(Token::new(kind, line))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
