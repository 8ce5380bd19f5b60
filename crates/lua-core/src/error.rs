use crate::value::LuaValue;
use thiserror::Error;

/// All errors that can occur while parsing, compiling or running a chunk.
///
/// Every variant is unrecoverable at its point of origin: it propagates
/// through each compiled closure on the call stack until the host sees it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LuaError {
    /// A lexer, parser or compile-time error.
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    /// Operand or argument has the wrong tag for the requested operation.
    #[error("type error: {0}")]
    TypeError(String),

    /// Neither operand is numeric and no arithmetic metamethod resolved.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Incomparable operands with no ordering metamethod.
    #[error("comparison error: attempt to compare {lhs} with {rhs}")]
    Comparison {
        lhs: &'static str,
        rhs: &'static str,
    },

    /// `assert` received a falsy first argument.
    #[error("{0}")]
    Assertion(String),

    /// Raised by `error(v)`; carries the payload value unchanged.
    #[error("{0}")]
    User(LuaValue),

    /// Too many nested function invocations.
    #[error("stack overflow")]
    StackOverflow,

    /// A feature the interpreter deliberately leaves out.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A chunk file could not be read.
    #[error("cannot read '{path}': {message}")]
    Io { path: String, message: String },
}

impl LuaError {
    pub fn type_error(message: impl Into<String>) -> Self {
        LuaError::TypeError(message.into())
    }

    /// `bad argument #n to 'fname' (table expected, got nil)`
    pub fn bad_argument(pos: usize, fname: &str, expected: &str, got: &LuaValue) -> Self {
        LuaError::TypeError(format!(
            "bad argument #{pos} to '{fname}' ({expected} expected, got {})",
            got.type_name()
        ))
    }

    /// The value a script would observe for this error: the payload of
    /// `error(v)`, or the rendered message for every other kind.
    pub fn payload(&self) -> LuaValue {
        match self {
            LuaError::User(v) => v.clone(),
            other => LuaValue::from(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_keeps_payload() {
        let err = LuaError::User(LuaValue::Number(7.0));
        assert_eq!(err.payload(), LuaValue::Number(7.0));
        assert_eq!(err.to_string(), "7");
    }

    #[test]
    fn assertion_message_is_verbatim() {
        assert_eq!(LuaError::Assertion("boom".into()).to_string(), "boom");
    }

    #[test]
    fn bad_argument_names_both_tags() {
        let err = LuaError::bad_argument(1, "next", "table", &LuaValue::Nil);
        assert_eq!(
            err,
            LuaError::TypeError("bad argument #1 to 'next' (table expected, got nil)".into())
        );
    }
}
