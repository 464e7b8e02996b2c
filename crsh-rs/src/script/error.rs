//! Error taxonomy for the shell language.
//!
//! Lex and parse errors abort the current input line.  Runtime errors
//! (type, index, name, arity, arithmetic) abort the current statement.
//! [`Error::StackUnderflow`] means the interpreter broke its own invariant
//! and is never a user mistake.

use std::fmt;

use thiserror::Error;

use super::value::ValueType;

/// Description used for the `found` field when the parser runs off the end.
pub const END_OF_INPUT: &str = "end of input";

/// Source location of a token (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Every failure the lexer, parser, and executor can report.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error at {pos}: {message}")]
    Lex { pos: Position, message: String },

    #[error("parse error at {pos}: expected {expected}, found {found}")]
    Parse {
        pos: Position,
        expected: String,
        found: String,
    },

    #[error("type error: expected {expected}, got {actual}")]
    Type { expected: String, actual: String },

    #[error("index error: {0}")]
    Index(String),

    #[error("name error: `{0}` is not bound")]
    Name(String),

    /// A statement that is nothing but an unbound name, e.g. a lone `ls`.
    #[error("name error: `{0}` is not bound (to run the program, write `!{0}`)")]
    BareName(String),

    #[error("arity error: {name} expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("internal error: evaluation stack underflow")]
    StackUnderflow,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the interpreter.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn lex(pos: Position, message: impl Into<String>) -> Self {
        Error::Lex { pos, message: message.into() }
    }

    pub fn parse(pos: Position, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::Parse {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// A value of type `actual` was used where `expected` is required.
    pub fn type_mismatch(expected: impl Into<String>, actual: ValueType) -> Self {
        Error::Type {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Error::Index(format!("index {index} out of range for length {len}"))
    }

    pub fn missing_key(key: &str) -> Self {
        Error::Index(format!("key {key:?} not present"))
    }

    pub fn arity(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::Arity {
            name: name.into(),
            expected: expected.to_string(),
            actual,
        }
    }

    pub fn arity_range(name: impl Into<String>, min: usize, max: usize, actual: usize) -> Self {
        Error::Arity {
            name: name.into(),
            expected: format!("{min} to {max}"),
            actual,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    /// Invariant breach inside the interpreter (not caused by user input).
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::StackUnderflow)
    }

    /// A parse error caused by input that simply stopped too early, e.g. an
    /// unclosed `[` or a trailing `|`.  More input may complete it.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Parse { found, .. } if found == END_OF_INPUT)
    }

    /// Lex and parse errors carry a source position.
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Lex { pos, .. } | Error::Parse { pos, .. } => Some(*pos),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
