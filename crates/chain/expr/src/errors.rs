//! Expression error types

/// Errors that can occur while lexing, parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected character '{ch}' at column {col}")]
    UnexpectedChar { ch: char, col: usize },

    #[error("Unterminated string literal starting at column {col}")]
    UnterminatedString { col: usize },

    #[error("Invalid number '{text}' at column {col}")]
    InvalidNumber { text: String, col: usize },

    #[error("Unexpected token at column {col}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: String,
        col: usize,
    },

    #[error("A binding must be a single path or literal, found operator at column {col}")]
    NotABinding { col: usize },

    #[error("Expression is {len} bytes long, the limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("Expression nests deeper than {max} levels at column {col}")]
    TooDeep { max: usize, col: usize },

    #[error("Unresolved reference: {0}")]
    Unresolved(String),
}

/// Result type alias for expression operations
pub type ExprResult<T> = Result<T, ExprError>;
