//! Lexer: tokenizes binding and condition expressions
//!
//! Expressions are single-line, so only the column is tracked.
//! Integer segments directly after a `.` are lexed without a fractional
//! part so that `items.0.1` reads as a path and not as `items` `.` `0.1`.

use crate::errors::{ExprError, ExprResult};

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The raw (or unescaped, for strings) text of the token
    pub text: String,
    /// Column number (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            col,
        }
    }
}

/// Token types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    True,
    False,
    Null,

    // Identifiers and literals
    Identifier,
    StringLiteral,
    NumberLiteral,

    // Structural
    Dot,
    OpenParen,
    CloseParen,

    // Operators
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,

    // End of input
    Eof,
}

impl TokenKind {
    /// Whether this token is an operator (rejected inside bindings)
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::NotEq
                | Self::Lt
                | Self::LtEq
                | Self::Gt
                | Self::GtEq
                | Self::And
                | Self::Or
                | Self::Not
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Null => write!(f, "null"),
            Self::Identifier => write!(f, "identifier"),
            Self::StringLiteral => write!(f, "string literal"),
            Self::NumberLiteral => write!(f, "number"),
            Self::Dot => write!(f, "."),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::Eq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Not => write!(f, "!"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer for expressions
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    after_dot: bool,
}

impl Lexer {
    /// Create a new lexer from input text
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            after_dot: false,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> ExprResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.col()));
                break;
            }

            let token = self.next_token()?;
            self.after_dot = token.kind == TokenKind::Dot;
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> ExprResult<Token> {
        let ch = self.input[self.pos];
        let col = self.col();

        match ch {
            '.' => self.single(TokenKind::Dot, "."),
            '(' => self.single(TokenKind::OpenParen, "("),
            ')' => self.single(TokenKind::CloseParen, ")"),
            '=' if self.peek_at(1) == Some('=') => self.double(TokenKind::Eq, "=="),
            '!' if self.peek_at(1) == Some('=') => self.double(TokenKind::NotEq, "!="),
            '!' => self.single(TokenKind::Not, "!"),
            '<' if self.peek_at(1) == Some('=') => self.double(TokenKind::LtEq, "<="),
            '<' => self.single(TokenKind::Lt, "<"),
            '>' if self.peek_at(1) == Some('=') => self.double(TokenKind::GtEq, ">="),
            '>' => self.single(TokenKind::Gt, ">"),
            '&' if self.peek_at(1) == Some('&') => self.double(TokenKind::And, "&&"),
            '|' if self.peek_at(1) == Some('|') => self.double(TokenKind::Or, "||"),
            '"' | '\'' => self.read_string_literal(ch),
            c if c.is_ascii_digit() => self.read_number(),
            '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.read_identifier_or_keyword()),
            _ => Err(ExprError::UnexpectedChar { ch, col }),
        }
    }

    fn single(&mut self, kind: TokenKind, text: &str) -> ExprResult<Token> {
        let col = self.col();
        self.pos += 1;
        Ok(Token::new(kind, text, col))
    }

    fn double(&mut self, kind: TokenKind, text: &str) -> ExprResult<Token> {
        let col = self.col();
        self.pos += 2;
        Ok(Token::new(kind, text, col))
    }

    fn read_string_literal(&mut self, quote: char) -> ExprResult<Token> {
        let col = self.col();
        self.pos += 1; // opening quote

        let mut text = String::new();
        while self.pos < self.input.len() && self.input[self.pos] != quote {
            if self.input[self.pos] == '\\' {
                if let Some(next) = self.peek_at(1) {
                    text.push(next);
                    self.pos += 2;
                    continue;
                }
            }
            text.push(self.input[self.pos]);
            self.pos += 1;
        }

        if self.pos >= self.input.len() {
            return Err(ExprError::UnterminatedString { col });
        }

        self.pos += 1; // closing quote
        Ok(Token::new(TokenKind::StringLiteral, text, col))
    }

    fn read_number(&mut self) -> ExprResult<Token> {
        let col = self.col();
        let mut text = String::new();

        if self.input[self.pos] == '-' {
            text.push('-');
            self.pos += 1;
        }

        let allow_fraction = !self.after_dot;
        let mut seen_dot = false;
        while self.pos < self.input.len() {
            let c = self.input[self.pos];
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.'
                && allow_fraction
                && !seen_dot
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.pos += 1;
        }

        if text.parse::<f64>().is_err() {
            return Err(ExprError::InvalidNumber { text, col });
        }

        Ok(Token::new(TokenKind::NumberLiteral, text, col))
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let col = self.col();
        let mut text = String::new();

        while self.pos < self.input.len()
            && (self.input[self.pos].is_ascii_alphanumeric() || self.input[self.pos] == '_')
        {
            text.push(self.input[self.pos]);
            self.pos += 1;
        }

        // Keywords only apply in root position; `payload.null` is a field name.
        let kind = match text.as_str() {
            "true" if !self.after_dot => TokenKind::True,
            "false" if !self.after_dot => TokenKind::False,
            "null" if !self.after_dot => TokenKind::Null,
            _ => TokenKind::Identifier,
        };

        Token::new(kind, text, col)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn col(&self) -> usize {
        self.pos + 1
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }
}
