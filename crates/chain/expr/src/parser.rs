//! Parser: recursive descent parser for expressions
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") primary )?
//! primary    := "(" or ")" | literal | path
//! path       := identifier ( "." ( identifier | integer ) )*
//! ```

use crate::errors::{ExprError, ExprResult};
use crate::lexer::{Lexer, Token, TokenKind};
use serde_json::Value;
use std::fmt;

/// Longest accepted expression source, in bytes
pub const MAX_SOURCE_LEN: usize = 4096;

/// Deepest accepted nesting of `!` and parentheses
pub const MAX_DEPTH: usize = 64;

/// A dotted path into the binding context
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    /// The context root (`trigger` or a step alias)
    pub root: String,
    /// Field or index segments below the root
    pub segments: Vec<PathSegment>,
}

/// One segment of a path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(index) => write!(f, ".{}", index)?,
            }
        }
        Ok(())
    }
}

/// Comparison operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Expression tree
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Path(Path),
    Literal(Value),
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Collect the context roots this expression reads from
    pub fn roots(&self) -> Vec<&str> {
        let mut roots = Vec::new();
        self.collect_roots(&mut roots);
        roots
    }

    fn collect_roots<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Path(path) => {
                if !out.contains(&path.root.as_str()) {
                    out.push(path.root.as_str());
                }
            }
            Expr::Literal(_) => {}
            Expr::Not(inner) => inner.collect_roots(out),
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_roots(out);
                right.collect_roots(out);
            }
        }
    }
}

/// Parser for expressions
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Parse a full condition expression
    pub fn parse_expression(input: &str) -> ExprResult<Expr> {
        let mut parser = Self::new(input)?;
        let expr = parser.parse_or()?;
        parser.expect_eof()?;
        Ok(expr)
    }

    /// Parse a binding: exactly one path or literal
    pub fn parse_operand(input: &str) -> ExprResult<Expr> {
        let mut parser = Self::new(input)?;
        let current = parser.current().clone();
        if current.kind.is_operator() || current.kind == TokenKind::OpenParen {
            return Err(ExprError::NotABinding { col: current.col });
        }
        let expr = parser.parse_primary()?;
        let next = parser.current();
        if next.kind.is_operator() {
            return Err(ExprError::NotABinding { col: next.col });
        }
        parser.expect_eof()?;
        Ok(expr)
    }

    fn new(input: &str) -> ExprResult<Self> {
        if input.len() > MAX_SOURCE_LEN {
            return Err(ExprError::TooLong {
                len: input.len(),
                max: MAX_SOURCE_LEN,
            });
        }
        let tokens = Lexer::new(input).tokenize()?;
        if tokens.len() == 1 {
            return Err(ExprError::Empty);
        }
        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        while self.current().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.current().kind == TokenKind::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        if self.current().kind == TokenKind::Not {
            self.descend()?;
            self.advance();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let left = self.parse_primary()?;
        let op = match self.current().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::NotEq,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::LtEq => CompareOp::LtEq,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::GtEq => CompareOp::GtEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::OpenParen => {
                self.descend()?;
                self.advance();
                let inner = self.parse_or()?;
                self.expect(TokenKind::CloseParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Ok(Expr::Literal(Value::String(token.text)))
            }
            TokenKind::NumberLiteral => {
                self.advance();
                Ok(Expr::Literal(number_value(&token)?))
            }
            TokenKind::Identifier => self.parse_path(),
            _ => Err(self.unexpected("a path or literal")),
        }
    }

    fn parse_path(&mut self) -> ExprResult<Expr> {
        let root = self.expect(TokenKind::Identifier)?.text;
        let mut segments = Vec::new();

        while self.current().kind == TokenKind::Dot {
            self.advance();
            let token = self.current().clone();
            match token.kind {
                TokenKind::Identifier => {
                    self.advance();
                    segments.push(PathSegment::Field(token.text));
                }
                TokenKind::NumberLiteral => {
                    let index = token.text.parse::<usize>().map_err(|_| {
                        ExprError::InvalidNumber {
                            text: token.text.clone(),
                            col: token.col,
                        }
                    })?;
                    self.advance();
                    segments.push(PathSegment::Index(index));
                }
                _ => return Err(self.unexpected("a field name or index")),
            }
        }

        Ok(Expr::Path(Path { root, segments }))
    }

    fn descend(&mut self) -> ExprResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep {
                max: MAX_DEPTH,
                col: self.current().col,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> ExprResult<Token> {
        let token = self.current().clone();
        if token.kind != kind {
            return Err(self.unexpected(&kind.to_string()));
        }
        self.advance();
        Ok(token)
    }

    fn expect_eof(&self) -> ExprResult<()> {
        if self.current().kind != TokenKind::Eof {
            return Err(self.unexpected("end of input"));
        }
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> ExprError {
        let token = self.current();
        ExprError::UnexpectedToken {
            expected: expected.to_string(),
            found: if token.kind == TokenKind::Eof {
                token.kind.to_string()
            } else {
                token.text.clone()
            },
            col: token.col,
        }
    }

    fn current(&self) -> &Token {
        // The token stream always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }
}

fn number_value(token: &Token) -> ExprResult<Value> {
    if let Ok(int) = token.text.parse::<i64>() {
        return Ok(Value::from(int));
    }
    token
        .text
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ExprError::InvalidNumber {
            text: token.text.clone(),
            col: token.col,
        })
}
