//! Expression language for event chains
//!
//! Chain steps carry two kinds of expressions as plain strings:
//!
//! - **Bindings** (input mappings): a single dotted path such as
//!   `trigger.customer.id` or `create_task.task_id`, or a literal
//!   (`'weekly'`, `42`, `true`, `null`).
//! - **Conditions**: comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`) over
//!   paths and literals, combined with `&&`, `||`, `!` and parentheses.
//!
//! Paths only read from the binding scope: `trigger` for the triggering
//! payload and one root per already-succeeded step alias. There are no
//! function calls and no way to reach anything outside the scope.
//!
//! # Example
//!
//! ```rust
//! use chain_expr::{Binding, Condition};
//! use serde_json::{json, Map};
//!
//! let mut scope = Map::new();
//! scope.insert("trigger".into(), json!({ "amount": 250, "member": "ana" }));
//!
//! let condition = Condition::parse("trigger.amount > 100").unwrap();
//! assert!(condition.evaluate(&scope));
//!
//! let binding = Binding::parse("trigger.member").unwrap();
//! assert_eq!(binding.resolve(&scope).unwrap(), json!("ana"));
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use errors::{ExprError, ExprResult};
pub use eval::{is_truthy, resolve_path, Scope};
pub use parser::{CompareOp, Expr, Path, PathSegment, MAX_DEPTH, MAX_SOURCE_LEN};

use serde_json::Value;

/// A parsed condition expression
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition from source text
    pub fn parse(source: &str) -> ExprResult<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::Parser::parse_expression(source)?,
        })
    }

    /// Evaluate against a scope; unresolved paths read as `null`
    pub fn evaluate<S: Scope + ?Sized>(&self, scope: &S) -> bool {
        eval::evaluate_bool(&self.expr, scope)
    }

    /// Context roots this condition reads from
    pub fn roots(&self) -> Vec<&str> {
        self.expr.roots()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// A parsed input binding: one path or one literal
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    source: String,
    expr: Expr,
}

impl Binding {
    /// Parse a binding from source text
    pub fn parse(source: &str) -> ExprResult<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::Parser::parse_operand(source)?,
        })
    }

    /// Resolve against a scope; an unresolved path is an error
    pub fn resolve<S: Scope + ?Sized>(&self, scope: &S) -> ExprResult<Value> {
        eval::evaluate_value(&self.expr, scope)
    }

    /// The referenced path, if this binding is not a literal
    pub fn path(&self) -> Option<&Path> {
        match &self.expr {
            Expr::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
