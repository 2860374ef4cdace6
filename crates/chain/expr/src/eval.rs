//! Evaluation of parsed expressions against a binding scope

use crate::errors::{ExprError, ExprResult};
use crate::parser::{CompareOp, Expr, Path, PathSegment};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Source of root values for path resolution
pub trait Scope {
    /// Look up a context root (`trigger` or a step alias)
    fn root(&self, name: &str) -> Option<&Value>;
}

impl Scope for HashMap<String, Value> {
    fn root(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Scope for serde_json::Map<String, Value> {
    fn root(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Resolve a path against a scope, returning `None` if any segment is missing
pub fn resolve_path<'a, S: Scope + ?Sized>(path: &Path, scope: &'a S) -> Option<&'a Value> {
    let mut current = scope.root(&path.root)?;
    for segment in &path.segments {
        current = match (segment, current) {
            (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluate an expression as a binding; unresolved paths are errors
pub fn evaluate_value<S: Scope + ?Sized>(expr: &Expr, scope: &S) -> ExprResult<Value> {
    match expr {
        Expr::Path(path) => resolve_path(path, scope)
            .cloned()
            .ok_or_else(|| ExprError::Unresolved(path.to_string())),
        Expr::Literal(value) => Ok(value.clone()),
        other => Ok(Value::Bool(evaluate_bool(other, scope))),
    }
}

/// Evaluate an expression as a condition; unresolved paths read as `null`
pub fn evaluate_bool<S: Scope + ?Sized>(expr: &Expr, scope: &S) -> bool {
    match expr {
        Expr::Path(_) | Expr::Literal(_) => is_truthy(&operand(expr, scope)),
        Expr::Not(inner) => !evaluate_bool(inner, scope),
        Expr::And(left, right) => evaluate_bool(left, scope) && evaluate_bool(right, scope),
        Expr::Or(left, right) => evaluate_bool(left, scope) || evaluate_bool(right, scope),
        Expr::Compare { op, left, right } => {
            let left = operand(left, scope);
            let right = operand(right, scope);
            compare(*op, &left, &right)
        }
    }
}

fn operand<'a, S: Scope + ?Sized>(expr: &'a Expr, scope: &'a S) -> Cow<'a, Value> {
    match expr {
        Expr::Path(path) => resolve_path(path, scope)
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Owned(Value::Null)),
        Expr::Literal(value) => Cow::Borrowed(value),
        nested => Cow::Owned(Value::Bool(evaluate_bool(nested, scope))),
    }
}

/// JSON truthiness: null, false, 0, "", [] and {} are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::LtEq => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::GtEq => matches!(
            order(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) if left.is_number() || right.is_number() => a == b,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
