use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::ast::{BinaryOperator, Expression, UnaryOperator};
use super::cache::parse_cached;
use crate::error::{DynSqlError, DynSqlResult};

/// Reserved binding slot holding the root parameter object.
pub const PARAMETER_KEY: &str = "_parameter";

/// Expression evaluator over a binding map.
///
/// Bare names resolve from the binding map first, then as properties of the
/// root parameter object. In lenient mode (the default) unknown names
/// resolve to null; strict mode turns them into errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    strict: bool,
}

impl Evaluator {
    pub fn new() -> Self {
        Self { strict: false }
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Parse (through the process-wide cache) and evaluate `source`.
    pub fn value(&self, source: &str, bindings: &HashMap<String, Value>) -> DynSqlResult<Value> {
        let expr = parse_cached(source)?;
        self.eval(&expr, bindings)
            .map_err(|e| annotate(source, e))
    }

    /// Evaluate `source` and reduce the result to truthiness.
    pub fn truthy(&self, source: &str, bindings: &HashMap<String, Value>) -> DynSqlResult<bool> {
        Ok(to_bool(&self.value(source, bindings)?))
    }

    pub fn eval(
        &self,
        expr: &Expression,
        bindings: &HashMap<String, Value>,
    ) -> DynSqlResult<Value> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),

            Expression::Identifier(name) => self.resolve(name, bindings),

            Expression::FieldAccess(base, field) => {
                let base_value = self.eval(base, bindings)?;
                Ok(base_value.get(field).cloned().unwrap_or(Value::Null))
            }

            Expression::IndexAccess(base, index) => {
                let base_value = self.eval(base, bindings)?;
                let index_value = self.eval(index, bindings)?;
                Ok(index_value_of(&base_value, &index_value))
            }

            Expression::Unary(op, operand) => {
                let value = self.eval(operand, bindings)?;
                evaluate_unary_op(*op, &value)
            }

            Expression::Binary(left, op, right) => {
                // Short-circuit the logical operators
                match op {
                    BinaryOperator::And => {
                        let lhs = self.eval(left, bindings)?;
                        if !to_bool(&lhs) {
                            return Ok(Value::Bool(false));
                        }
                        return Ok(Value::Bool(to_bool(&self.eval(right, bindings)?)));
                    }
                    BinaryOperator::Or => {
                        let lhs = self.eval(left, bindings)?;
                        if to_bool(&lhs) {
                            return Ok(Value::Bool(true));
                        }
                        return Ok(Value::Bool(to_bool(&self.eval(right, bindings)?)));
                    }
                    _ => {}
                }
                let lhs = self.eval(left, bindings)?;
                let rhs = self.eval(right, bindings)?;
                evaluate_binary_op(&lhs, *op, &rhs)
            }
        }
    }

    fn resolve(&self, name: &str, bindings: &HashMap<String, Value>) -> DynSqlResult<Value> {
        if let Some(value) = bindings.get(name) {
            return Ok(value.clone());
        }
        if let Some(root) = bindings.get(PARAMETER_KEY) {
            if let Some(value) = root.get(name) {
                return Ok(value.clone());
            }
        }
        if self.strict {
            return Err(DynSqlError::expression(
                name,
                "name not found in bindings",
            ))
        }
        Ok(Value::Null)
    }
}

/// Evaluate `source` against `bindings` with the default (lenient) evaluator.
pub fn evaluate(source: &str, bindings: &HashMap<String, Value>) -> DynSqlResult<Value> {
    Evaluator::new().value(source, bindings)
}

/// Truthiness of `source` evaluated against `bindings`.
pub fn evaluate_bool(source: &str, bindings: &HashMap<String, Value>) -> DynSqlResult<bool> {
    Evaluator::new().truthy(source, bindings)
}

/// Truthiness rules: booleans as-is, numbers non-zero, strings non-empty,
/// collections non-empty, null false, anything else true.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[inline]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Ordering between two values; `None` for incomparable types.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn evaluate_unary_op(op: UnaryOperator, value: &Value) -> DynSqlResult<Value> {
    match op {
        UnaryOperator::Not => Ok(Value::Bool(!to_bool(value))),
        UnaryOperator::Minus => match value.as_f64() {
            Some(f) => Ok(number_value(-f)),
            None => Err(DynSqlError::expression(
                value.to_string(),
                "unary minus on a non-number",
            )),
        },
    }
}

fn evaluate_binary_op(left: &Value, op: BinaryOperator, right: &Value) -> DynSqlResult<Value> {
    match op {
        BinaryOperator::Equal => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(left, right))),

        BinaryOperator::LessThan => Ok(Value::Bool(
            compare_values(left, right) == Some(Ordering::Less),
        )),
        BinaryOperator::LessThanOrEqual => Ok(Value::Bool(matches!(
            compare_values(left, right),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ))),
        BinaryOperator::GreaterThan => Ok(Value::Bool(
            compare_values(left, right) == Some(Ordering::Greater),
        )),
        BinaryOperator::GreaterThanOrEqual => Ok(Value::Bool(matches!(
            compare_values(left, right),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ))),

        BinaryOperator::Add => {
            // String concatenation when either side is a string
            if let (Value::String(a), b) = (left, right) {
                return Ok(Value::String(format!("{a}{}", render(b))));
            }
            if let (a, Value::String(b)) = (left, right) {
                return Ok(Value::String(format!("{}{b}", render(a))));
            }
            arithmetic(left, right, |a, b| a + b)
        }
        BinaryOperator::Subtract => arithmetic(left, right, |a, b| a - b),
        BinaryOperator::Multiply => arithmetic(left, right, |a, b| a * b),
        BinaryOperator::Divide => {
            if right.as_f64() == Some(0.0) {
                return Err(DynSqlError::expression("/", "division by zero"));
            }
            arithmetic(left, right, |a, b| a / b)
        }
        BinaryOperator::Modulo => {
            if right.as_f64() == Some(0.0) {
                return Err(DynSqlError::expression("%", "division by zero"));
            }
            arithmetic(left, right, |a, b| a % b)
        }

        BinaryOperator::And | BinaryOperator::Or => {
            // Handled (short-circuited) by the evaluator
            Ok(Value::Bool(false))
        }
    }
}

fn arithmetic(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> DynSqlResult<Value> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(number_value(f(a, b))),
        _ => Err(DynSqlError::expression(
            format!("{left} ? {right}"),
            "arithmetic on non-numbers",
        )),
    }
}

fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn index_value_of(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null),
        (Value::Object(map), Value::String(key)) => {
            map.get(key).cloned().unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// Render a value the way it splices into SQL text: strings bare, scalars
/// via Display, null as the empty string, containers as JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn annotate(source: &str, err: DynSqlError) -> DynSqlError {
    match err {
        DynSqlError::Expression { message, .. } => DynSqlError::expression(source, message),
        other => other,
    }
}
