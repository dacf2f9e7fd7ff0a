use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::driver::TypeConverterRegistry;

/// Parameter I/O mode. OUT and INOUT only make sense for callable
/// statements; plain prepared statements bind IN parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

/// One `#{...}` placeholder: the property it binds, its I/O mode and the
/// optional type hints carried in the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub property: String,
    pub mode: ParameterMode,
    pub declared_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub nullable: bool,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mode: ParameterMode::In,
            declared_type: None,
            jdbc_type: None,
            nullable: true,
        }
    }
}

/// The product of one composition: final SQL text with positional `?`
/// placeholders, the descriptors in placeholder order, a snapshot of the
/// root parameter object, and the bindings published during composition
/// (`<bind>` values, foreach iteration slots). Valid for one execution.
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    parameter_object: Value,
    additional_parameters: HashMap<String, Value>,
}

impl BoundSql {
    pub fn new(
        sql: String,
        parameter_mappings: Vec<ParameterMapping>,
        parameter_object: Value,
        additional_parameters: HashMap<String, Value>,
    ) -> Self {
        Self {
            sql,
            parameter_mappings,
            parameter_object,
            additional_parameters,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Replaces the SQL text, keeping descriptors and bindings. Used by
    /// plugins that rewrite a composed statement (e.g. dialect paging).
    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.sql = sql.into();
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    pub fn parameter_object(&self) -> &Value {
        &self.parameter_object
    }

    pub fn additional_parameters(&self) -> &HashMap<String, Value> {
        &self.additional_parameters
    }

    pub fn has_additional_parameter(&self, property: &str) -> bool {
        self.additional_parameters
            .contains_key(leading_segment(property))
    }

    /// Resolves the value a descriptor binds, preferring additional
    /// parameters over the root object. When the root itself has a
    /// registered converter (scalar roots), it is the value for any
    /// property name.
    pub fn parameter_value(&self, property: &str, converters: &TypeConverterRegistry) -> Value {
        let head = leading_segment(property);
        if let Some(base) = self.additional_parameters.get(head) {
            let rest = &property[head.len()..];
            return get_path(base, rest);
        }
        if self.parameter_object.is_null() {
            return Value::Null;
        }
        if converters.has_converter(&self.parameter_object) {
            return self.parameter_object.clone();
        }
        get_path(&self.parameter_object, &format!(".{property}"))
    }
}

/// Leading identifier of a property path: `a.b[0]` -> `a`.
fn leading_segment(property: &str) -> &str {
    let end = property
        .find(['.', '['])
        .unwrap_or(property.len());
    &property[..end]
}

/// Navigates `base` along a path of `.field` and `[index]` steps. The path
/// must start with `.` or `[` (or be empty). Missing steps yield null.
fn get_path(base: &Value, path: &str) -> Value {
    let mut current = base.clone();
    let mut rest = path;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            let end = tail.find(['.', '[']).unwrap_or(tail.len());
            let (field, remainder) = tail.split_at(end);
            current = current.get(field).cloned().unwrap_or(Value::Null);
            rest = remainder;
        } else if let Some(tail) = rest.strip_prefix('[') {
            let end = match tail.find(']') {
                Some(end) => end,
                None => return Value::Null,
            };
            let (index, remainder) = tail.split_at(end);
            current = match index.parse::<usize>() {
                Ok(i) => current.get(i).cloned().unwrap_or(Value::Null),
                Err(_) => current
                    .get(index.trim_matches(['\'', '"']))
                    .cloned()
                    .unwrap_or(Value::Null),
            };
            rest = &remainder[1..];
        } else {
            return Value::Null;
        }
    }
    current
}
