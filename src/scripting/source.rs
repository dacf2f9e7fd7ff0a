use std::collections::HashMap;

use serde_json::Value;

use super::bound::BoundSql;
use super::context::DynamicContext;
use super::node::SqlNode;
use super::tokens;
use crate::error::{DynSqlError, DynSqlResult};

/// Where a statement's SQL comes from.
#[derive(Debug, Clone)]
pub enum SqlSource {
    /// Statement known static at build time: placeholders pre-normalized,
    /// composition is a clone.
    Raw {
        sql: String,
        parameter_mappings: Vec<super::bound::ParameterMapping>,
    },
    /// Node tree composed against the bindings on every call.
    Dynamic { root: SqlNode },
    /// A fixed, already-composed BoundSql (plugin-rewritten statements).
    Prebound(BoundSql),
}

impl SqlSource {
    /// Builds a source from a node tree, collapsing purely static trees
    /// (no dynamic tags, no `${...}` splices) to a pre-normalized form.
    pub fn from_node(root: SqlNode) -> DynSqlResult<Self> {
        if is_static(&root) {
            let mut ctx = DynamicContext::new(Value::Null);
            root.apply(&mut ctx)?;
            let (sql, parameter_mappings, _) = ctx.into_parts();
            if sql.is_empty() {
                return Err(DynSqlError::Build("statement has no SQL text".to_string()));
            }
            return Ok(SqlSource::Raw {
                sql,
                parameter_mappings,
            });
        }
        Ok(SqlSource::Dynamic { root })
    }

    /// Composes the final SQL and descriptors for one execution.
    pub fn bound_sql(&self, parameter: &Value) -> DynSqlResult<BoundSql> {
        match self {
            SqlSource::Raw {
                sql,
                parameter_mappings,
            } => Ok(BoundSql::new(
                sql.clone(),
                parameter_mappings.clone(),
                parameter.clone(),
                HashMap::new(),
            )),

            SqlSource::Dynamic { root } => {
                let mut ctx = DynamicContext::new(parameter.clone());
                root.apply(&mut ctx)?;
                let (sql, parameter_mappings, additional) = ctx.into_parts();
                if sql.is_empty() {
                    return Err(DynSqlError::Build(
                        "composition produced an empty statement".to_string(),
                    ));
                }
                Ok(BoundSql::new(
                    sql,
                    parameter_mappings,
                    parameter.clone(),
                    additional,
                ))
            }

            SqlSource::Prebound(bound) => Ok(bound.clone()),
        }
    }
}

fn is_static(node: &SqlNode) -> bool {
    match node {
        SqlNode::Text(text) => !tokens::has_splice(text),
        SqlNode::Mixed(children) => children.iter().all(is_static),
        _ => false,
    }
}
