use serde_json::Value;

use super::context::DynamicContext;
use super::tokens::{parse_parameter, scan_tokens, TextToken};
use crate::error::{DynSqlError, DynSqlResult};
use crate::expr::eval::render;
use crate::expr::Evaluator;

const WHERE_PREFIX_OVERRIDES: &[&str] = &[
    "AND ", "OR ", "AND\n", "OR\n", "AND\r", "OR\r", "AND\t", "OR\t",
];
const SET_SUFFIX_OVERRIDES: &[&str] = &[","];

/// One composable piece of dynamic SQL. Trees are built at registration
/// time and immutable afterwards; `apply` walks the tree against one
/// [`DynamicContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlNode {
    /// Literal fragment; `#{...}` tokens normalize to placeholders,
    /// `${...}` tokens splice evaluated text.
    Text(String),
    /// Ordered sequence of children
    Mixed(Vec<SqlNode>),
    /// Child applies iff the test expression is truthy
    If {
        test: String,
        contents: Box<SqlNode>,
    },
    /// First truthy guard wins; the default applies when none does
    Choose {
        whens: Vec<(String, SqlNode)>,
        otherwise: Option<Box<SqlNode>>,
    },
    /// Boundary rewriting around a child fragment
    Trim {
        contents: Box<SqlNode>,
        prefix: Option<String>,
        suffix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix_overrides: Vec<String>,
    },
    /// Trim with prefix WHERE, stripping a leading AND/OR
    Where(Box<SqlNode>),
    /// Trim with prefix SET, stripping a trailing comma
    Set(Box<SqlNode>),
    /// Iterates a collection, uniquifying per-iteration placeholders
    ForEach {
        collection: String,
        item: Option<String>,
        index: Option<String>,
        open: Option<String>,
        close: Option<String>,
        separator: Option<String>,
        contents: Box<SqlNode>,
    },
    /// Evaluates an expression and publishes it into the binding map
    Bind { name: String, value: String },
}

impl SqlNode {
    pub fn text(text: impl Into<String>) -> Self {
        SqlNode::Text(text.into())
    }

    /// Collapses a child list to a single node.
    pub fn mixed(mut children: Vec<SqlNode>) -> Self {
        if children.len() == 1 {
            children.remove(0)
        } else {
            SqlNode::Mixed(children)
        }
    }

    /// Parses a `|`-separated, case-insensitive override list. Tokens keep
    /// their whitespace: `AND ` matches only at a word boundary.
    pub fn parse_overrides(overrides: &str) -> Vec<String> {
        overrides
            .split('|')
            .map(|o| o.to_ascii_uppercase())
            .filter(|o| !o.trim().is_empty())
            .collect()
    }

    /// Applies this node to the context. The returned flag reports whether
    /// the branch contributed, for use by conditional wrappers.
    pub fn apply(&self, ctx: &mut DynamicContext) -> DynSqlResult<bool> {
        let evaluator = Evaluator::new();
        match self {
            SqlNode::Text(text) => apply_text(text, ctx),

            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(true)
            }

            SqlNode::If { test, contents } => {
                if evaluator.truthy(test, ctx.bindings())? {
                    contents.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }

            SqlNode::Choose { whens, otherwise } => {
                for (test, contents) in whens {
                    if evaluator.truthy(test, ctx.bindings())? {
                        contents.apply(ctx)?;
                        return Ok(true);
                    }
                }
                if let Some(contents) = otherwise {
                    contents.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }

            SqlNode::Trim {
                contents,
                prefix,
                suffix,
                prefix_overrides,
                suffix_overrides,
            } => {
                let prefix_overrides: Vec<&str> =
                    prefix_overrides.iter().map(String::as_str).collect();
                let suffix_overrides: Vec<&str> =
                    suffix_overrides.iter().map(String::as_str).collect();
                apply_trim(
                    ctx,
                    contents,
                    prefix.as_deref(),
                    suffix.as_deref(),
                    &prefix_overrides,
                    &suffix_overrides,
                )
            }

            SqlNode::Where(contents) => {
                apply_trim(ctx, contents, Some("WHERE"), None, WHERE_PREFIX_OVERRIDES, &[])
            }

            SqlNode::Set(contents) => {
                apply_trim(ctx, contents, Some("SET"), None, &[], SET_SUFFIX_OVERRIDES)
            }

            SqlNode::ForEach {
                collection,
                item,
                index,
                open,
                close,
                separator,
                contents,
            } => apply_foreach(
                ctx,
                collection,
                item.as_deref(),
                index.as_deref(),
                open.as_deref(),
                close.as_deref(),
                separator.as_deref(),
                contents,
            ),

            SqlNode::Bind { name, value } => {
                let bound = evaluator.value(value, ctx.bindings())?;
                ctx.bind(name.clone(), bound);
                Ok(true)
            }
        }
    }
}

/// Scans a text fragment once: literals pass through, `${...}` splices
/// evaluated text (never re-scanned), `#{...}` appends `?` and records a
/// descriptor, applying any active foreach rewrite to the property name.
fn apply_text(text: &str, ctx: &mut DynamicContext) -> DynSqlResult<bool> {
    let evaluator = Evaluator::new();
    let mut out = String::new();

    for token in scan_tokens(text)? {
        match token {
            TextToken::Literal(literal) => out.push_str(&literal),
            TextToken::Splice(expression) => {
                let value = evaluator.value(&expression, ctx.bindings())?;
                out.push_str(&render(&value));
            }
            TextToken::Placeholder(content) => {
                let mut mapping = parse_parameter(&content)?;
                mapping.property = ctx.rewrite_property(&mapping.property);
                ctx.add_parameter_mapping(mapping);
                out.push('?');
            }
        }
    }

    ctx.append_sql(out);
    Ok(true)
}

fn apply_trim(
    ctx: &mut DynamicContext,
    contents: &SqlNode,
    prefix: Option<&str>,
    suffix: Option<&str>,
    prefix_overrides: &[&str],
    suffix_overrides: &[&str],
) -> DynSqlResult<bool> {
    let (applied, body) = ctx.scoped(|ctx| contents.apply(ctx));
    let applied = applied?;

    let mut sql = body.trim().to_string();
    if sql.is_empty() {
        // Whitespace-only body: the wrapper is a no-op
        return Ok(applied);
    }

    // ASCII fold keeps byte offsets aligned with the original text
    let upper = sql.to_ascii_uppercase();
    if let Some(over) = prefix_overrides
        .iter()
        .copied()
        .find(|over| upper.starts_with(over))
    {
        sql.replace_range(..over.trim_end().len(), "");
    }
    let upper = sql.to_ascii_uppercase();
    if let Some(over) = suffix_overrides
        .iter()
        .copied()
        .find(|over| upper.ends_with(over) || upper.ends_with(over.trim_end()))
    {
        let cut = sql.len() - over.trim_end().len();
        sql.truncate(cut);
    }

    let mut out = sql;
    if let Some(prefix) = prefix {
        out = format!("{prefix} {out}");
    }
    if let Some(suffix) = suffix {
        out = format!("{out} {suffix}");
    }
    ctx.append_sql(out);
    Ok(applied)
}

#[allow(clippy::too_many_arguments)]
fn apply_foreach(
    ctx: &mut DynamicContext,
    collection: &str,
    item: Option<&str>,
    index: Option<&str>,
    open: Option<&str>,
    close: Option<&str>,
    separator: Option<&str>,
    contents: &SqlNode,
) -> DynSqlResult<bool> {
    let evaluator = Evaluator::new();
    let value = evaluator.value(collection, ctx.bindings())?;

    // (index, item) pairs: ordinals for sequences, keys for mappings
    let entries: Vec<(Value, Value)> = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), v))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect(),
        Value::Null => {
            return Err(DynSqlError::Build(format!(
                "foreach collection '{collection}' evaluated to null"
            )))
        }
        other => {
            return Err(DynSqlError::Build(format!(
                "foreach collection '{collection}' is not iterable: {other}"
            )))
        }
    };

    if entries.is_empty() {
        return Ok(true);
    }

    if let Some(open) = open {
        ctx.append_sql(open);
    }
    for (position, (key, element)) in entries.into_iter().enumerate() {
        if position > 0 {
            if let Some(separator) = separator {
                ctx.append_sql(separator);
            }
        }

        // One unique number per iteration keeps generated placeholder
        // names distinct across iterations and across nested loops.
        let n = ctx.unique_number();
        let mut frames = 0;
        if let Some(item) = item {
            let slot = itemized(item, n);
            ctx.bind(item, element.clone());
            ctx.bind(slot.clone(), element);
            ctx.push_rewrite(item, slot);
            frames += 1;
        }
        if let Some(index) = index {
            let slot = itemized(index, n);
            ctx.bind(index, key.clone());
            ctx.bind(slot.clone(), key);
            ctx.push_rewrite(index, slot);
            frames += 1;
        }

        let result = contents.apply(ctx);
        ctx.pop_rewrites(frames);
        result?;
    }
    if let Some(close) = close {
        ctx.append_sql(close);
    }
    Ok(true)
}

fn itemized(name: &str, n: u32) -> String {
    format!("__frch_{name}_{n}")
}
