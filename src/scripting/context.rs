use std::collections::HashMap;

use serde_json::Value;

use super::bound::ParameterMapping;
use crate::expr::eval::PARAMETER_KEY;

/// Per-composition accumulator: SQL fragments, bindings, parameter
/// descriptors, a monotone unique-number counter and the foreach
/// name-rewrite stack. One node tree composes on it at a time; it is not
/// thread-safe and is discarded after the composition.
pub struct DynamicContext {
    bindings: HashMap<String, Value>,
    sql_parts: Vec<String>,
    parameter_mappings: Vec<ParameterMapping>,
    unique_number: u32,
    rewrites: Vec<(String, String)>,
}

impl DynamicContext {
    pub fn new(parameter: Value) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert(PARAMETER_KEY.to_string(), parameter);

        Self {
            bindings,
            sql_parts: Vec::new(),
            parameter_mappings: Vec::new(),
            unique_number: 0,
            rewrites: Vec::new(),
        }
    }

    pub fn append_sql(&mut self, part: impl Into<String>) {
        self.sql_parts.push(part.into());
    }

    pub fn add_parameter_mapping(&mut self, mapping: ParameterMapping) {
        self.parameter_mappings.push(mapping);
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    /// Next unique number; monotone within one composition.
    pub fn unique_number(&mut self) -> u32 {
        let n = self.unique_number;
        self.unique_number += 1;
        n
    }

    /// The accumulated SQL: fragments joined by single spaces, whitespace
    /// runs collapsed.
    pub fn sql(&self) -> String {
        let joined = self.sql_parts.join(" ");
        joined.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Runs `f` with fragments redirected into a scoped buffer, returning
    /// `f`'s result together with the buffered text. Bindings, descriptors
    /// and the unique counter keep accumulating on `self`; only the SQL text
    /// is captured (trim wrappers rewrite it before re-appending).
    pub fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut DynamicContext) -> T,
    ) -> (T, String) {
        let mark = self.sql_parts.len();
        let result = f(self);
        let body = self.sql_parts.split_off(mark).join(" ");
        (result, body)
    }

    /// Pushes a foreach name-rewrite frame (`item` -> `__frch_item_<n>`).
    pub fn push_rewrite(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.rewrites.push((from.into(), to.into()));
    }

    pub fn pop_rewrites(&mut self, count: usize) {
        let keep = self.rewrites.len().saturating_sub(count);
        self.rewrites.truncate(keep);
    }

    /// Applies the innermost matching rewrite frame to a `#{...}` property.
    /// A frame for `item` matches `item`, `item.x` and `item[0]`.
    pub fn rewrite_property(&self, property: &str) -> String {
        for (from, to) in self.rewrites.iter().rev() {
            if property == from {
                return to.clone();
            }
            if let Some(rest) = property.strip_prefix(from.as_str()) {
                if rest.starts_with('.') || rest.starts_with('[') {
                    return format!("{to}{rest}");
                }
            }
        }
        property.to_string()
    }

    /// Decomposes the context into (sql, descriptors, bindings published
    /// during composition). The root parameter slot is not an additional
    /// parameter and is removed.
    pub fn into_parts(mut self) -> (String, Vec<ParameterMapping>, HashMap<String, Value>) {
        let sql = self.sql();
        self.bindings.remove(PARAMETER_KEY);
        (sql, self.parameter_mappings, self.bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_joins_and_collapses() {
        let mut ctx = DynamicContext::new(Value::Null);
        ctx.append_sql("SELECT *\n  FROM t");
        ctx.append_sql("WHERE id = ?");
        assert_eq!(ctx.sql(), "SELECT * FROM t WHERE id = ?");
    }

    #[test]
    fn test_unique_number_is_monotone() {
        let mut ctx = DynamicContext::new(Value::Null);
        assert_eq!(ctx.unique_number(), 0);
        assert_eq!(ctx.unique_number(), 1);
        assert_eq!(ctx.unique_number(), 2);
    }

    #[test]
    fn test_scoped_captures_only_inner_fragments() {
        let mut ctx = DynamicContext::new(Value::Null);
        ctx.append_sql("SELECT 1");
        let (_, body) = ctx.scoped(|ctx| {
            ctx.append_sql("name = ?");
            ctx.append_sql("AND age = ?");
        });
        assert_eq!(body, "name = ? AND age = ?");
        assert_eq!(ctx.sql(), "SELECT 1");
    }

    #[test]
    fn test_rewrite_property_matches_whole_segment_only() {
        let mut ctx = DynamicContext::new(Value::Null);
        ctx.push_rewrite("item", "__frch_item_0");
        assert_eq!(ctx.rewrite_property("item"), "__frch_item_0");
        assert_eq!(ctx.rewrite_property("item.id"), "__frch_item_0.id");
        assert_eq!(ctx.rewrite_property("item[2]"), "__frch_item_0[2]");
        assert_eq!(ctx.rewrite_property("items"), "items");
    }

    #[test]
    fn test_bindings_visible_to_later_nodes() {
        let mut ctx = DynamicContext::new(json!({"a": 1}));
        ctx.bind("pattern", json!("%x%"));
        assert_eq!(ctx.bindings().get("pattern"), Some(&json!("%x%")));
        let (_, _, additional) = ctx.into_parts();
        assert_eq!(additional.get("pattern"), Some(&json!("%x%")));
        assert!(!additional.contains_key(PARAMETER_KEY));
    }
}
