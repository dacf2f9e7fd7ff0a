use super::bound::{ParameterMapping, ParameterMode};
use crate::error::{DynSqlError, DynSqlResult};

/// One lexical piece of a text fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum TextToken {
    /// Plain SQL text
    Literal(String),
    /// `#{...}` content: becomes a `?` plus a parameter descriptor
    Placeholder(String),
    /// `${...}` content: an expression spliced verbatim into the SQL
    Splice(String),
}

/// Single left-to-right scan of a text fragment for `#{...}` and `${...}`
/// tokens. Spliced content is handed back as-is; it is never re-scanned.
pub fn scan_tokens(text: &str) -> DynSqlResult<Vec<TextToken>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        let marker = match ch {
            '#' | '$' if matches!(chars.peek(), Some((_, '{'))) => ch,
            _ => {
                literal.push(ch);
                continue;
            }
        };
        chars.next(); // consume '{'

        let mut content = String::new();
        let mut closed = false;
        for (_, inner) in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            content.push(inner);
        }
        if !closed {
            return Err(DynSqlError::Build(format!(
                "unterminated {marker}{{...}} token in: {text}"
            )));
        }

        if !literal.is_empty() {
            tokens.push(TextToken::Literal(std::mem::take(&mut literal)));
        }
        if marker == '#' {
            tokens.push(TextToken::Placeholder(content));
        } else {
            tokens.push(TextToken::Splice(content));
        }
    }

    if !literal.is_empty() {
        tokens.push(TextToken::Literal(literal));
    }
    Ok(tokens)
}

/// True if the text contains a `${...}` splice (such text can only be
/// resolved at composition time).
pub fn has_splice(text: &str) -> bool {
    matches!(
        scan_tokens(text),
        Ok(tokens) if tokens.iter().any(|t| matches!(t, TextToken::Splice(_)))
    )
}

/// Parses `#{...}` content: a property name followed by optional
/// comma-separated attributes (`mode`, `javaType`, `jdbcType`, `nullable`).
pub fn parse_parameter(content: &str) -> DynSqlResult<ParameterMapping> {
    let mut parts = content.split(',');
    let property = parts
        .next()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            DynSqlError::Build(format!("empty parameter token: #{{{content}}}"))
        })?;

    let mut mapping = ParameterMapping::new(property);
    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (key, value) = attr.split_once('=').ok_or_else(|| {
            DynSqlError::Build(format!(
                "malformed attribute '{attr}' in parameter token: #{{{content}}}"
            ))
        })?;
        let value = value.trim();
        match key.trim() {
            "mode" => {
                mapping.mode = match value.to_ascii_uppercase().as_str() {
                    "IN" => ParameterMode::In,
                    "OUT" => ParameterMode::Out,
                    "INOUT" => ParameterMode::InOut,
                    other => {
                        return Err(DynSqlError::Build(format!(
                            "unknown parameter mode '{other}' in #{{{content}}}"
                        )))
                    }
                }
            }
            "javaType" | "type" => mapping.declared_type = Some(value.to_string()),
            "jdbcType" => mapping.jdbc_type = Some(value.to_string()),
            "nullable" => mapping.nullable = value.eq_ignore_ascii_case("true"),
            other => {
                return Err(DynSqlError::Build(format!(
                    "unknown attribute '{other}' in parameter token: #{{{content}}}"
                )))
            }
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mixed_tokens() {
        let tokens = scan_tokens("SELECT * FROM ${table} WHERE id = #{id}").unwrap();
        assert_eq!(
            tokens,
            vec![
                TextToken::Literal("SELECT * FROM ".to_string()),
                TextToken::Splice("table".to_string()),
                TextToken::Literal(" WHERE id = ".to_string()),
                TextToken::Placeholder("id".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_plain_text() {
        let tokens = scan_tokens("SELECT 1").unwrap();
        assert_eq!(tokens, vec![TextToken::Literal("SELECT 1".to_string())]);
    }

    #[test]
    fn test_hash_without_brace_is_literal() {
        let tokens = scan_tokens("# not a token $").unwrap();
        assert_eq!(
            tokens,
            vec![TextToken::Literal("# not a token $".to_string())]
        );
    }

    #[test]
    fn test_unterminated_token_is_an_error() {
        assert!(scan_tokens("WHERE id = #{id").is_err());
    }

    #[test]
    fn test_parse_parameter_with_attributes() {
        let mapping =
            parse_parameter("report, mode=OUT, jdbcType=VARCHAR, nullable=false").unwrap();
        assert_eq!(mapping.property, "report");
        assert_eq!(mapping.mode, ParameterMode::Out);
        assert_eq!(mapping.jdbc_type.as_deref(), Some("VARCHAR"));
        assert!(!mapping.nullable);
    }

    #[test]
    fn test_parse_parameter_defaults() {
        let mapping = parse_parameter("name").unwrap();
        assert_eq!(mapping.property, "name");
        assert_eq!(mapping.mode, ParameterMode::In);
        assert!(mapping.nullable);
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        assert!(parse_parameter("name, frobnicate=yes").is_err());
        assert!(parse_parameter("").is_err());
    }
}
