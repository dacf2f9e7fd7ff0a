//! Mapper XML input format.
//!
//! `<mapper namespace="...">` documents declare statements
//! (`select|insert|update|delete`) whose bodies interleave SQL text with
//! the dynamic tags (`if`, `choose/when/otherwise`, `trim`, `where`, `set`,
//! `foreach`, `bind`), plus reusable `<sql id>` fragments spliced with
//! `<include refid>`.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::node::SqlNode;
use super::source::SqlSource;
use crate::error::{DynSqlError, DynSqlResult};
use crate::mapping::{MappedStatement, SqlCommandType, StatementType};

/// A parsed mapper document.
#[derive(Debug)]
pub struct Mapper {
    pub namespace: String,
    pub statements: Vec<MappedStatement>,
}

/// Event-driven parser over mapper XML.
pub struct MapperParser<'a> {
    source: &'a str,
    fragments: HashMap<String, SqlNode>,
}

impl<'a> MapperParser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            fragments: HashMap::new(),
        }
    }

    /// Parses the document into a [`Mapper`]. Statement ids are qualified
    /// with the namespace (`namespace.id`).
    pub fn parse(mut self) -> DynSqlResult<Mapper> {
        // Fragments first, so statements can include them in any order.
        // Fragment-to-fragment includes must be declared before use.
        self.collect_fragments()?;

        let mut reader = self.reader();
        let mut namespace = String::new();
        let mut statements = Vec::new();

        loop {
            match read_event(&mut reader)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"mapper" => {
                        if let Some(ns) = attr(&e, "namespace")? {
                            namespace = ns;
                        }
                    }
                    b"select" | b"insert" | b"update" | b"delete" => {
                        let statement = self.parse_statement(&mut reader, &e, &namespace)?;
                        statements.push(statement);
                    }
                    b"sql" => {
                        skip_subtree(&mut reader, &e)?;
                    }
                    other => {
                        return Err(unknown_tag(other));
                    }
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Mapper {
            namespace,
            statements,
        })
    }

    fn reader(&self) -> Reader<&'a [u8]> {
        let mut reader = Reader::from_str(self.source);
        reader.trim_text(true);
        reader
    }

    fn collect_fragments(&mut self) -> DynSqlResult<()> {
        let mut reader = self.reader();
        loop {
            match read_event(&mut reader)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"sql" => {
                        let id = require_attr(&e, "id")?;
                        let nodes = self.parse_body(&mut reader)?;
                        self.fragments.insert(id, SqlNode::mixed(nodes));
                    }
                    b"mapper" => {}
                    _ => skip_subtree(&mut reader, &e)?,
                },
                Event::Eof => return Ok(()),
                _ => {}
            }
        }
    }

    fn parse_statement(
        &self,
        reader: &mut Reader<&'a [u8]>,
        start: &BytesStart<'_>,
        namespace: &str,
    ) -> DynSqlResult<MappedStatement> {
        let command = match start.name().as_ref() {
            b"select" => SqlCommandType::Select,
            b"insert" => SqlCommandType::Insert,
            b"update" => SqlCommandType::Update,
            b"delete" => SqlCommandType::Delete,
            other => return Err(unknown_tag(other)),
        };

        let id = require_attr(start, "id")?;
        let id = if namespace.is_empty() {
            id
        } else {
            format!("{namespace}.{id}")
        };

        let statement_type = match attr(start, "statementType")?.as_deref() {
            None | Some("PREPARED") => StatementType::Prepared,
            Some("CALLABLE") => StatementType::Callable,
            Some(other) => {
                return Err(DynSqlError::MapperParse(format!(
                    "unknown statementType '{other}' on statement '{id}'"
                )))
            }
        };
        let flush_cache = attr(start, "flushCache")?.map(|v| v == "true");

        let nodes = self.parse_body(reader)?;
        let source = SqlSource::from_node(SqlNode::mixed(nodes))?;

        let mut statement =
            MappedStatement::new(id, command, source).with_statement_type(statement_type);
        if let Some(flush) = flush_cache {
            statement = statement.with_flush_cache(flush);
        }
        Ok(statement)
    }

    /// Parses tag children up to the matching end tag into a node list.
    fn parse_body(&self, reader: &mut Reader<&'a [u8]>) -> DynSqlResult<Vec<SqlNode>> {
        let mut nodes = Vec::new();

        loop {
            match read_event(reader)? {
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| DynSqlError::MapperParse(e.to_string()))?;
                    if !text.trim().is_empty() {
                        nodes.push(SqlNode::text(text.into_owned()));
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8(c.into_inner().into_owned())
                        .map_err(|e| DynSqlError::MapperParse(e.to_string()))?;
                    if !text.trim().is_empty() {
                        nodes.push(SqlNode::text(text));
                    }
                }
                Event::Start(e) => nodes.push(self.parse_tag(reader, &e)?),
                Event::Empty(e) => {
                    if let Some(node) = self.parse_empty_tag(&e)? {
                        nodes.push(node);
                    }
                }
                Event::End(_) | Event::Eof => return Ok(nodes),
                _ => {}
            }
        }
    }

    fn parse_tag(
        &self,
        reader: &mut Reader<&'a [u8]>,
        e: &BytesStart<'_>,
    ) -> DynSqlResult<SqlNode> {
        match e.name().as_ref() {
            b"if" => {
                let test = require_attr(e, "test")?;
                let contents = self.parse_body(reader)?;
                Ok(SqlNode::If {
                    test,
                    contents: Box::new(SqlNode::mixed(contents)),
                })
            }
            b"where" => {
                let contents = self.parse_body(reader)?;
                Ok(SqlNode::Where(Box::new(SqlNode::mixed(contents))))
            }
            b"set" => {
                let contents = self.parse_body(reader)?;
                Ok(SqlNode::Set(Box::new(SqlNode::mixed(contents))))
            }
            b"trim" => {
                let prefix = attr(e, "prefix")?;
                let suffix = attr(e, "suffix")?;
                let prefix_overrides = attr(e, "prefixOverrides")?
                    .map(|o| SqlNode::parse_overrides(&o))
                    .unwrap_or_default();
                let suffix_overrides = attr(e, "suffixOverrides")?
                    .map(|o| SqlNode::parse_overrides(&o))
                    .unwrap_or_default();
                let contents = self.parse_body(reader)?;
                Ok(SqlNode::Trim {
                    contents: Box::new(SqlNode::mixed(contents)),
                    prefix,
                    suffix,
                    prefix_overrides,
                    suffix_overrides,
                })
            }
            b"foreach" => {
                let collection = require_attr(e, "collection")?;
                let item = attr(e, "item")?;
                let index = attr(e, "index")?;
                let open = attr(e, "open")?;
                let close = attr(e, "close")?;
                let separator = attr(e, "separator")?;
                let contents = self.parse_body(reader)?;
                Ok(SqlNode::ForEach {
                    collection,
                    item,
                    index,
                    open,
                    close,
                    separator,
                    contents: Box::new(SqlNode::mixed(contents)),
                })
            }
            b"choose" => self.parse_choose(reader),
            b"bind" => {
                let name = require_attr(e, "name")?;
                let value = require_attr(e, "value")?;
                skip_subtree_from_body(reader)?;
                Ok(SqlNode::Bind { name, value })
            }
            b"include" => {
                let refid = require_attr(e, "refid")?;
                skip_subtree_from_body(reader)?;
                self.resolve_include(&refid)
            }
            other => Err(unknown_tag(other)),
        }
    }

    fn parse_empty_tag(&self, e: &BytesStart<'_>) -> DynSqlResult<Option<SqlNode>> {
        match e.name().as_ref() {
            b"bind" => {
                let name = require_attr(e, "name")?;
                let value = require_attr(e, "value")?;
                Ok(Some(SqlNode::Bind { name, value }))
            }
            b"include" => {
                let refid = require_attr(e, "refid")?;
                Ok(Some(self.resolve_include(&refid)?))
            }
            // A self-closing dynamic tag has no body and contributes nothing
            b"if" | b"where" | b"set" | b"trim" | b"foreach" | b"choose" => Ok(None),
            other => Err(unknown_tag(other)),
        }
    }

    fn parse_choose(&self, reader: &mut Reader<&'a [u8]>) -> DynSqlResult<SqlNode> {
        let mut whens = Vec::new();
        let mut otherwise = None;

        loop {
            match read_event(reader)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"when" => {
                        let test = require_attr(&e, "test")?;
                        let contents = self.parse_body(reader)?;
                        whens.push((test, SqlNode::mixed(contents)));
                    }
                    b"otherwise" => {
                        let contents = self.parse_body(reader)?;
                        otherwise = Some(Box::new(SqlNode::mixed(contents)));
                    }
                    other => return Err(unknown_tag(other)),
                },
                Event::End(_) | Event::Eof => break,
                _ => {}
            }
        }

        if whens.is_empty() {
            return Err(DynSqlError::MapperParse(
                "<choose> requires at least one <when>".to_string(),
            ));
        }
        Ok(SqlNode::Choose { whens, otherwise })
    }

    fn resolve_include(&self, refid: &str) -> DynSqlResult<SqlNode> {
        self.fragments
            .get(refid)
            .cloned()
            .ok_or_else(|| {
                DynSqlError::MapperParse(format!("unknown <include> refid '{refid}'"))
            })
    }
}

fn read_event<'a>(reader: &mut Reader<&'a [u8]>) -> DynSqlResult<Event<'a>> {
    reader
        .read_event()
        .map_err(|e| DynSqlError::MapperParse(e.to_string()))
}

fn attr(e: &BytesStart<'_>, name: &str) -> DynSqlResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| DynSqlError::MapperParse(e.to_string()))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| DynSqlError::MapperParse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn require_attr(e: &BytesStart<'_>, name: &str) -> DynSqlResult<String> {
    attr(e, name)?.ok_or_else(|| {
        DynSqlError::MapperParse(format!(
            "<{}> is missing required attribute '{name}'",
            String::from_utf8_lossy(e.name().as_ref())
        ))
    })
}

fn skip_subtree(reader: &mut Reader<&[u8]>, e: &BytesStart<'_>) -> DynSqlResult<()> {
    reader
        .read_to_end(e.name())
        .map_err(|err| DynSqlError::MapperParse(err.to_string()))?;
    Ok(())
}

/// Consumes events until the current tag's end; used for tags whose
/// children are ignored (`<bind>`, `<include>` with a body).
fn skip_subtree_from_body(reader: &mut Reader<&[u8]>) -> DynSqlResult<()> {
    let mut depth = 1usize;
    while depth > 0 {
        match read_event(reader)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn unknown_tag(name: &[u8]) -> DynSqlError {
    DynSqlError::MapperParse(format!(
        "unknown tag <{}>",
        String::from_utf8_lossy(name)
    ))
}
