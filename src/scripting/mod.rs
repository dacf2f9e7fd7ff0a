//! Dynamic SQL composition.
//!
//! A statement's SQL is a tree of [`node::SqlNode`]s built once at
//! registration time. Composing the tree against runtime bindings fills a
//! [`context::DynamicContext`] and yields a [`bound::BoundSql`]: final SQL
//! with positional `?` placeholders plus the ordered parameter descriptors.

pub mod bound;
pub mod context;
pub mod node;
pub mod source;
pub mod tokens;
pub mod xml;

pub use bound::{BoundSql, ParameterMapping, ParameterMode};
pub use context::DynamicContext;
pub use node::SqlNode;
pub use source::SqlSource;
pub use xml::{Mapper, MapperParser};
