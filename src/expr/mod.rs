//! Expression language evaluated against a binding map.
//!
//! Test attributes (`<if test="...">`), bind values and foreach collections
//! are all expressions in this small language: member access, indexing,
//! comparison, boolean logic and arithmetic over JSON values.

pub mod ast;
pub mod cache;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOperator, Expression, UnaryOperator};
pub use cache::parse_cached;
pub use eval::{evaluate, evaluate_bool, to_bool, Evaluator};
pub use lexer::{Lexer, Token};
pub use parser::Parser;
