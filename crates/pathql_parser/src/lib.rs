//! Parser for the path query language. Produces an unbound syntax tree; name
//! resolution against a schema happens later during binding.
pub mod ast;
pub mod keywords;
pub mod parser;
pub mod tokens;

pub use parser::parse;
