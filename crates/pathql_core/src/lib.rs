//! Compiler from the path query language to SQL, with an execution wrapper
//! and a chunked result cache.

pub mod binder;
pub mod cache;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod execution;
pub mod expr;
pub mod optimizer;
pub mod query;
pub mod testutil;
pub mod value;

pub use compiler::QueryCompiler;
