//! SQL layer - parsing and name binding
//!
//! This module provides:
//! - `Parser`: Parses SQL text into the internal SELECT-core AST
//! - `Binder`: Resolves names against the catalog and builds logical plans

pub mod ast;
pub mod binder;
pub mod error;
pub mod parser;

pub use binder::Binder;
pub use error::{SqlError, SqlResult};
pub use parser::Parser;
