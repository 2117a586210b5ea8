//! SQL error types

use thiserror::Error;

/// SQL parse and binding errors
#[derive(Error, Debug, Clone)]
pub enum SqlError {
    /// Parse error from sqlparser
    #[error("parse error: {0}")]
    Parse(String),

    /// Table not found during binding
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Column not found during binding
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// Column is ambiguous (exists in multiple tables in scope)
    #[error("column '{0}' is ambiguous")]
    AmbiguousColumn(String),

    /// Invalid operation
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Unsupported SQL feature
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<sqlparser::parser::ParserError> for SqlError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        SqlError::Parse(err.to_string())
    }
}

/// Result type for SQL operations
pub type SqlResult<T> = Result<T, SqlError>;
