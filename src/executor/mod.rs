//! Query executor contract - Volcano iterator model
//!
//! The executor evaluating a physical plan is an external collaborator; this
//! module pins down the contract it implements. Each operator exposes
//! open/next/close, rows are positional vectors indexed by the ordinals the
//! planner assigned, and an `ExecContext` supplies the runtime services
//! correlated evaluation needs: outer-row binding slots and a per-query
//! cache of scalar subquery results.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Executor errors
#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    /// Ordinal out of range for the producing row
    #[error("column index {index} out of bounds for row of {row_len}")]
    ColumnIndexOutOfBounds { index: usize, row_len: usize },

    /// Semantic failure observed at execution time, e.g. a single join whose
    /// right side produced more than one match
    #[error("semantic error during execution: {0}")]
    Semantic(String),
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// A single runtime value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Datum {
    /// NULL value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl Datum {
    /// Check if this datum is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Convert to boolean, None if NULL or not convertible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            Datum::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

/// A row of datums, indexed positionally
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Datum>,
}

impl Row {
    /// Create a new row with the given values
    pub fn new(values: Vec<Datum>) -> Self {
        Row { values }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a datum by ordinal
    pub fn get(&self, index: usize) -> ExecutorResult<&Datum> {
        self.values
            .get(index)
            .ok_or(ExecutorError::ColumnIndexOutOfBounds {
                index,
                row_len: self.values.len(),
            })
    }

    /// Append another row's values (join concatenation)
    pub fn concat(mut self, other: Row) -> Row {
        self.values.extend(other.values);
        self
    }
}

/// Volcano-style iterator executor
///
/// Each operator implements:
/// - `open()`: Initialize the operator
/// - `next()`: Return the next row, or None if exhausted
/// - `close()`: Clean up resources
#[async_trait]
pub trait Executor: Send {
    /// Initialize the executor
    async fn open(&mut self, ctx: &mut ExecContext) -> ExecutorResult<()>;

    /// Get the next row, or None if exhausted
    async fn next(&mut self, ctx: &mut ExecContext) -> ExecutorResult<Option<Row>>;

    /// Close the executor and release resources
    async fn close(&mut self, ctx: &mut ExecContext) -> ExecutorResult<()>;
}

/// Runtime services for one query execution
#[derive(Debug, Default)]
pub struct ExecContext {
    /// Binding slots for the current outer row, keyed by the outer
    /// reference's rendered name; correlated subquery evaluation reads its
    /// outer columns from here
    outer_slots: HashMap<String, Datum>,
    /// Cache of scalar subquery results keyed by query id and the rendered
    /// outer bindings the result depends on
    subquery_cache: HashMap<(u32, String), Datum>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an outer column for correlated evaluation
    pub fn set_outer(&mut self, name: impl Into<String>, value: Datum) {
        self.outer_slots.insert(name.into(), value);
    }

    /// Read an outer binding
    pub fn outer(&self, name: &str) -> Option<&Datum> {
        self.outer_slots.get(name)
    }

    /// Look up a cached scalar subquery result
    pub fn cached_subquery(&self, query_id: u32, key: &str) -> Option<&Datum> {
        self.subquery_cache.get(&(query_id, key.to_string()))
    }

    /// Cache a scalar subquery result
    pub fn cache_subquery(&mut self, query_id: u32, key: impl Into<String>, value: Datum) {
        self.subquery_cache.insert((query_id, key.into()), value);
    }
}
