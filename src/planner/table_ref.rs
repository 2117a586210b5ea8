//! Table references
//!
//! A table reference names a row source appearing in a FROM clause: a base
//! table, a subquery-as-table, or an external data file. Each exposes its
//! logical output as an ordered list of column references and keeps track of
//! outer references that were bound against it from nested scopes, so that
//! resolution can force those columns to survive in the source's output.

use crate::catalog::DataType;
use crate::planner::expr::{ColExpr, Expr};

/// Base table reference
#[derive(Debug, Clone, PartialEq)]
pub struct BaseTableRef {
    /// Catalog table name
    pub name: String,
    /// Alias in the query (defaults to the table name)
    pub alias: String,
    /// Column names and types, in table order
    pub columns: Vec<(String, DataType)>,
    /// Outer references bound against this table from nested scopes
    pub outer_refs: Vec<ColExpr>,
}

/// Subquery-as-table reference (derived table)
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRef {
    /// Alias of the derived table
    pub alias: String,
    /// Output column names of the nested query
    pub col_names: Vec<String>,
    /// The nested query's select list, used to resolve its plan
    pub select_list: Vec<Expr>,
    /// Outer references bound against this derived table
    pub outer_refs: Vec<ColExpr>,
}

/// External file reference
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFileRef {
    /// File path
    pub path: String,
    /// Alias in the query
    pub alias: String,
    /// File schema
    pub columns: Vec<(String, DataType)>,
    /// Outer references bound against this source
    pub outer_refs: Vec<ColExpr>,
}

/// A named row source in a FROM clause
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Base(BaseTableRef),
    Query(QueryRef),
    File(ExternalFileRef),
}

/// Build the ordered column-reference list for a source, each reference
/// carrying its position as the resolved ordinal.
fn columns_as_refs(alias: &str, names: &[&str]) -> Vec<Expr> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Expr::ColRef(ColExpr {
                tab_name: Some(alias.to_string()),
                col_name: name.to_string(),
                outer_ref: false,
                ordinal: i as i32,
            })
        })
        .collect()
}

fn record_outer(refs: &mut Vec<ColExpr>, col: ColExpr) {
    if !refs
        .iter()
        .any(|c| c.col_name == col.col_name && c.tab_name == col.tab_name)
    {
        refs.push(col);
    }
}

/// Augment a projection list with outer references that must cross the
/// source's boundary even if the parent did not request them. Ordinals are
/// filled from the source's column order; entries already present (equality
/// ignores the outer flag) are not duplicated.
fn add_outer_refs(names: &[&str], outer_refs: &[ColExpr], output: &mut Vec<Expr>) {
    for col in outer_refs {
        let mut col = col.clone();
        if let Some(i) = names.iter().position(|n| *n == col.col_name) {
            col.ordinal = i as i32;
        }
        let expr = Expr::ColRef(col);
        if !output.contains(&expr) {
            output.push(expr);
        }
    }
}

impl BaseTableRef {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn all_columns_refs(&self) -> Vec<Expr> {
        columns_as_refs(&self.alias, &self.column_names())
    }

    pub fn record_outer_ref(&mut self, col: ColExpr) {
        record_outer(&mut self.outer_refs, col);
    }

    pub fn add_outer_refs_to_output(&self, output: &mut Vec<Expr>) {
        add_outer_refs(&self.column_names(), &self.outer_refs, output);
    }
}

impl ExternalFileRef {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn all_columns_refs(&self) -> Vec<Expr> {
        columns_as_refs(&self.alias, &self.column_names())
    }

    pub fn record_outer_ref(&mut self, col: ColExpr) {
        record_outer(&mut self.outer_refs, col);
    }

    pub fn add_outer_refs_to_output(&self, output: &mut Vec<Expr>) {
        add_outer_refs(&self.column_names(), &self.outer_refs, output);
    }
}

impl QueryRef {
    pub fn column_names(&self) -> Vec<&str> {
        self.col_names.iter().map(|n| n.as_str()).collect()
    }

    pub fn all_columns_refs(&self) -> Vec<Expr> {
        columns_as_refs(&self.alias, &self.column_names())
    }

    pub fn record_outer_ref(&mut self, col: ColExpr) {
        record_outer(&mut self.outer_refs, col);
    }

    pub fn add_outer_refs_to_output(&self, output: &mut Vec<Expr>) {
        add_outer_refs(&self.column_names(), &self.outer_refs, output);
    }
}

impl TableRef {
    /// The alias this source is known by in its scope
    pub fn alias(&self) -> &str {
        match self {
            TableRef::Base(t) => &t.alias,
            TableRef::Query(q) => &q.alias,
            TableRef::File(f) => &f.alias,
        }
    }

    /// Output column names in order
    pub fn column_names(&self) -> Vec<&str> {
        match self {
            TableRef::Base(t) => t.column_names(),
            TableRef::Query(q) => q.column_names(),
            TableRef::File(f) => f.column_names(),
        }
    }

    /// The logical output of this source as an ordered list of column
    /// references
    pub fn all_columns_refs(&self) -> Vec<Expr> {
        columns_as_refs(self.alias(), &self.column_names())
    }

    /// Record an outer reference bound against this source
    pub fn record_outer_ref(&mut self, col: ColExpr) {
        match self {
            TableRef::Base(t) => t.record_outer_ref(col),
            TableRef::Query(q) => q.record_outer_ref(col),
            TableRef::File(f) => f.record_outer_ref(col),
        }
    }
}
