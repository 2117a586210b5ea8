//! Name binding against the catalog
//!
//! The binder takes parsed statements and resolves table and column names,
//! producing a logical plan tree whose expressions are in the planner
//! algebra. Scopes form a stack: a name that does not bind in the current
//! query block is searched in the enclosing blocks, and a hit there becomes
//! an outer reference, recorded on the producing table reference so that
//! resolution keeps the column alive across the boundary.
//!
//! Binding stops at names and shapes; positional wiring is the ordinal
//! resolution pass, and aggregate/grouping validation beyond nesting checks
//! happens there as well.

use crate::catalog::{Catalog, DataType, TableSource};
use crate::planner::expr::{AggExpr, AggKind, ColExpr, Expr, SubqueryExpr, SubqueryKind};
use crate::planner::logical::{BoundStatement, JoinKind, LogicNode};
use crate::planner::table_ref::{BaseTableRef, ExternalFileRef, QueryRef, TableRef};
use crate::sql::ast;
use crate::sql::error::{SqlError, SqlResult};

/// Name binder
pub struct Binder<'a> {
    catalog: &'a Catalog,
    scopes: Vec<Scope>,
    next_query_id: u32,
}

struct Scope {
    entries: Vec<ScopeEntry>,
    used_outer: bool,
}

struct ScopeEntry {
    tref: TableRef,
    derived_plan: Option<LogicNode>,
    join_kind: JoinKind,
}

/// One bound query block
struct BoundSelect {
    plan: LogicNode,
    select_list: Vec<Expr>,
    col_names: Vec<String>,
    used_outer: bool,
}

impl<'a> Binder<'a> {
    /// Create a binder over a catalog
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            scopes: Vec::new(),
            next_query_id: 0,
        }
    }

    /// Bind a statement
    pub fn bind(&mut self, stmt: ast::Statement) -> SqlResult<BoundStatement> {
        match stmt {
            ast::Statement::Select(sel) => {
                let bound = self.bind_select(&sel)?;
                Ok(BoundStatement {
                    plan: bound.plan,
                    select_list: bound.select_list,
                })
            }
            ast::Statement::Insert {
                table,
                columns,
                source,
            } => self.bind_insert(&table, columns, source),
        }
    }

    fn bind_select(&mut self, sel: &ast::SelectStatement) -> SqlResult<BoundSelect> {
        let depth = self.scopes.len();
        self.scopes.push(Scope {
            entries: Vec::new(),
            used_outer: false,
        });
        let result = self.bind_select_inner(sel);
        // the scope is popped inside bind_select_inner on success; unwind
        // whatever a failed binding left behind
        if result.is_err() {
            self.scopes.truncate(depth);
        }
        result
    }

    fn bind_select_inner(&mut self, sel: &ast::SelectStatement) -> SqlResult<BoundSelect> {
        // pass 1: register every FROM source so later names see them all
        for factor in &sel.from {
            self.add_factor(factor, JoinKind::Cross)?;
        }
        for join in &sel.joins {
            self.add_factor(&join.factor, convert_join_kind(join.join_type))?;
        }

        // pass 2: bind expressions against the complete scope
        let from_len = sel.from.len();
        let mut conditions: Vec<Option<Expr>> = vec![None; from_len];
        for join in &sel.joins {
            let cond = join
                .condition
                .as_ref()
                .map(|c| self.bind_expr(c))
                .transpose()?;
            conditions.push(cond);
        }

        let filter = sel.filter.as_ref().map(|f| self.bind_expr(f)).transpose()?;
        if let Some(f) = &filter {
            if f.contains_agg() {
                return Err(SqlError::InvalidOperation(
                    "aggregate function in WHERE clause".to_string(),
                ));
            }
        }

        let mut group_by = Vec::new();
        for g in &sel.group_by {
            let key = self.bind_expr(g)?;
            if key.contains_agg() {
                return Err(SqlError::InvalidOperation(
                    "aggregate function in GROUP BY clause".to_string(),
                ));
            }
            group_by.push(key);
        }

        let (select_list, col_names) = self.bind_select_items(&sel.columns)?;

        let having = sel.having.as_ref().map(|h| self.bind_expr(h)).transpose()?;

        let mut order_keys = Vec::new();
        let mut descending = Vec::new();
        for item in &sel.order_by {
            order_keys.push(self.bind_expr(&item.expr)?);
            descending.push(!item.ascending);
        }

        // harvest the scope (outer-reference bookkeeping included) and
        // assemble the plan bottom-up
        let scope = self.scopes.pop().expect("scope pushed in bind_select");
        let used_outer = scope.used_outer;

        let mut plan: Option<LogicNode> = None;
        for (entry, condition) in scope.entries.into_iter().zip(conditions) {
            let node = match (entry.tref, entry.derived_plan) {
                (TableRef::Base(t), None) => LogicNode::scan_table(t),
                (TableRef::File(f), None) => LogicNode::scan_file(f),
                (TableRef::Query(q), Some(child)) => LogicNode::from_query(child, q),
                _ => {
                    return Err(SqlError::InvalidOperation(
                        "derived table without a plan".to_string(),
                    ))
                }
            };
            plan = Some(match plan {
                None => node,
                Some(acc) => LogicNode::join(entry.join_kind, condition, acc, node),
            });
        }
        // no FROM clause: a single literal row
        let mut plan = plan.unwrap_or_else(LogicNode::result);

        if let Some(f) = filter {
            plan = LogicNode::filter_node(f, plan);
        }

        let has_aggs = select_list.iter().any(|e| e.contains_agg())
            || having.as_ref().map(|h| h.contains_agg()).unwrap_or(false);
        if !group_by.is_empty() || has_aggs {
            plan = LogicNode::aggregate(plan, group_by, having);
        } else if having.is_some() {
            return Err(SqlError::InvalidOperation(
                "HAVING requires aggregation".to_string(),
            ));
        }

        if !order_keys.is_empty() {
            plan = LogicNode::order(plan, order_keys, descending);
        }

        Ok(BoundSelect {
            plan,
            select_list,
            col_names,
            used_outer,
        })
    }

    fn bind_select_items(
        &mut self,
        items: &[ast::SelectItem],
    ) -> SqlResult<(Vec<Expr>, Vec<String>)> {
        let mut select_list = Vec::new();
        let mut col_names = Vec::new();

        for (idx, item) in items.iter().enumerate() {
            match item {
                ast::SelectItem::Wildcard => {
                    let scope = self.scopes.last().expect("scope in select binding");
                    for entry in &scope.entries {
                        let alias = entry.tref.alias().to_string();
                        for name in entry.tref.column_names() {
                            select_list.push(Expr::col(alias.clone(), name));
                            col_names.push(name.to_string());
                        }
                    }
                }
                ast::SelectItem::QualifiedWildcard(table) => {
                    let scope = self.scopes.last().expect("scope in select binding");
                    let entry = scope
                        .entries
                        .iter()
                        .find(|e| e.tref.alias() == table)
                        .ok_or_else(|| SqlError::TableNotFound(table.clone()))?;
                    let alias = entry.tref.alias().to_string();
                    for name in entry.tref.column_names() {
                        select_list.push(Expr::col(alias.clone(), name));
                        col_names.push(name.to_string());
                    }
                }
                ast::SelectItem::Expr { expr, alias } => {
                    let bound = self.bind_expr(expr)?;
                    let name = alias.clone().unwrap_or_else(|| expr_name(&bound, idx));
                    select_list.push(bound);
                    col_names.push(name);
                }
            }
        }
        Ok((select_list, col_names))
    }

    fn add_factor(&mut self, factor: &ast::TableFactor, join_kind: JoinKind) -> SqlResult<()> {
        let (alias, tref, derived_plan) = match factor {
            ast::TableFactor::Table { name, alias } => {
                let alias = alias.clone().unwrap_or_else(|| name.clone());
                let tdef = self
                    .catalog
                    .get_table(name)
                    .ok_or_else(|| SqlError::TableNotFound(name.clone()))?;
                let columns: Vec<(String, DataType)> = tdef
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.data_type.clone()))
                    .collect();
                let tref = match &tdef.source {
                    TableSource::Base => TableRef::Base(BaseTableRef {
                        name: name.clone(),
                        alias: alias.clone(),
                        columns,
                        outer_refs: Vec::new(),
                    }),
                    TableSource::External { path } => TableRef::File(ExternalFileRef {
                        path: path.clone(),
                        alias: alias.clone(),
                        columns,
                        outer_refs: Vec::new(),
                    }),
                };
                (alias, tref, None)
            }
            ast::TableFactor::Derived { query, alias } => {
                let bound = self.bind_select(query)?;
                let tref = TableRef::Query(QueryRef {
                    alias: alias.clone(),
                    col_names: bound.col_names,
                    select_list: bound.select_list,
                    outer_refs: Vec::new(),
                });
                (alias.clone(), tref, Some(bound.plan))
            }
        };

        let scope = self.scopes.last_mut().expect("scope in FROM binding");
        if scope.entries.iter().any(|e| e.tref.alias() == alias) {
            return Err(SqlError::InvalidOperation(format!(
                "duplicate table alias '{}'",
                alias
            )));
        }
        scope.entries.push(ScopeEntry {
            tref,
            derived_plan,
            join_kind,
        });
        Ok(())
    }

    fn bind_expr(&mut self, expr: &ast::Expr) -> SqlResult<Expr> {
        match expr {
            ast::Expr::Column { table, name } => self.resolve_column(table.as_deref(), name),
            ast::Expr::Literal(lit) => Ok(Expr::literal(lit.clone(), literal_type(lit))),
            ast::Expr::Binary { left, op, right } => Ok(Expr::binary(
                *op,
                self.bind_expr(left)?,
                self.bind_expr(right)?,
            )),
            ast::Expr::Unary { op, expr } => {
                let bound = self.bind_expr(expr)?;
                match op {
                    ast::UnaryOp::Not => Ok(Expr::not(bound)),
                    ast::UnaryOp::Neg => Ok(Expr::func("neg", vec![bound])),
                }
            }
            ast::Expr::Function { name, args } => self.bind_function(name, args),
            ast::Expr::IsNull { expr, negated } => {
                let isnull = Expr::func("isnull", vec![self.bind_expr(expr)?]);
                Ok(if *negated { Expr::not(isnull) } else { isnull })
            }
            ast::Expr::Exists { query, negated } => {
                self.bind_subquery(query, SubqueryKind::Exists { negated: *negated }, None)
            }
            ast::Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let lhs = self.bind_expr(expr)?;
                self.bind_subquery(query, SubqueryKind::In { negated: *negated }, Some(lhs))
            }
            ast::Expr::ScalarSubquery(query) => {
                self.bind_subquery(query, SubqueryKind::Scalar, None)
            }
            ast::Expr::Wildcard => Err(SqlError::InvalidOperation(
                "* is only valid inside count(*)".to_string(),
            )),
        }
    }

    fn bind_function(&mut self, name: &str, args: &[ast::Expr]) -> SqlResult<Expr> {
        let agg_kind = match name {
            "count" => Some(AggKind::Count),
            "sum" => Some(AggKind::Sum),
            "min" => Some(AggKind::Min),
            "max" => Some(AggKind::Max),
            "avg" => Some(AggKind::Avg),
            _ => None,
        };

        if let Some(kind) = agg_kind {
            if kind == AggKind::Count && matches!(args, [ast::Expr::Wildcard]) {
                return Ok(Expr::Agg(AggExpr { kind, arg: None }));
            }
            if args.len() != 1 {
                return Err(SqlError::InvalidOperation(format!(
                    "{} takes exactly one argument",
                    name
                )));
            }
            let arg = self.bind_expr(&args[0])?;
            if arg.contains_agg() {
                return Err(SqlError::InvalidOperation(
                    "nested aggregate function".to_string(),
                ));
            }
            return Ok(Expr::Agg(AggExpr {
                kind,
                arg: Some(Box::new(arg)),
            }));
        }

        let bound = args
            .iter()
            .map(|a| self.bind_expr(a))
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(Expr::func(name, bound))
    }

    fn bind_subquery(
        &mut self,
        query: &ast::SelectStatement,
        kind: SubqueryKind,
        lhs: Option<Expr>,
    ) -> SqlResult<Expr> {
        let bound = self.bind_select(query)?;
        let query_id = self.next_query_id;
        self.next_query_id += 1;
        Ok(Expr::Subquery(SubqueryExpr {
            kind,
            lhs: lhs.map(Box::new),
            plan: Box::new(bound.plan),
            select_list: bound.select_list,
            query_id,
            correlated: bound.used_outer,
            physic: None,
        }))
    }

    fn resolve_column(&mut self, table: Option<&str>, name: &str) -> SqlResult<Expr> {
        let top = self.scopes.len() - 1;
        let mut found: Option<(usize, usize, String)> = None;
        let mut saw_table = false;

        'scopes: for depth in (0..self.scopes.len()).rev() {
            let scope = &self.scopes[depth];
            match table {
                Some(t) => {
                    if let Some(idx) = scope.entries.iter().position(|e| e.tref.alias() == t) {
                        saw_table = true;
                        if scope.entries[idx]
                            .tref
                            .column_names()
                            .iter()
                            .any(|n| *n == name)
                        {
                            found = Some((depth, idx, t.to_string()));
                        }
                        break 'scopes;
                    }
                }
                None => {
                    let mut hits = scope.entries.iter().enumerate().filter_map(|(i, e)| {
                        e.tref
                            .column_names()
                            .iter()
                            .any(|n| *n == name)
                            .then_some(i)
                    });
                    if let Some(first) = hits.next() {
                        if hits.next().is_some() {
                            return Err(SqlError::AmbiguousColumn(name.to_string()));
                        }
                        let alias = scope.entries[first].tref.alias().to_string();
                        found = Some((depth, first, alias));
                        break 'scopes;
                    }
                }
            }
        }

        let Some((depth, idx, alias)) = found else {
            return match table {
                Some(t) if !saw_table => Err(SqlError::TableNotFound(t.to_string())),
                _ => Err(SqlError::ColumnNotFound(name.to_string())),
            };
        };

        let outer_ref = depth < top;
        let col = ColExpr {
            tab_name: Some(alias),
            col_name: name.to_string(),
            outer_ref,
            ordinal: -1,
        };
        if outer_ref {
            self.scopes[depth].entries[idx].tref.record_outer_ref(col.clone());
            self.scopes[top].used_outer = true;
        }
        Ok(Expr::ColRef(col))
    }

    fn bind_insert(
        &mut self,
        table: &str,
        columns: Vec<String>,
        source: ast::InsertSource,
    ) -> SqlResult<BoundStatement> {
        let tdef = self
            .catalog
            .get_table(table)
            .ok_or_else(|| SqlError::TableNotFound(table.to_string()))?;
        if !matches!(tdef.source, TableSource::Base) {
            return Err(SqlError::InvalidOperation(format!(
                "cannot insert into external table '{}'",
                table
            )));
        }

        let target_cols = if columns.is_empty() {
            tdef.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            for c in &columns {
                if tdef.get_column(c).is_none() {
                    return Err(SqlError::ColumnNotFound(c.clone()));
                }
            }
            columns
        };

        let tref = BaseTableRef {
            name: table.to_string(),
            alias: table.to_string(),
            columns: tdef
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.data_type.clone()))
                .collect(),
            outer_refs: Vec::new(),
        };

        let (child, select_list) = match source {
            ast::InsertSource::Values(row) => {
                if row.len() != target_cols.len() {
                    return Err(SqlError::InvalidOperation(format!(
                        "INSERT has {} columns but {} values",
                        target_cols.len(),
                        row.len()
                    )));
                }
                // literal rows bind in an empty scope: column references
                // have nothing to bind against and fail naturally
                self.scopes.push(Scope {
                    entries: Vec::new(),
                    used_outer: false,
                });
                let bound = row
                    .iter()
                    .map(|e| self.bind_expr(e))
                    .collect::<SqlResult<Vec<_>>>();
                self.scopes.pop();
                (LogicNode::result(), bound?)
            }
            ast::InsertSource::Query(sel) => {
                let bound = self.bind_select(&sel)?;
                if bound.select_list.len() != target_cols.len() {
                    return Err(SqlError::InvalidOperation(format!(
                        "INSERT has {} columns but the query produces {}",
                        target_cols.len(),
                        bound.select_list.len()
                    )));
                }
                (bound.plan, bound.select_list)
            }
        };

        Ok(BoundStatement {
            plan: LogicNode::insert(tref, target_cols, child),
            select_list,
        })
    }
}

fn convert_join_kind(t: ast::JoinType) -> JoinKind {
    match t {
        ast::JoinType::Inner => JoinKind::Inner,
        ast::JoinType::Left => JoinKind::Left,
        ast::JoinType::Right => JoinKind::Right,
        ast::JoinType::Full => JoinKind::Full,
        ast::JoinType::Cross => JoinKind::Cross,
    }
}

fn literal_type(lit: &ast::Literal) -> DataType {
    match lit {
        ast::Literal::Null => DataType::Int, // NULL is polymorphic
        ast::Literal::Boolean(_) => DataType::Boolean,
        ast::Literal::Integer(_) => DataType::BigInt,
        ast::Literal::Float(_) => DataType::Double,
        ast::Literal::String(_) => DataType::Text,
        ast::Literal::Interval { .. } => DataType::Interval,
    }
}

/// Generate an output name for an unaliased select expression
fn expr_name(e: &Expr, idx: usize) -> String {
    match e {
        Expr::ColRef(c) => c.col_name.clone(),
        Expr::Agg(a) => a.kind.name().to_string(),
        Expr::Func(f) => f.name.clone(),
        _ => format!("expr_{}", idx),
    }
}
