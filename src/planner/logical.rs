//! Logical plan representation
//!
//! Logical plans represent the structure of a query before physical
//! implementation details are decided. Every node carries the same common
//! fields: an optional filter predicate (the join predicate for join nodes),
//! an output expression list that stays empty until ordinal resolution, and
//! the list of owned children. The node kind and its private attributes live
//! in the `LogicOp` tag.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::planner::expr::Expr;
use crate::planner::memo::MemoGroup;
use crate::planner::table_ref::{BaseTableRef, ExternalFileRef, QueryRef};

/// JOIN kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Semi,
    AntiSemi,
    /// Left-preserving join emitting a boolean `#marker` column that is true
    /// iff at least one right row matches
    Mark,
    /// Left-preserving join requiring at most one right match per left row
    Single,
    /// Single join combined with marker semantics
    SingleMark,
}

impl JoinKind {
    /// Joins that emit the `#marker` column
    pub fn is_mark(&self) -> bool {
        matches!(self, JoinKind::Mark | JoinKind::SingleMark)
    }

    pub fn name(&self) -> &'static str {
        match self {
            JoinKind::Inner => "Inner",
            JoinKind::Left => "Left",
            JoinKind::Right => "Right",
            JoinKind::Full => "Full",
            JoinKind::Cross => "Cross",
            JoinKind::Semi => "Semi",
            JoinKind::AntiSemi => "AntiSemi",
            JoinKind::Mark => "Mark",
            JoinKind::Single => "Single",
            JoinKind::SingleMark => "SingleMark",
        }
    }
}

/// Name prefix of the boolean column emitted by mark joins
pub const MARKER_PREFIX: &str = "#marker";

/// Marker column name for the mark join consuming subquery `id`. The id
/// keeps markers distinct when several mark joins stack under one filter.
pub fn marker_name(id: u32) -> String {
    format!("{}@{}", MARKER_PREFIX, id)
}

/// Make the marker column reference for subquery `id`
pub fn marker_col(id: u32) -> Expr {
    Expr::col_unbound(marker_name(id))
}

/// Whether an expression is a bare marker column reference
pub fn is_marker(e: &Expr) -> bool {
    matches!(e, Expr::ColRef(c) if c.tab_name.is_none() && c.col_name.starts_with(MARKER_PREFIX))
}

/// Node kind and kind-specific attributes
#[derive(Debug, Clone, PartialEq)]
pub enum LogicOp {
    /// Base table scan; `filter` holds any WHERE conjuncts pushed into it
    ScanTable { table: BaseTableRef },
    /// External file scan
    ScanFile { file: ExternalFileRef },
    /// Row filter; the predicate lives in the common `filter` field
    Filter,
    /// Join; the predicate lives in the common `filter` field. `marker` is
    /// the subquery id whose marker column this join emits, present only on
    /// mark joins.
    Join {
        kind: JoinKind,
        marker: Option<u32>,
    },
    /// Grouped aggregation. `agg_core` is derived during resolution: the
    /// deduplicated aggregate functions extracted from the output, forming
    /// the executor's aggregate-state vector after the group keys.
    Aggregate {
        group_keys: Vec<Expr>,
        having: Option<Expr>,
        agg_core: Vec<Expr>,
    },
    /// Sort
    Order {
        keys: Vec<Expr>,
        descending: Vec<bool>,
    },
    /// Subquery as a relation; the child is the nested query's plan root
    FromQuery { query: QueryRef },
    /// INSERT target; always the plan root
    Insert {
        table: BaseTableRef,
        columns: Vec<String>,
    },
    /// Emits a single row of literals
    Result,
    /// Opaque reference into an optimizer memo group
    MemoRef { group: Arc<MemoGroup> },
}

/// Logical plan node
#[derive(Debug, Clone)]
pub struct LogicNode {
    pub op: LogicOp,
    /// Filter predicate (join predicate for joins, pushed WHERE for scans)
    pub filter: Option<Expr>,
    /// Output expression list; empty until ordinal resolution
    pub output: Vec<Expr>,
    /// Owned children, left before right for joins
    pub children: Vec<LogicNode>,
}

/// A bound statement: the logical plan plus the select list that ordinal
/// resolution pushes in at the root (the VALUES row for INSERT).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub plan: LogicNode,
    pub select_list: Vec<Expr>,
}

impl LogicNode {
    fn new(op: LogicOp, filter: Option<Expr>, children: Vec<LogicNode>) -> Self {
        LogicNode {
            op,
            filter,
            output: Vec::new(),
            children,
        }
    }

    /// Base table scan leaf
    pub fn scan_table(table: BaseTableRef) -> Self {
        Self::new(LogicOp::ScanTable { table }, None, Vec::new())
    }

    /// External file scan leaf
    pub fn scan_file(file: ExternalFileRef) -> Self {
        Self::new(LogicOp::ScanFile { file }, None, Vec::new())
    }

    /// Filter over a child
    pub fn filter_node(predicate: Expr, child: LogicNode) -> Self {
        Self::new(LogicOp::Filter, Some(predicate), vec![child])
    }

    /// Join of two children
    pub fn join(kind: JoinKind, predicate: Option<Expr>, left: LogicNode, right: LogicNode) -> Self {
        Self::new(
            LogicOp::Join { kind, marker: None },
            predicate,
            vec![left, right],
        )
    }

    /// Mark-flavored join emitting the marker column of subquery `marker`
    pub fn mark_join(
        kind: JoinKind,
        marker: u32,
        predicate: Option<Expr>,
        left: LogicNode,
        right: LogicNode,
    ) -> Self {
        Self::new(
            LogicOp::Join {
                kind,
                marker: Some(marker),
            },
            predicate,
            vec![left, right],
        )
    }

    /// Aggregation over a child
    pub fn aggregate(child: LogicNode, group_keys: Vec<Expr>, having: Option<Expr>) -> Self {
        Self::new(
            LogicOp::Aggregate {
                group_keys,
                having,
                agg_core: Vec::new(),
            },
            None,
            vec![child],
        )
    }

    /// Sort over a child
    pub fn order(child: LogicNode, keys: Vec<Expr>, descending: Vec<bool>) -> Self {
        Self::new(LogicOp::Order { keys, descending }, None, vec![child])
    }

    /// Subquery as a relation
    pub fn from_query(child: LogicNode, query: QueryRef) -> Self {
        Self::new(LogicOp::FromQuery { query }, None, vec![child])
    }

    /// INSERT root
    pub fn insert(table: BaseTableRef, columns: Vec<String>, child: LogicNode) -> Self {
        Self::new(LogicOp::Insert { table, columns }, None, vec![child])
    }

    /// Single-row literal source
    pub fn result() -> Self {
        Self::new(LogicOp::Result, None, Vec::new())
    }

    /// Memo group reference
    pub fn memo_ref(group: Arc<MemoGroup>) -> Self {
        Self::new(LogicOp::MemoRef { group }, None, Vec::new())
    }

    /// Node kind name for diagnostics and printing
    pub fn kind_name(&self) -> &'static str {
        match &self.op {
            LogicOp::ScanTable { .. } => "LogicScanTable",
            LogicOp::ScanFile { .. } => "LogicScanFile",
            LogicOp::Filter => "LogicFilter",
            LogicOp::Join { .. } => "LogicJoin",
            LogicOp::Aggregate { .. } => "LogicAggregate",
            LogicOp::Order { .. } => "LogicOrder",
            LogicOp::FromQuery { .. } => "LogicFromQuery",
            LogicOp::Insert { .. } => "LogicInsert",
            LogicOp::Result => "LogicResult",
            LogicOp::MemoRef { .. } => "LogicMemoRef",
        }
    }

    /// The set of table aliases this subtree produces rows for. A derived
    /// table shadows the relations inside it, so `FromQuery` contributes its
    /// alias and is not descended into.
    pub fn tables(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        match &self.op {
            LogicOp::ScanTable { table } => {
                set.insert(table.alias.clone());
            }
            LogicOp::ScanFile { file } => {
                set.insert(file.alias.clone());
            }
            LogicOp::FromQuery { query } => {
                set.insert(query.alias.clone());
            }
            LogicOp::MemoRef { group } => {
                set.extend(group.canonical().tables());
            }
            _ => {
                for child in &self.children {
                    set.extend(child.tables());
                }
            }
        }
        set
    }

    /// Visit every expression attached to this node (not its children):
    /// filter, output, and kind-specific expression lists.
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        if let Some(p) = &self.filter {
            f(p);
        }
        for e in &self.output {
            f(e);
        }
        match &self.op {
            LogicOp::Aggregate {
                group_keys,
                having,
                agg_core,
            } => {
                group_keys.iter().for_each(&mut *f);
                if let Some(h) = having {
                    f(h);
                }
                agg_core.iter().for_each(&mut *f);
            }
            LogicOp::Order { keys, .. } => keys.iter().for_each(&mut *f),
            _ => {}
        }
    }

    /// Whether this subtree contains any outer reference, including inside
    /// subquery expressions owned by filters or outputs.
    pub fn has_outer_refs(&self) -> bool {
        let mut found = false;
        self.for_each_expr(&mut |e| {
            if e.has_outer_ref() {
                found = true;
            }
        });
        if found {
            return true;
        }
        if let LogicOp::MemoRef { group } = &self.op {
            return group.canonical().has_outer_refs();
        }
        self.children.iter().any(|c| c.has_outer_refs())
    }

    /// Stable signature of the plan shape, used for memo-group equality.
    /// Ignores resolved outputs so that a memo-referenced subtree compares
    /// equal to its materialized counterpart.
    pub fn memo_sign(&self) -> u64 {
        if let LogicOp::MemoRef { group } = &self.op {
            return group.sign();
        }
        let mut h = DefaultHasher::new();
        self.sign_into(&mut h);
        h.finish()
    }

    fn sign_into(&self, h: &mut DefaultHasher) {
        self.kind_name().hash(h);
        match &self.op {
            LogicOp::ScanTable { table } => table.alias.hash(h),
            LogicOp::ScanFile { file } => file.alias.hash(h),
            LogicOp::Join { kind, marker } => {
                kind.name().hash(h);
                marker.hash(h);
            }
            LogicOp::Aggregate { group_keys, .. } => group_keys.hash(h),
            LogicOp::Order { keys, .. } => keys.hash(h),
            LogicOp::FromQuery { query } => query.alias.hash(h),
            LogicOp::Insert { table, .. } => table.name.hash(h),
            _ => {}
        }
        self.filter.hash(h);
        for child in &self.children {
            child.memo_sign().hash(h);
        }
    }
}

impl PartialEq for LogicNode {
    fn eq(&self, other: &Self) -> bool {
        // memo references are transparent to equality via their signature
        let self_memo = matches!(self.op, LogicOp::MemoRef { .. });
        let other_memo = matches!(other.op, LogicOp::MemoRef { .. });
        if self_memo || other_memo {
            return self.memo_sign() == other.memo_sign();
        }
        self.op == other.op
            && self.filter == other.filter
            && self.output == other.output
            && self.children == other.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::planner::expr::Expr;
    use crate::sql::ast::BinOp;

    fn scan(alias: &str) -> LogicNode {
        LogicNode::scan_table(BaseTableRef {
            name: alias.to_string(),
            alias: alias.to_string(),
            columns: vec![("i".to_string(), DataType::Int)],
            outer_refs: Vec::new(),
        })
    }

    #[test]
    fn test_subtree_tables() {
        let join = LogicNode::join(
            JoinKind::Inner,
            Some(Expr::binary(BinOp::Eq, Expr::col("a", "i"), Expr::col("b", "i"))),
            scan("a"),
            scan("b"),
        );
        let tables: Vec<_> = join.tables().into_iter().collect();
        assert_eq!(tables, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_from_query_shadows_inner_tables() {
        let inner = scan("a");
        let node = LogicNode::from_query(
            inner,
            QueryRef {
                alias: "v".to_string(),
                col_names: vec!["i".to_string()],
                select_list: vec![Expr::col("a", "i")],
                outer_refs: Vec::new(),
            },
        );
        let tables: Vec<_> = node.tables().into_iter().collect();
        assert_eq!(tables, vec!["v".to_string()]);
    }

    #[test]
    fn test_has_outer_refs() {
        let mut outer = Expr::col("a", "i");
        if let Expr::ColRef(c) = &mut outer {
            c.outer_ref = true;
        }
        let plain = LogicNode::filter_node(
            Expr::binary(BinOp::Gt, Expr::col("b", "i"), Expr::col("b", "i")),
            scan("b"),
        );
        assert!(!plain.has_outer_refs());

        let correlated = LogicNode::filter_node(
            Expr::binary(BinOp::Eq, Expr::col("b", "i"), outer),
            scan("b"),
        );
        assert!(correlated.has_outer_refs());
    }

    #[test]
    fn test_memo_sign_stable() {
        let a = LogicNode::filter_node(
            Expr::binary(BinOp::Gt, Expr::col("a", "i"), Expr::col("a", "i")),
            scan("a"),
        );
        let b = a.clone();
        assert_eq!(a.memo_sign(), b.memo_sign());
        assert_ne!(a.memo_sign(), scan("b").memo_sign());
    }
}
