//! Rewrite rules
//!
//! Rules that transform bound logical plans before ordinal resolution.

use std::collections::BTreeSet;

use crate::planner::error::PlannerResult;
use crate::planner::expr::{and_conjuncts, split_conjuncts, Expr};
use crate::planner::logical::{BoundStatement, JoinKind, LogicNode, LogicOp};
use crate::sql::ast::BinOp;

/// Rewrite rule trait
pub trait RewriteRule {
    /// Rule name for diagnostics
    fn name(&self) -> &'static str;

    /// Apply the rule to a bound statement
    fn apply(&self, stmt: BoundStatement) -> PlannerResult<BoundStatement>;
}

/// Merge consecutive filter nodes
pub struct FilterMerge;

impl RewriteRule for FilterMerge {
    fn name(&self) -> &'static str {
        "filter_merge"
    }

    fn apply(&self, mut stmt: BoundStatement) -> PlannerResult<BoundStatement> {
        stmt.plan = merge(stmt.plan);
        Ok(stmt)
    }
}

fn merge(mut node: LogicNode) -> LogicNode {
    node.children = node.children.into_iter().map(merge).collect();

    if matches!(node.op, LogicOp::Filter)
        && !node.children.is_empty()
        && matches!(node.children[0].op, LogicOp::Filter)
    {
        let mut child = node.children.remove(0);
        child.filter = match (child.filter.take(), node.filter.take()) {
            (Some(inner), Some(outer)) => Some(Expr::binary(BinOp::And, inner, outer)),
            (inner, outer) => inner.or(outer),
        };
        return child;
    }
    node
}

/// Push filter conjuncts down the plan tree: table-local conjuncts merge into
/// the scan they belong to, conjuncts spanning both sides of an inner join
/// are absorbed into the join predicate (turning a cross join into an inner
/// join). Conjuncts whose column leaves cannot all be attributed to a table
/// (marker references, literals, subqueries) stay where they are.
pub struct PredicatePushdown;

impl RewriteRule for PredicatePushdown {
    fn name(&self) -> &'static str {
        "predicate_pushdown"
    }

    fn apply(&self, mut stmt: BoundStatement) -> PlannerResult<BoundStatement> {
        stmt.plan = pushdown(stmt.plan);
        Ok(stmt)
    }
}

fn pushdown(mut node: LogicNode) -> LogicNode {
    node.children = node.children.into_iter().map(pushdown).collect();

    match &node.op {
        LogicOp::Filter => {
            let Some(f) = node.filter.take() else {
                return node;
            };
            let mut kept = Vec::new();
            for conj in split_conjuncts(&f) {
                if !try_push(&mut node.children[0], &conj) {
                    kept.push(conj);
                }
            }
            match and_conjuncts(kept) {
                Some(p) => {
                    node.filter = Some(p);
                    node
                }
                // everything moved below: the filter node dissolves
                None => node.children.remove(0),
            }
        }
        LogicOp::Join {
            kind: JoinKind::Inner | JoinKind::Cross,
            ..
        } => {
            if let Some(p) = node.filter.take() {
                let mut kept = Vec::new();
                for conj in split_conjuncts(&p) {
                    let pushed = match pushable_tables(&conj) {
                        Some(tabs) if !tabs.is_empty() => {
                            if tabs.is_subset(&node.children[0].tables()) {
                                try_push(&mut node.children[0], &conj)
                            } else if tabs.is_subset(&node.children[1].tables()) {
                                try_push(&mut node.children[1], &conj)
                            } else {
                                false
                            }
                        }
                        _ => false,
                    };
                    if !pushed {
                        kept.push(conj);
                    }
                }
                node.filter = and_conjuncts(kept);
            }
            node
        }
        _ => node,
    }
}

/// The tables a conjunct can be attributed to, or None when it cannot move
/// (unattributable column leaves or an embedded subquery).
fn pushable_tables(conj: &Expr) -> Option<BTreeSet<String>> {
    if conj.contains_subquery() {
        return None;
    }
    let mut set = BTreeSet::new();
    for c in conj.col_refs() {
        if c.outer_ref {
            continue;
        }
        match &c.tab_name {
            Some(t) => {
                set.insert(t.clone());
            }
            None => return None,
        }
    }
    Some(set)
}

fn and_into(slot: &mut Option<Expr>, conj: Expr) {
    *slot = Some(match slot.take() {
        Some(existing) => Expr::binary(BinOp::And, existing, conj),
        None => conj,
    });
}

fn try_push(node: &mut LogicNode, conj: &Expr) -> bool {
    let Some(tabs) = pushable_tables(conj) else {
        return false;
    };
    if tabs.is_empty() {
        return false;
    }

    match &mut node.op {
        LogicOp::ScanTable { table } if tabs.iter().all(|t| *t == table.alias) => {
            and_into(&mut node.filter, conj.clone());
            true
        }
        LogicOp::ScanFile { file } if tabs.iter().all(|t| *t == file.alias) => {
            and_into(&mut node.filter, conj.clone());
            true
        }
        LogicOp::Join { kind, .. } => {
            // pushing below a join is only sound into a preserved side
            let left_ok = !matches!(kind, JoinKind::Right | JoinKind::Full);
            let right_ok = matches!(kind, JoinKind::Inner | JoinKind::Cross);
            let left_tables = node.children[0].tables();
            let right_tables = node.children[1].tables();

            if left_ok && tabs.is_subset(&left_tables) {
                return try_push(&mut node.children[0], conj);
            }
            if right_ok && tabs.is_subset(&right_tables) {
                return try_push(&mut node.children[1], conj);
            }
            if matches!(kind, JoinKind::Inner | JoinKind::Cross)
                && tabs.is_subset(&(&left_tables | &right_tables))
            {
                and_into(&mut node.filter, conj.clone());
                *kind = JoinKind::Inner;
                return true;
            }
            false
        }
        LogicOp::Filter => {
            if try_push(&mut node.children[0], conj) {
                true
            } else {
                and_into(&mut node.filter, conj.clone());
                true
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::planner::table_ref::BaseTableRef;
    use crate::sql::ast::Literal;

    fn scan(alias: &str, cols: &[&str]) -> LogicNode {
        LogicNode::scan_table(BaseTableRef {
            name: alias.to_string(),
            alias: alias.to_string(),
            columns: cols
                .iter()
                .map(|c| (c.to_string(), DataType::Int))
                .collect(),
            outer_refs: Vec::new(),
        })
    }

    fn gt(tab: &str, col: &str, v: i64) -> Expr {
        Expr::binary(
            BinOp::Gt,
            Expr::col(tab, col),
            Expr::literal(Literal::Integer(v), DataType::BigInt),
        )
    }

    fn stmt(plan: LogicNode, select_list: Vec<Expr>) -> BoundStatement {
        BoundStatement { plan, select_list }
    }

    #[test]
    fn test_filter_merge_combines_predicates() {
        let plan = LogicNode::filter_node(
            gt("a", "i", 1),
            LogicNode::filter_node(gt("a", "j", 2), scan("a", &["i", "j"])),
        );
        let merged = FilterMerge
            .apply(stmt(plan, vec![Expr::col("a", "i")]))
            .unwrap()
            .plan;

        assert!(matches!(merged.op, LogicOp::Filter));
        assert!(matches!(merged.children[0].op, LogicOp::ScanTable { .. }));
        match merged.filter.as_ref().unwrap() {
            Expr::Binary(b) => assert_eq!(b.op, BinOp::And),
            _ => panic!("Expected AND"),
        }
    }

    #[test]
    fn test_pushdown_into_scan_dissolves_filter() {
        let plan = LogicNode::filter_node(gt("a", "i", 1), scan("a", &["i"]));
        let pushed = PredicatePushdown
            .apply(stmt(plan, vec![Expr::col("a", "i")]))
            .unwrap()
            .plan;

        match pushed.op {
            LogicOp::ScanTable { .. } => assert!(pushed.filter.is_some()),
            _ => panic!("Expected scan with pushed filter"),
        }
    }

    #[test]
    fn test_pushdown_absorbs_join_spanning_conjunct() {
        let cross = LogicNode::join(JoinKind::Cross, None, scan("a", &["i"]), scan("b", &["j"]));
        let plan = LogicNode::filter_node(
            Expr::binary(BinOp::Eq, Expr::col("a", "i"), Expr::col("b", "j")),
            cross,
        );
        let pushed = PredicatePushdown
            .apply(stmt(plan, vec![Expr::col("a", "i")]))
            .unwrap()
            .plan;

        match &pushed.op {
            LogicOp::Join { kind, .. } => {
                assert_eq!(*kind, JoinKind::Inner);
                assert!(pushed.filter.is_some());
            }
            other => panic!("Expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_pushdown_keeps_unattributable_conjuncts() {
        use crate::planner::logical::marker_col;

        let mark = LogicNode::mark_join(
            JoinKind::Mark,
            0,
            Some(Expr::binary(BinOp::Eq, Expr::col("b", "j"), Expr::col("a", "i"))),
            scan("a", &["i"]),
            scan("b", &["j"]),
        );
        let plan = LogicNode::filter_node(
            Expr::binary(BinOp::And, gt("a", "i", 1), marker_col(0)),
            mark,
        );
        let pushed = PredicatePushdown
            .apply(stmt(plan, vec![Expr::col("a", "i")]))
            .unwrap()
            .plan;

        // the table-local conjunct moved through the mark join into the scan,
        // the marker reference stayed in the filter
        assert!(matches!(pushed.op, LogicOp::Filter));
        assert!(crate::planner::logical::is_marker(
            pushed.filter.as_ref().unwrap()
        ));
        let join = &pushed.children[0];
        assert!(join.children[0].filter.is_some());
    }
}
