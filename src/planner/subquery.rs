//! Subquery-to-join rewriting
//!
//! Rewrites subquery expressions in filters and select lists into join
//! shapes, so the executor can evaluate them as joins instead of re-running
//! the subquery per outer row:
//!
//! - EXISTS / IN in a boolean position becomes a mark join. The left side is
//!   preserved and gains a boolean `#marker` column; the outer predicate is
//!   replaced by a reference to it.
//! - A scalar subquery becomes a single join (a single-mark join under an
//!   IS NULL context), with the subquery's select expression standing in for
//!   the subquery at its use site.
//!
//! In all cases the correlated conjuncts inside the subquery are consumed
//! into the join predicate, their outer flags cleared. Stripping a conjunct
//! from beneath an aggregate appends its local columns to the aggregate's
//! group keys, which keeps the hoisted predicate resolvable against the
//! aggregate's output.
//!
//! The rewrite is local to filter and output expressions: the plan shape
//! above the rewritten filter is preserved, and running the rule twice
//! yields the same plan as running it once.

use tracing::debug;

use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::expr::{and_conjuncts, split_conjuncts, Expr, SubqueryExpr, SubqueryKind};
use crate::planner::logical::{marker_col, BoundStatement, JoinKind, LogicNode, LogicOp};
use crate::planner::optimizer::RewriteRule;
use crate::sql::ast::BinOp;

/// The subquery decorrelation rule
pub struct SubqueryToMarkJoin;

impl RewriteRule for SubqueryToMarkJoin {
    fn name(&self) -> &'static str {
        "subquery_to_markjoin"
    }

    fn apply(&self, mut stmt: BoundStatement) -> PlannerResult<BoundStatement> {
        rewrite_block(&mut stmt.plan, &mut stmt.select_list)?;
        Ok(stmt)
    }
}

/// Rewrite one query block: scalar subqueries in the select list, then
/// subqueries in filters anywhere in the plan.
fn rewrite_block(plan: &mut LogicNode, select_list: &mut [Expr]) -> PlannerResult<()> {
    for e in select_list.iter_mut() {
        while let Some(sq) = find_scalar_subquery(e) {
            debug!(query_id = sq.query_id, "rewriting select-list scalar subquery");
            let kind = if isnull_context(e, &sq) {
                JoinKind::SingleMark
            } else {
                JoinKind::Single
            };
            let value = splice_join(from_slot(plan), sq.clone(), kind, None)?;
            *e = e.search_replace(&Expr::Subquery(sq), &value);
        }
    }
    rewrite_node(plan)
}

fn rewrite_node(node: &mut LogicNode) -> PlannerResult<()> {
    for child in &mut node.children {
        rewrite_node(child)?;
    }

    // a derived table is its own query block with its own select list
    if let LogicOp::FromQuery { query } = &mut node.op {
        let mut select_list = std::mem::take(&mut query.select_list);
        rewrite_block(&mut node.children[0], &mut select_list)?;
        query.select_list = select_list;
        return Ok(());
    }

    if matches!(node.op, LogicOp::Filter) {
        rewrite_filter(node)?;
    }
    Ok(())
}

fn rewrite_filter(node: &mut LogicNode) -> PlannerResult<()> {
    let Some(filter) = node.filter.take() else {
        return Ok(());
    };

    let mut kept = Vec::new();
    for conj in split_conjuncts(&filter) {
        let conj = normalize_not_exists(conj);
        match &conj {
            Expr::Subquery(s) if matches!(s.kind, SubqueryKind::Exists { .. }) => {
                let negated = matches!(s.kind, SubqueryKind::Exists { negated: true });
                debug!(query_id = s.query_id, negated, "rewriting EXISTS to mark join");
                let marker = marker_col(s.query_id);
                splice_join(&mut node.children[0], s.clone(), JoinKind::Mark, None)?;
                kept.push(if negated { Expr::not(marker) } else { marker });
            }
            Expr::Subquery(s) if matches!(s.kind, SubqueryKind::In { .. }) => {
                let negated = matches!(s.kind, SubqueryKind::In { negated: true });
                debug!(query_id = s.query_id, negated, "rewriting IN to mark join");
                let lhs = s.lhs.as_deref().cloned().ok_or_else(|| {
                    PlannerError::InvalidProgram(format!(
                        "IN subquery @{} has no left-hand side",
                        s.query_id
                    ))
                })?;
                let marker = marker_col(s.query_id);
                splice_join(&mut node.children[0], s.clone(), JoinKind::Mark, Some(lhs))?;
                kept.push(if negated { Expr::not(marker) } else { marker });
            }
            _ if conj.contains_subquery() => {
                let mut rewritten = conj.clone();
                while let Some(sq) = find_scalar_subquery(&rewritten) {
                    let kind = if isnull_context(&rewritten, &sq) {
                        JoinKind::SingleMark
                    } else {
                        JoinKind::Single
                    };
                    debug!(query_id = sq.query_id, "rewriting scalar subquery to single join");
                    let value = splice_join(&mut node.children[0], sq.clone(), kind, None)?;
                    rewritten = rewritten.search_replace(&Expr::Subquery(sq), &value);
                }
                kept.push(rewritten);
            }
            _ => kept.push(conj),
        }
    }
    node.filter = and_conjuncts(kept);
    Ok(())
}

/// `not(EXISTS ...)` folds into the negated EXISTS form
fn normalize_not_exists(conj: Expr) -> Expr {
    if let Expr::Func(f) = &conj {
        if f.name == "not" && f.args.len() == 1 {
            if let Expr::Subquery(s) = &f.args[0] {
                if let SubqueryKind::Exists { negated } = s.kind {
                    let mut s = s.clone();
                    s.kind = SubqueryKind::Exists { negated: !negated };
                    return Expr::Subquery(s);
                }
            }
        }
    }
    conj
}

/// Replace `slot` with `join(kind, predicate, slot, subquery plan)`. The
/// join predicate is built from the subquery's correlated conjuncts (outer
/// flags cleared) and, for IN, the lhs-equals-select-column equality.
/// Returns the expression that stands in for the subquery's value.
fn splice_join(
    slot: &mut LogicNode,
    sq: SubqueryExpr,
    kind: JoinKind,
    in_lhs: Option<Expr>,
) -> PlannerResult<Expr> {
    if !matches!(sq.kind, SubqueryKind::Exists { .. }) && sq.select_list.len() != 1 {
        return Err(PlannerError::SemanticAnalyze(format!(
            "subquery @{} must return exactly one column, got {}",
            sq.query_id,
            sq.select_list.len()
        )));
    }

    let mut sub = *sq.plan;
    let mut sub_select = sq.select_list;
    rewrite_block(&mut sub, &mut sub_select)?;

    let mut conjuncts = strip_correlated(&mut sub);
    for c in &mut conjuncts {
        c.clear_outer_refs();
    }
    if let Some(lhs) = in_lhs {
        conjuncts.insert(
            0,
            Expr::binary(BinOp::Eq, lhs, sub_select[0].clone()),
        );
    }
    let predicate = and_conjuncts(conjuncts).unwrap_or_else(|| Expr::boolean(true));

    let left = std::mem::replace(slot, LogicNode::result());
    *slot = if kind.is_mark() {
        LogicNode::mark_join(kind, sq.query_id, Some(predicate), left, sub)
    } else {
        LogicNode::join(kind, Some(predicate), left, sub)
    };

    Ok(sub_select
        .first()
        .cloned()
        .unwrap_or_else(|| Expr::boolean(true)))
}

/// Remove correlated conjuncts from the subquery plan's filters, collecting
/// them for the enclosing join predicate. Passing collected conjuncts up
/// through an aggregate appends their local columns to its group keys.
/// Filters left without a predicate dissolve into their child.
fn strip_correlated(node: &mut LogicNode) -> Vec<Expr> {
    // a derived table is a separate block; correlation through it keeps the
    // per-row evaluation path
    if matches!(node.op, LogicOp::FromQuery { .. }) {
        return Vec::new();
    }

    let mut collected = Vec::new();
    for child in &mut node.children {
        collected.extend(strip_correlated(child));
    }

    if let LogicOp::Aggregate { group_keys, .. } = &mut node.op {
        for conj in &collected {
            for c in conj.col_refs() {
                if !c.outer_ref {
                    let key = Expr::ColRef(c.clone());
                    if !group_keys.contains(&key) {
                        group_keys.push(key);
                    }
                }
            }
        }
    }

    if let Some(f) = node.filter.take() {
        let (corr, keep): (Vec<_>, Vec<_>) = split_conjuncts(&f)
            .into_iter()
            .partition(|c| c.has_shallow_outer_ref());
        node.filter = and_conjuncts(keep);
        collected.extend(corr);
    }

    if matches!(node.op, LogicOp::Filter) && node.filter.is_none() && node.children.len() == 1 {
        let child = node.children.remove(0);
        *node = child;
    }

    collected
}

/// Descend through the operators stacked above the FROM subtree; the
/// returned slot is where a select-list subquery join attaches.
fn from_slot(node: &mut LogicNode) -> &mut LogicNode {
    if matches!(
        node.op,
        LogicOp::Order { .. } | LogicOp::Aggregate { .. } | LogicOp::Filter | LogicOp::Insert { .. }
    ) {
        from_slot(&mut node.children[0])
    } else {
        node
    }
}

fn find_scalar_subquery(e: &Expr) -> Option<SubqueryExpr> {
    let mut found = None;
    e.visit(&mut |x| {
        if found.is_none() {
            if let Expr::Subquery(s) = x {
                if s.kind == SubqueryKind::Scalar {
                    found = Some(s.clone());
                }
            }
        }
    });
    found
}

/// Whether the subquery's value feeds an IS NULL test within `e`
fn isnull_context(e: &Expr, sq: &SubqueryExpr) -> bool {
    let target = Expr::Subquery(sq.clone());
    let mut found = false;
    e.visit(&mut |x| {
        if let Expr::Func(f) = x {
            if f.name == "isnull" && f.args.iter().any(|a| a.any(false, &|y| y == &target)) {
                found = true;
            }
        }
    });
    found
}
