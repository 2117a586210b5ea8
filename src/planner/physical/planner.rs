//! Physical planner
//!
//! Converts resolved logical plans into physical (execution-ready) plans in
//! a single post-order walk. Join strategy selection: a hash join is emitted
//! iff the join predicate is hashable (a single equality whose sides
//! partition cleanly across the join inputs) and the left subtree is free of
//! outer references; everything else falls back to nested loop join.
//! Subquery expressions surviving in filters or outputs get their plans
//! translated recursively for per-outer-row evaluation.

use std::collections::BTreeSet;

use tracing::debug;

use crate::planner::cost::CostEstimator;
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::expr::Expr;
use crate::planner::logical::{JoinKind, LogicNode, LogicOp};
use crate::planner::physical::{PhysicKind, PhysicNode};
use crate::planner::PlannerOptions;
use crate::sql::ast::BinOp;

/// Physical planner - converts logical plans to physical plans
pub struct PhysicalPlanner;

impl PhysicalPlanner {
    /// Convert a resolved logical plan to a physical plan
    pub fn plan(logic: LogicNode, options: &PlannerOptions) -> PlannerResult<PhysicNode> {
        Self::plan_node(logic, options)
    }

    fn plan_node(mut logic: LogicNode, options: &PlannerOptions) -> PlannerResult<PhysicNode> {
        // a memo reference is followed to its group's canonical member
        if let LogicOp::MemoRef { group } = &logic.op {
            return Self::plan_node(group.canonical().clone(), options);
        }

        // subqueries left in expressions are translated for per-row evaluation
        if let Some(f) = &mut logic.filter {
            translate_subqueries(f, options)?;
        }
        for e in &mut logic.output {
            translate_subqueries(e, options)?;
        }
        if let LogicOp::Aggregate { having, .. } = &mut logic.op {
            if let Some(h) = having {
                translate_subqueries(h, options)?;
            }
        }

        let kind = match &logic.op {
            LogicOp::ScanTable { .. } => PhysicKind::ScanTable,
            LogicOp::ScanFile { .. } => PhysicKind::ScanFile,
            LogicOp::Filter => PhysicKind::Filter,
            LogicOp::Result => PhysicKind::Result,
            LogicOp::FromQuery { .. } => PhysicKind::FromQuery,
            LogicOp::Aggregate { .. } => PhysicKind::HashAgg,
            LogicOp::Order { .. } => PhysicKind::Order,
            LogicOp::Insert { .. } => PhysicKind::Insert,
            LogicOp::Join { kind, .. } => Self::join_strategy(*kind, &logic, options)?,
            LogicOp::MemoRef { .. } => unreachable!("followed above"),
        };

        let children = std::mem::take(&mut logic.children)
            .into_iter()
            .map(|c| Self::plan_node(c, options))
            .collect::<PlannerResult<Vec<_>>>()?;

        let cost = CostEstimator::node_cost(&kind, logic.filter.is_some(), &children);
        let node = PhysicNode {
            kind,
            logic: Some(logic),
            children,
            cost: cost.clone(),
            profile: None,
        };

        if options.profiling_enabled {
            Ok(PhysicNode {
                kind: PhysicKind::Profiling,
                logic: None,
                children: vec![node],
                cost,
                profile: None,
            })
        } else {
            Ok(node)
        }
    }

    fn join_strategy(
        kind: JoinKind,
        logic: &LogicNode,
        options: &PlannerOptions,
    ) -> PlannerResult<PhysicKind> {
        match kind {
            JoinKind::Mark => Ok(PhysicKind::MarkJoin),
            JoinKind::Single => Ok(PhysicKind::SingleJoin),
            JoinKind::SingleMark => Ok(PhysicKind::SingleMarkJoin),
            _ => {
                let hashable = logic
                    .filter
                    .as_ref()
                    .map(|p| {
                        Self::filter_hashable(
                            p,
                            &logic.children[0].tables(),
                            &logic.children[1].tables(),
                        )
                    })
                    .unwrap_or(false);
                let left_outer_free = !logic.children[0].has_outer_refs();

                if options.enable_hashjoin && hashable && left_outer_free {
                    debug!(join = kind.name(), "selected hash join");
                    Ok(PhysicKind::HashJoin)
                } else if options.enable_nljoin {
                    debug!(join = kind.name(), "selected nested loop join");
                    Ok(PhysicKind::NLJoin)
                } else {
                    Err(PlannerError::NotImplemented(format!(
                        "{} join has no available strategy: predicate is not hashable and nested loop join is disabled",
                        kind.name()
                    )))
                }
            }
        }
    }

    /// A predicate is hashable iff it is a single binary equality whose two
    /// sides carry non-empty, outer-reference-free table sets partitioning
    /// cleanly into the join's left and right inputs. AND-lists are not
    /// recognized.
    pub fn filter_hashable(
        pred: &Expr,
        left_tables: &BTreeSet<String>,
        right_tables: &BTreeSet<String>,
    ) -> bool {
        let Expr::Binary(b) = pred else {
            return false;
        };
        if b.op != BinOp::Eq {
            return false;
        }
        if b.left.has_shallow_outer_ref() || b.right.has_shallow_outer_ref() {
            return false;
        }
        let lt = b.left.table_refs();
        let rt = b.right.table_refs();
        if lt.is_empty() || rt.is_empty() {
            return false;
        }
        (lt.is_subset(left_tables) && rt.is_subset(right_tables))
            || (lt.is_subset(right_tables) && rt.is_subset(left_tables))
    }
}

/// Translate the plans owned by subquery expressions so the executor can
/// evaluate them per outer row.
fn translate_subqueries(e: &mut Expr, options: &PlannerOptions) -> PlannerResult<()> {
    match e {
        Expr::Subquery(s) => {
            if let Some(lhs) = &mut s.lhs {
                translate_subqueries(lhs, options)?;
            }
            let plan = (*s.plan).clone();
            s.physic = Some(Box::new(PhysicalPlanner::plan(plan, options)?));
            Ok(())
        }
        Expr::Binary(b) => {
            translate_subqueries(&mut b.left, options)?;
            translate_subqueries(&mut b.right, options)
        }
        Expr::Func(f) => {
            for a in &mut f.args {
                translate_subqueries(a, options)?;
            }
            Ok(())
        }
        Expr::Agg(a) => {
            if let Some(arg) = &mut a.arg {
                translate_subqueries(arg, options)?;
            }
            Ok(())
        }
        Expr::Ref(r) => translate_subqueries(&mut r.expr, options),
        Expr::Literal(_) | Expr::ColRef(_) => Ok(()),
    }
}
