//! Physical plan representation
//!
//! Physical plans represent how a query will actually be executed, including
//! algorithm choices (hash join vs nested loop join, hash aggregation). Each
//! node pairs with the logical node it was translated from and carries a
//! static cost estimate. The profiling decorator is a pass-through wrapper
//! holding the post-execution row count; it is invisible to plan equality
//! and to printing.

pub mod planner;

pub use planner::PhysicalPlanner;

use crate::planner::cost::Cost;
use crate::planner::expr::Expr;
use crate::planner::logical::LogicNode;

/// Physical operator kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicKind {
    ScanTable,
    ScanFile,
    Filter,
    HashAgg,
    Order,
    NLJoin,
    HashJoin,
    MarkJoin,
    SingleJoin,
    SingleMarkJoin,
    FromQuery,
    Insert,
    Result,
    /// Pass-through decorator collecting execution statistics
    Profiling,
}

/// Post-execution statistics, written by the executor after the operator
/// completes and read only afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    /// Rows produced
    pub nrows: u64,
}

/// Physical plan node
#[derive(Debug, Clone)]
pub struct PhysicNode {
    pub kind: PhysicKind,
    /// The logical counterpart this node was translated from, children
    /// detached. None only for the profiling decorator.
    pub logic: Option<LogicNode>,
    pub children: Vec<PhysicNode>,
    /// Static cost and cardinality estimate
    pub cost: Cost,
    /// Execution statistics, present only on profiling decorators after a run
    pub profile: Option<ProfileRecord>,
}

impl PhysicNode {
    /// Operator name as printed
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            PhysicKind::ScanTable => "PhysicScanTable",
            PhysicKind::ScanFile => "PhysicScanFile",
            PhysicKind::Filter => "PhysicFilter",
            PhysicKind::HashAgg => "PhysicHashAgg",
            PhysicKind::Order => "PhysicOrder",
            PhysicKind::NLJoin => "PhysicNLJoin",
            PhysicKind::HashJoin => "PhysicHashJoin",
            PhysicKind::MarkJoin => "PhysicMarkJoin",
            PhysicKind::SingleJoin => "PhysicSingleJoin",
            PhysicKind::SingleMarkJoin => "PhysicSingleMarkJoin",
            PhysicKind::FromQuery => "PhysicFromQuery",
            PhysicKind::Insert => "PhysicInsert",
            PhysicKind::Result => "PhysicResult",
            PhysicKind::Profiling => "PhysicProfiling",
        }
    }

    /// Direct children
    pub fn children(&self) -> &[PhysicNode] {
        &self.children
    }

    /// Skip profiling decorators down to the wrapped operator
    pub fn unwrap_profiling(&self) -> &PhysicNode {
        match self.kind {
            PhysicKind::Profiling => self.children[0].unwrap_profiling(),
            _ => self,
        }
    }

    /// Output expression list (positional), deferring through decorators
    pub fn output(&self) -> &[Expr] {
        let node = self.unwrap_profiling();
        node.logic.as_ref().map(|l| l.output.as_slice()).unwrap_or(&[])
    }

    /// Attached predicate, deferring through decorators
    pub fn filter(&self) -> Option<&Expr> {
        let node = self.unwrap_profiling();
        node.logic.as_ref().and_then(|l| l.filter.as_ref())
    }

    /// Record the executor-observed row count. Meaningful only on a
    /// profiling decorator; a plain node ignores the call.
    pub fn set_profile_rows(&mut self, nrows: u64) {
        if self.kind == PhysicKind::Profiling {
            self.profile = Some(ProfileRecord { nrows });
        }
    }
}

impl PartialEq for PhysicNode {
    /// Structural equality modulo profiling decorators
    fn eq(&self, other: &Self) -> bool {
        let a = self.unwrap_profiling();
        let b = other.unwrap_profiling();
        a.kind == b.kind && a.logic == b.logic && a.children == b.children
    }
}
