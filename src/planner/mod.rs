//! Query planner
//!
//! Transforms bound SQL statements into executable physical plans.
//!
//! ## Pipeline
//!
//! ```text
//! BoundStatement
//!   → Optimizer::rewrite()     → BoundStatement (subqueries decorrelated,
//!                                 filters merged and pushed down)
//!   → LogicNode::resolve()     → LogicNode (column ordinals assigned)
//!   → Memo::copy_in()          → memo-referenced plan (only with use_memo)
//!   → PhysicalPlanner::plan()  → PhysicNode (strategies chosen, costed)
//!   → Explain::format()        → deterministic plan text
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use quillsql::planner::{Explain, Planner, PlannerOptions};
//! use quillsql::sql::{Binder, Parser};
//!
//! let stmt = Parser::parse_one(sql)?;
//! let bound = Binder::new(&catalog).bind(stmt)?;
//! let physical = Planner::plan(bound, &PlannerOptions::default())?;
//! println!("{}", Explain::format(&physical));
//! ```

pub mod cost;
pub mod error;
pub mod explain;
pub mod expr;
pub mod logical;
pub mod memo;
pub mod optimizer;
pub mod physical;
pub mod resolve;
pub mod subquery;
pub mod table_ref;

#[cfg(test)]
pub mod test_utils;

pub use cost::{Cost, CostEstimator};
pub use error::{PlannerError, PlannerResult};
pub use explain::Explain;
pub use expr::Expr;
pub use logical::{BoundStatement, JoinKind, LogicNode, LogicOp};
pub use memo::{Memo, MemoGroup};
pub use optimizer::Optimizer;
pub use physical::{PhysicKind, PhysicNode, PhysicalPlanner};
pub use table_ref::TableRef;

/// Planner configuration: one immutable value threaded through the whole
/// pipeline. These are the only recognized options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerOptions {
    /// Rewrite EXISTS/IN/scalar subqueries into mark/single joins. When
    /// false, subqueries stay as expressions and the executor evaluates them
    /// per outer row.
    pub enable_subquery_to_markjoin: bool,
    /// Consider hash join for hashable predicates
    pub enable_hashjoin: bool,
    /// Allow nested loop join; with this off, a join whose predicate is not
    /// hashable is a planner error
    pub enable_nljoin: bool,
    /// Route translation through the plan memo
    pub use_memo: bool,
    /// Wrap each physical node in a profiling decorator
    pub profiling_enabled: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            enable_subquery_to_markjoin: true,
            enable_hashjoin: true,
            enable_nljoin: true,
            use_memo: false,
            profiling_enabled: false,
        }
    }
}

/// Planner facade running the rewrite → resolve → translate pipeline
pub struct Planner;

impl Planner {
    /// Plan a bound statement into a physical plan
    pub fn plan(stmt: BoundStatement, options: &PlannerOptions) -> PlannerResult<PhysicNode> {
        let stmt = Optimizer::new(options).rewrite(stmt)?;

        let mut plan = stmt.plan;
        // INSERT must keep its source arity; everything else deduplicates
        let remove_redundant = !matches!(plan.op, LogicOp::Insert { .. });
        plan.resolve(&stmt.select_list, remove_redundant)?;

        let plan = if options.use_memo {
            let mut memo = Memo::new();
            let root = memo.copy_in(plan);
            root.canonical().clone()
        } else {
            plan
        };

        PhysicalPlanner::plan(plan, options)
    }
}
