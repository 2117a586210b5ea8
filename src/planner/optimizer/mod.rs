//! Logical rewrite driver
//!
//! Applies rewrite rules to a bound statement before ordinal resolution.
//! Rule order matters: subquery decorrelation first (it introduces the join
//! shapes and marker predicates the later passes move around), then filter
//! merging, then predicate pushdown.

pub mod rules;

pub use rules::{FilterMerge, PredicatePushdown, RewriteRule};

use tracing::debug;

use crate::planner::error::PlannerResult;
use crate::planner::logical::BoundStatement;
use crate::planner::subquery::SubqueryToMarkJoin;
use crate::planner::PlannerOptions;

/// Rewrite driver that applies a sequence of rules
pub struct Optimizer {
    rules: Vec<Box<dyn RewriteRule>>,
}

impl Optimizer {
    /// Create a driver with the rule set selected by `options`
    pub fn new(options: &PlannerOptions) -> Self {
        let mut rules: Vec<Box<dyn RewriteRule>> = Vec::new();
        if options.enable_subquery_to_markjoin {
            rules.push(Box::new(SubqueryToMarkJoin));
        }
        rules.push(Box::new(FilterMerge));
        rules.push(Box::new(PredicatePushdown));
        Self { rules }
    }

    /// Create a driver with custom rules
    pub fn with_rules(rules: Vec<Box<dyn RewriteRule>>) -> Self {
        Self { rules }
    }

    /// Apply all rules in order
    pub fn rewrite(&self, stmt: BoundStatement) -> PlannerResult<BoundStatement> {
        let mut current = stmt;
        for rule in &self.rules {
            debug!(rule = rule.name(), "applying rewrite rule");
            current = rule.apply(current)?;
        }
        Ok(current)
    }

    /// Names of the configured rules
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}
