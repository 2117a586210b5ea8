//! Optimizer memo hook
//!
//! `MemoRef` lets a plan tree reference a memo group without committing to a
//! specific member, so the same tree type serves both direct translation and
//! a search-based optimizer. The planner itself performs no search: copy-in
//! builds one group per node with that node as the canonical member, and
//! translation follows every reference to its group's canonical plan.
//! Group lifetime is bounded by the enclosing optimizer session.

use std::sync::Arc;

use crate::planner::logical::{LogicNode, LogicOp};

/// A memo group: a set of logically equivalent plans, represented here by
/// its canonical member. Shared between the memo and every `MemoRef` to it.
#[derive(Debug)]
pub struct MemoGroup {
    /// Group id within its memo
    pub id: usize,
    canonical: LogicNode,
}

impl MemoGroup {
    /// The canonical member plan. Its children are `MemoRef` nodes pointing
    /// at child groups.
    pub fn canonical(&self) -> &LogicNode {
        &self.canonical
    }

    /// Group signature, delegated to the canonical member
    pub fn sign(&self) -> u64 {
        self.canonical.memo_sign()
    }
}

impl PartialEq for MemoGroup {
    /// Groups compare by signature
    fn eq(&self, other: &Self) -> bool {
        self.sign() == other.sign()
    }
}

/// Plan memo
#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Arc<MemoGroup>>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Copy a plan into the memo bottom-up, one group per node. Returns the
    /// root group.
    pub fn copy_in(&mut self, mut plan: LogicNode) -> Arc<MemoGroup> {
        let children = std::mem::take(&mut plan.children);
        plan.children = children
            .into_iter()
            .map(|c| LogicNode::memo_ref(self.copy_in(c)))
            .collect();

        let group = Arc::new(MemoGroup {
            id: self.groups.len(),
            canonical: plan,
        });
        self.groups.push(Arc::clone(&group));
        group
    }

    /// Materialize a group back into a plain plan tree, replacing every
    /// memo reference with its group's canonical member.
    pub fn extract(group: &MemoGroup) -> LogicNode {
        let mut plan = group.canonical.clone();
        let children = std::mem::take(&mut plan.children);
        plan.children = children
            .into_iter()
            .map(|c| match &c.op {
                LogicOp::MemoRef { group } => Self::extract(group),
                _ => c,
            })
            .collect();
        plan
    }
}
