//! Plan output formatting
//!
//! Renders a physical plan as deterministic, depth-indented text suitable
//! for regression fixtures: repeated invocations on the same plan are
//! byte-identical. Each node prints its kind, inline detail, cost and
//! cardinality, an optional executed row count, then an `Output:` line and
//! node-specific details, then its children. Profiling decorators do not
//! render themselves; they defer to the wrapped operator, contributing only
//! the observed row count. Filters containing subqueries render the
//! subquery's plan indented beneath the filter line.

use std::fmt::Write;

use crate::planner::expr::Expr;
use crate::planner::logical::{JoinKind, LogicOp};
use crate::planner::physical::{PhysicKind, PhysicNode, ProfileRecord};

/// Plan printer
pub struct Explain;

impl Explain {
    /// Format a physical plan as a string
    pub fn format(plan: &PhysicNode) -> String {
        let mut out = String::new();
        Self::format_node(plan, 0, None, &mut out);
        out
    }

    fn format_node(
        node: &PhysicNode,
        depth: usize,
        profile: Option<&ProfileRecord>,
        out: &mut String,
    ) {
        // decorators are transparent: render the wrapped operator, keeping
        // the decorator's observed row count
        if node.kind == PhysicKind::Profiling {
            Self::format_node(&node.children[0], depth, node.profile.as_ref(), out);
            return;
        }

        let pad = "    ".repeat(depth);
        let arrow = if depth > 0 { "-> " } else { "" };
        write!(out, "{}{}{}", pad, arrow, node.kind_name()).unwrap();
        Self::inline_detail(node, out);
        write!(
            out,
            " (cost={:.0}, rows={:.0})",
            node.cost.total(),
            node.cost.rows
        )
        .unwrap();
        if let Some(p) = profile {
            write!(out, " (rows={})", p.nrows).unwrap();
        }
        out.push('\n');

        let sub = format!("{}    ", pad);
        if !node.output().is_empty() {
            writeln!(out, "{}Output: {}", sub, join_exprs(node.output())).unwrap();
        }
        if let Some(f) = node.filter() {
            writeln!(out, "{}Filter: {}", sub, f).unwrap();
            Self::format_filter_subqueries(f, depth, out);
        }
        if let Some(logic) = &node.logic {
            match &logic.op {
                LogicOp::Aggregate {
                    group_keys,
                    having,
                    agg_core,
                } => {
                    if !agg_core.is_empty() {
                        writeln!(out, "{}Aggregates: {}", sub, join_exprs(agg_core)).unwrap();
                    }
                    if !group_keys.is_empty() {
                        writeln!(out, "{}Group by: {}", sub, join_exprs(group_keys)).unwrap();
                    }
                    if let Some(h) = having {
                        writeln!(out, "{}Having: {}", sub, h).unwrap();
                    }
                }
                LogicOp::Order { keys, descending } => {
                    let rendered: Vec<String> = keys
                        .iter()
                        .zip(descending.iter())
                        .map(|(k, d)| {
                            if *d {
                                format!("{} desc", k)
                            } else {
                                k.to_string()
                            }
                        })
                        .collect();
                    writeln!(out, "{}Order by: {}", sub, rendered.join(", ")).unwrap();
                }
                _ => {}
            }
        }

        for child in &node.children {
            Self::format_node(child, depth + 1, None, out);
        }
    }

    fn inline_detail(node: &PhysicNode, out: &mut String) {
        let Some(logic) = &node.logic else { return };
        match &logic.op {
            LogicOp::ScanTable { table } => {
                write!(out, " {}", table.name).unwrap();
                if table.alias != table.name {
                    write!(out, " as {}", table.alias).unwrap();
                }
            }
            LogicOp::ScanFile { file } => {
                write!(out, " '{}' as {}", file.path, file.alias).unwrap();
            }
            LogicOp::Join { kind, .. } => {
                // mark and single joins are left-preserving by construction
                let shown = match kind {
                    JoinKind::Mark | JoinKind::Single | JoinKind::SingleMark => "Left",
                    other => other.name(),
                };
                write!(out, " ({})", shown).unwrap();
            }
            LogicOp::Insert { table, .. } => {
                write!(out, " {}", table.name).unwrap();
            }
            LogicOp::FromQuery { query } => {
                write!(out, " {}", query.alias).unwrap();
            }
            _ => {}
        }
    }

    fn format_filter_subqueries(filter: &Expr, depth: usize, out: &mut String) {
        let mut subqueries = Vec::new();
        filter.visit(&mut |e| {
            if let Expr::Subquery(s) = e {
                subqueries.push(s);
            }
        });
        for s in subqueries {
            if let Some(physic) = &s.physic {
                writeln!(out, "{}    Subquery {}:", "    ".repeat(depth), s.query_id).unwrap();
                Self::format_node(physic, depth + 1, None, out);
            }
        }
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
