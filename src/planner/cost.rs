//! Cost model for query planning
//!
//! Static per-operator estimates derived from child cardinalities. No table
//! statistics are consulted, so the numbers are stable for a given plan and
//! safe to include in printed output.

use crate::planner::physical::{PhysicKind, PhysicNode};

/// Cost estimate for a plan
#[derive(Debug, Clone, Default)]
pub struct Cost {
    /// Estimated number of rows produced
    pub rows: f64,
    /// CPU cost (arbitrary units)
    pub cpu: f64,
    /// I/O cost (arbitrary units)
    pub io: f64,
}

impl Cost {
    /// Total cost (I/O weighted higher than CPU)
    pub fn total(&self) -> f64 {
        self.cpu + self.io * 10.0
    }

    /// Zero cost
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Cost estimator for physical operators
pub struct CostEstimator;

impl CostEstimator {
    /// Placeholder row count for tables (no statistics available)
    pub const DEFAULT_TABLE_ROWS: f64 = 1000.0;

    /// Placeholder selectivity for filters
    const DEFAULT_SELECTIVITY: f64 = 0.1;

    /// Estimate the cost of one operator given its already-costed children.
    /// `has_filter` is whether a predicate is attached to the node itself
    /// (scans with pushed filters produce fewer rows).
    pub fn node_cost(kind: &PhysicKind, has_filter: bool, children: &[PhysicNode]) -> Cost {
        let child = |i: usize| -> Cost {
            children
                .get(i)
                .map(|c| c.cost.clone())
                .unwrap_or_else(Cost::zero)
        };

        match kind {
            PhysicKind::ScanTable | PhysicKind::ScanFile => {
                let rows = if has_filter {
                    Self::DEFAULT_TABLE_ROWS * Self::DEFAULT_SELECTIVITY
                } else {
                    Self::DEFAULT_TABLE_ROWS
                };
                Cost {
                    rows,
                    cpu: rows,
                    io: rows / 100.0,
                }
            }

            PhysicKind::Filter => {
                let input = child(0);
                Cost {
                    rows: (input.rows * Self::DEFAULT_SELECTIVITY).max(1.0),
                    cpu: input.cpu + input.rows,
                    io: input.io,
                }
            }

            PhysicKind::HashAgg => {
                let input = child(0);
                Cost {
                    rows: (input.rows * 0.1).max(1.0),
                    cpu: input.cpu + input.rows,
                    io: input.io,
                }
            }

            PhysicKind::Order => {
                let input = child(0);
                let n = input.rows;
                Cost {
                    rows: n,
                    cpu: input.cpu + n * n.ln().max(1.0),
                    io: input.io,
                }
            }

            PhysicKind::NLJoin => {
                let (l, r) = (child(0), child(1));
                Cost {
                    rows: (l.rows * r.rows * Self::DEFAULT_SELECTIVITY).max(1.0),
                    // NLJ scans the right side once per left row
                    cpu: l.cpu + l.rows * r.cpu,
                    io: l.io + l.rows * r.io,
                }
            }

            PhysicKind::HashJoin => {
                let (l, r) = (child(0), child(1));
                Cost {
                    rows: l.rows.max(r.rows),
                    // build one side, probe with the other
                    cpu: l.cpu + r.cpu + l.rows + r.rows,
                    io: l.io + r.io,
                }
            }

            PhysicKind::MarkJoin | PhysicKind::SingleJoin | PhysicKind::SingleMarkJoin => {
                let (l, r) = (child(0), child(1));
                Cost {
                    // left-preserving: one output row per left row
                    rows: l.rows,
                    cpu: l.cpu + r.cpu + l.rows * r.rows,
                    io: l.io + r.io,
                }
            }

            PhysicKind::FromQuery => child(0),

            PhysicKind::Insert => {
                let input = child(0);
                Cost {
                    rows: input.rows,
                    cpu: input.cpu + input.rows,
                    io: input.io + input.rows / 100.0,
                }
            }

            PhysicKind::Result => Cost {
                rows: 1.0,
                cpu: 1.0,
                io: 0.0,
            },

            PhysicKind::Profiling => child(0),
        }
    }
}
