//! Expression algebra for the query planner
//!
//! A closed family of expression nodes shared by logical and physical plans.
//! Structural equality and hashing ignore late-bound binding metadata (the
//! resolved ordinal and the outer-reference flag), so a rewritten expression
//! still compares equal to its unbound counterpart. Subquery expressions
//! compare by their query id.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::catalog::DataType;
use crate::planner::logical::LogicNode;
use crate::planner::physical::PhysicNode;
use crate::sql::ast::{BinOp, Literal};

/// Expression node
#[derive(Debug, Clone)]
pub enum Expr {
    /// Constant value with its type
    Literal(LiteralExpr),
    /// Column reference
    ColRef(ColExpr),
    /// Binary operation
    Binary(BinExpr),
    /// Scalar function call
    Func(FuncExpr),
    /// Aggregate function
    Agg(AggExpr),
    /// Subquery expression owning its plan
    Subquery(SubqueryExpr),
    /// Ordinal-resolved wrapper: the wrapped expression is available at
    /// `ordinal` in the producing node's output vector
    Ref(ExprRef),
}

/// Constant value
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub value: Literal,
    pub ty: DataType,
}

/// Column reference. `ordinal` is -1 until ordinal resolution assigns the
/// position in the producing child's output; `outer_ref` marks a column bound
/// in an enclosing query scope. Note that expression-level equality goes
/// through [`Expr`], which ignores the two late-bound fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ColExpr {
    pub tab_name: Option<String>,
    pub col_name: String,
    pub outer_ref: bool,
    pub ordinal: i32,
}

/// Binary operation
#[derive(Debug, Clone)]
pub struct BinExpr {
    pub op: BinOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Scalar function call
#[derive(Debug, Clone)]
pub struct FuncExpr {
    pub name: String,
    pub args: Vec<Expr>,
}

/// Aggregate function kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Count => "count",
            AggKind::Sum => "sum",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::Avg => "avg",
        }
    }
}

/// Aggregate function; `arg` is None for count(*)
#[derive(Debug, Clone)]
pub struct AggExpr {
    pub kind: AggKind,
    pub arg: Option<Box<Expr>>,
}

impl AggExpr {
    /// The argument expressions with aggregate functions themselves removed,
    /// i.e. what the aggregate needs computed from its input rows
    /// (sum(a+b) depends on {a+b}).
    pub fn non_func_dependencies(&self) -> Vec<Expr> {
        match &self.arg {
            Some(arg) => vec![(**arg).clone()],
            None => Vec::new(),
        }
    }
}

/// Subquery form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryKind {
    /// Scalar subquery in value position
    Scalar,
    /// EXISTS / NOT EXISTS in boolean position
    Exists { negated: bool },
    /// expr IN (subquery) in boolean position
    In { negated: bool },
}

/// Subquery expression: owns the nested query's logical plan together with
/// the bind context that produced it (select list, correlation flag). After
/// physical translation, `physic` carries the translated subquery plan for
/// per-outer-row evaluation.
#[derive(Debug, Clone)]
pub struct SubqueryExpr {
    pub kind: SubqueryKind,
    /// Left-hand side, present only for the In form
    pub lhs: Option<Box<Expr>>,
    pub plan: Box<LogicNode>,
    pub select_list: Vec<Expr>,
    pub query_id: u32,
    pub correlated: bool,
    pub physic: Option<Box<PhysicNode>>,
}

/// Ordinal-resolved reference into the producing node's output vector
#[derive(Debug, Clone)]
pub struct ExprRef {
    pub expr: Box<Expr>,
    pub ordinal: usize,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Literal(a), Expr::Literal(b)) => a == b,
            // ordinal and outer flag are binding metadata, not identity
            (Expr::ColRef(a), Expr::ColRef(b)) => {
                a.col_name == b.col_name && a.tab_name == b.tab_name
            }
            (Expr::Binary(a), Expr::Binary(b)) => {
                a.op == b.op && a.left == b.left && a.right == b.right
            }
            (Expr::Func(a), Expr::Func(b)) => a.name == b.name && a.args == b.args,
            (Expr::Agg(a), Expr::Agg(b)) => a.kind == b.kind && a.arg == b.arg,
            (Expr::Subquery(a), Expr::Subquery(b)) => a.query_id == b.query_id,
            (Expr::Ref(a), Expr::Ref(b)) => a.expr == b.expr,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Expr::Literal(l) => {
                0u8.hash(state);
                l.value.hash(state);
            }
            Expr::ColRef(c) => {
                1u8.hash(state);
                c.tab_name.hash(state);
                c.col_name.hash(state);
            }
            Expr::Binary(b) => {
                2u8.hash(state);
                b.op.hash(state);
                b.left.hash(state);
                b.right.hash(state);
            }
            Expr::Func(f) => {
                3u8.hash(state);
                f.name.hash(state);
                f.args.hash(state);
            }
            Expr::Agg(a) => {
                4u8.hash(state);
                a.kind.hash(state);
                a.arg.hash(state);
            }
            Expr::Subquery(s) => {
                5u8.hash(state);
                s.query_id.hash(state);
            }
            Expr::Ref(r) => {
                6u8.hash(state);
                r.expr.hash(state);
            }
        }
    }
}

impl Expr {
    /// Column reference bound to a table alias
    pub fn col(tab: impl Into<String>, name: impl Into<String>) -> Expr {
        Expr::ColRef(ColExpr {
            tab_name: Some(tab.into()),
            col_name: name.into(),
            outer_ref: false,
            ordinal: -1,
        })
    }

    /// Unqualified column reference
    pub fn col_unbound(name: impl Into<String>) -> Expr {
        Expr::ColRef(ColExpr {
            tab_name: None,
            col_name: name.into(),
            outer_ref: false,
            ordinal: -1,
        })
    }

    pub fn literal(value: Literal, ty: DataType) -> Expr {
        Expr::Literal(LiteralExpr { value, ty })
    }

    pub fn boolean(b: bool) -> Expr {
        Expr::literal(Literal::Boolean(b), DataType::Boolean)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(BinExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Func(FuncExpr {
            name: name.into(),
            args,
        })
    }

    pub fn not(e: Expr) -> Expr {
        Expr::func("not", vec![e])
    }

    /// Deep clone with every column-reference ordinal reset to unresolved
    pub fn clone_reset(&self) -> Expr {
        let mut e = self.clone();
        e.reset_ordinals();
        e
    }

    fn reset_ordinals(&mut self) {
        match self {
            Expr::ColRef(c) => c.ordinal = -1,
            Expr::Binary(b) => {
                b.left.reset_ordinals();
                b.right.reset_ordinals();
            }
            Expr::Func(f) => f.args.iter_mut().for_each(|a| a.reset_ordinals()),
            Expr::Agg(a) => {
                if let Some(arg) = &mut a.arg {
                    arg.reset_ordinals();
                }
            }
            Expr::Ref(r) => r.expr.reset_ordinals(),
            Expr::Subquery(s) => {
                if let Some(lhs) = &mut s.lhs {
                    lhs.reset_ordinals();
                }
            }
            Expr::Literal(_) => {}
        }
    }

    /// Pre-order visitation of this expression tree. Does not descend into
    /// subquery plans, only into the expression nodes themselves.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Binary(b) => {
                b.left.visit(f);
                b.right.visit(f);
            }
            Expr::Func(fx) => fx.args.iter().for_each(|a| a.visit(f)),
            Expr::Agg(a) => {
                if let Some(arg) = &a.arg {
                    arg.visit(f);
                }
            }
            Expr::Ref(r) => r.expr.visit(f),
            Expr::Subquery(s) => {
                if let Some(lhs) = &s.lhs {
                    lhs.visit(f);
                }
            }
            Expr::Literal(_) | Expr::ColRef(_) => {}
        }
    }

    /// Pre-order existence check with short-circuit. When `skip_refs` is
    /// true, subtrees rooted at an already-resolved `Ref` wrapper are not
    /// descended into.
    pub fn any(&self, skip_refs: bool, pred: &dyn Fn(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expr::Binary(b) => b.left.any(skip_refs, pred) || b.right.any(skip_refs, pred),
            Expr::Func(f) => f.args.iter().any(|a| a.any(skip_refs, pred)),
            Expr::Agg(a) => a
                .arg
                .as_ref()
                .map(|arg| arg.any(skip_refs, pred))
                .unwrap_or(false),
            Expr::Ref(r) => !skip_refs && r.expr.any(skip_refs, pred),
            Expr::Subquery(s) => s
                .lhs
                .as_ref()
                .map(|lhs| lhs.any(skip_refs, pred))
                .unwrap_or(false),
            Expr::Literal(_) | Expr::ColRef(_) => false,
        }
    }

    /// Returns a clone with every subtree structurally equal to `target`
    /// replaced by `replacement`.
    pub fn search_replace(&self, target: &Expr, replacement: &Expr) -> Expr {
        if self == target {
            return replacement.clone();
        }
        match self {
            Expr::Binary(b) => Expr::Binary(BinExpr {
                op: b.op,
                left: Box::new(b.left.search_replace(target, replacement)),
                right: Box::new(b.right.search_replace(target, replacement)),
            }),
            Expr::Func(f) => Expr::Func(FuncExpr {
                name: f.name.clone(),
                args: f
                    .args
                    .iter()
                    .map(|a| a.search_replace(target, replacement))
                    .collect(),
            }),
            Expr::Agg(a) => Expr::Agg(AggExpr {
                kind: a.kind,
                arg: a
                    .arg
                    .as_ref()
                    .map(|arg| Box::new(arg.search_replace(target, replacement))),
            }),
            Expr::Ref(r) => Expr::Ref(ExprRef {
                expr: Box::new(r.expr.search_replace(target, replacement)),
                ordinal: r.ordinal,
            }),
            Expr::Subquery(s) => {
                let mut s = s.clone();
                if let Some(lhs) = s.lhs.take() {
                    s.lhs = Some(Box::new(lhs.search_replace(target, replacement)));
                }
                Expr::Subquery(s)
            }
            Expr::Literal(_) | Expr::ColRef(_) => self.clone(),
        }
    }

    /// The set of table aliases referenced by column references in this
    /// expression, excluding outer references.
    pub fn table_refs(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::ColRef(c) = e {
                if !c.outer_ref {
                    if let Some(t) = &c.tab_name {
                        set.insert(t.clone());
                    }
                }
            }
        });
        set
    }

    /// All column-reference leaves in pre-order
    pub fn col_refs(&self) -> Vec<&ColExpr> {
        let mut cols = Vec::new();
        self.visit(&mut |e| {
            if let Expr::ColRef(c) = e {
                cols.push(c);
            }
        });
        cols
    }

    /// Whether this expression tree contains an aggregate function
    pub fn contains_agg(&self) -> bool {
        self.any(false, &|e| matches!(e, Expr::Agg(_)))
    }

    /// Whether this expression tree contains a subquery expression
    pub fn contains_subquery(&self) -> bool {
        self.any(false, &|e| matches!(e, Expr::Subquery(_)))
    }

    /// Whether this expression tree mentions an outer reference, including
    /// inside owned subquery plans
    pub fn has_outer_ref(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| match e {
            Expr::ColRef(c) if c.outer_ref => found = true,
            Expr::Subquery(s) if s.plan.has_outer_refs() => found = true,
            _ => {}
        });
        found
    }

    /// Outer references within this expression tree only (subquery plans are
    /// not descended into)
    pub fn has_shallow_outer_ref(&self) -> bool {
        self.col_refs().iter().any(|c| c.outer_ref)
    }

    /// Set the outer-reference flag to false on every column reference
    pub fn clear_outer_refs(&mut self) {
        match self {
            Expr::ColRef(c) => c.outer_ref = false,
            Expr::Binary(b) => {
                b.left.clear_outer_refs();
                b.right.clear_outer_refs();
            }
            Expr::Func(f) => f.args.iter_mut().for_each(|a| a.clear_outer_refs()),
            Expr::Agg(a) => {
                if let Some(arg) = &mut a.arg {
                    arg.clear_outer_refs();
                }
            }
            Expr::Ref(r) => r.expr.clear_outer_refs(),
            Expr::Subquery(s) => {
                if let Some(lhs) = &mut s.lhs {
                    lhs.clear_outer_refs();
                }
            }
            Expr::Literal(_) => {}
        }
    }
}

/// Split a predicate into its top-level AND conjuncts
pub fn split_conjuncts(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary(b) if b.op == BinOp::And => {
            let mut out = split_conjuncts(&b.left);
            out.extend(split_conjuncts(&b.right));
            out
        }
        _ => vec![expr.clone()],
    }
}

/// Combine conjuncts back into a single AND chain; None for an empty list
pub fn and_conjuncts(conjuncts: Vec<Expr>) -> Option<Expr> {
    conjuncts
        .into_iter()
        .reduce(|acc, c| Expr::binary(BinOp::And, acc, c))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(l) => match &l.value {
                Literal::Null => write!(f, "null"),
                Literal::Boolean(b) => write!(f, "{}", b),
                Literal::Integer(i) => write!(f, "{}", i),
                Literal::Float(x) => write!(f, "{}", x),
                Literal::String(s) => write!(f, "'{}'", s),
                Literal::Interval { months, days } => {
                    if *months != 0 {
                        write!(f, "interval '{}' month", months)
                    } else {
                        write!(f, "interval '{}' day", days)
                    }
                }
            },
            Expr::ColRef(c) => {
                if c.outer_ref {
                    write!(f, "?")?;
                }
                if let Some(t) = &c.tab_name {
                    write!(f, "{}.", t)?;
                }
                write!(f, "{}", c.col_name)?;
                if c.outer_ref {
                    write!(f, "?")?;
                } else if c.ordinal >= 0 {
                    write!(f, "[{}]", c.ordinal)?;
                }
                Ok(())
            }
            Expr::Binary(b) => write!(f, "{}{}{}", b.left, b.op, b.right),
            Expr::Func(fx) => {
                write!(f, "{}(", fx.name)?;
                for (i, a) in fx.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::Agg(a) => match &a.arg {
                Some(arg) => write!(f, "{}({})", a.kind.name(), arg),
                None => write!(f, "{}(*)", a.kind.name()),
            },
            Expr::Subquery(s) => write!(f, "@{}", s.query_id),
            Expr::Ref(r) => write!(f, "{{{}}}[{}]", r.expr, r.ordinal),
        }
    }
}
