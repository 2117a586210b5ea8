//! Ordinal resolution
//!
//! After binding and rewriting, every column reference in a node's filter and
//! output must carry a concrete position so the executor can pull values from
//! its child's output vector. Resolution is a single top-down pass: the
//! parent pushes the expression list it requires into each node, the node
//! derives what it needs from its children, recurses, and then rewrites its
//! own expressions against the concatenated child outputs.
//!
//! Outer references are left untouched (they resolve against an enclosing
//! scope at execution time); everything else either receives an ordinal or
//! ends up wrapped in a `Ref` whose ordinal indexes the child output.

use tracing::debug;

use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::expr::{BinExpr, ColExpr, Expr, ExprRef, FuncExpr, SubqueryKind};
use crate::planner::logical::{is_marker, marker_name, LogicNode, LogicOp};

impl LogicNode {
    /// Resolve this subtree given the expression list the parent wants from
    /// it. `remove_redundant` deduplicates the produced output; it must be
    /// false under an INSERT so the source arity is preserved.
    pub fn resolve(&mut self, req_output: &[Expr], remove_redundant: bool) -> PlannerResult<()> {
        debug!(node = self.kind_name(), req = req_output.len(), "resolve");
        match &mut self.op {
            LogicOp::ScanTable { table } => {
                let cols = table.all_columns_refs();
                if let Some(f) = self.filter.take() {
                    self.filter = Some(clone_fix_ordinal(&f, &cols)?);
                }
                let mut out = fix_list(req_output, &cols)?;
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                table.add_outer_refs_to_output(&mut out);
                self.output = out;
            }

            LogicOp::ScanFile { file } => {
                let cols = file.all_columns_refs();
                if let Some(f) = self.filter.take() {
                    self.filter = Some(clone_fix_ordinal(&f, &cols)?);
                }
                let mut out = fix_list(req_output, &cols)?;
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                file.add_outer_refs_to_output(&mut out);
                self.output = out;
            }

            LogicOp::Filter => {
                let mut req_child = req_output.to_vec();
                if let Some(f) = &self.filter {
                    append_missing(&mut req_child, non_outer_col_exprs(f));
                }
                self.children[0].resolve(&req_child, remove_redundant)?;
                let child_out = self.children[0].output.clone();

                if let Some(f) = self.filter.take() {
                    self.filter = Some(clone_fix_ordinal(&f, &child_out)?);
                }
                let mut out = fix_list(req_output, &child_out)?;
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                self.output = out;
            }

            LogicOp::Join { marker, .. } => {
                let own_marker = marker.map(marker_name);
                let is_own_marker = |e: &Expr| match (&own_marker, e) {
                    (Some(name), Expr::ColRef(c)) => {
                        c.tab_name.is_none() && c.col_name == *name
                    }
                    _ => false,
                };
                let mut whole = req_output.to_vec();
                if let Some(p) = &self.filter {
                    append_missing(&mut whole, non_outer_col_exprs(p));
                }

                // partition each requested expression to the side its table
                // references belong to; mixed expressions are decomposed into
                // column leaves and routed individually
                let left_tables = self.children[0].tables();
                let right_tables = self.children[1].tables();
                let mut left_req: Vec<Expr> = Vec::new();
                let mut right_req: Vec<Expr> = Vec::new();
                for e in &whole {
                    if is_own_marker(e) {
                        // this join's own product
                        continue;
                    }
                    if is_marker(e) {
                        // a marker emitted by a mark join further down the
                        // left-deep join stack
                        append_missing(&mut left_req, [e.clone()]);
                        continue;
                    }
                    let tabs = e.table_refs();
                    if tabs.is_empty() {
                        continue;
                    }
                    if tabs.is_subset(&left_tables) {
                        append_missing(&mut left_req, [e.clone()]);
                    } else if tabs.is_subset(&right_tables) {
                        append_missing(&mut right_req, [e.clone()]);
                    } else {
                        for c in e.col_refs() {
                            if c.outer_ref {
                                continue;
                            }
                            let leaf = Expr::ColRef(c.clone());
                            match &c.tab_name {
                                Some(t) if left_tables.contains(t) => {
                                    append_missing(&mut left_req, [leaf]);
                                }
                                Some(t) if right_tables.contains(t) => {
                                    append_missing(&mut right_req, [leaf]);
                                }
                                _ => {
                                    return Err(PlannerError::InvalidProgram(format!(
                                        "expression {} belongs to neither side of the join",
                                        leaf
                                    )))
                                }
                            }
                        }
                    }
                }

                self.children[0].resolve(&left_req, remove_redundant)?;
                self.children[1].resolve(&right_req, remove_redundant)?;
                let mut child_out = self.children[0].output.clone();
                child_out.extend_from_slice(&self.children[1].output);

                if let Some(p) = self.filter.take() {
                    self.filter = Some(clone_fix_ordinal(&p, &child_out)?);
                }

                let mut out = Vec::new();
                for e in req_output {
                    if is_own_marker(e) {
                        out.push(e.clone());
                    } else {
                        out.push(clone_fix_ordinal(e, &child_out)?);
                    }
                }
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                self.output = out;
            }

            LogicOp::Aggregate {
                group_keys,
                having,
                agg_core,
            } => {
                let mut req_child: Vec<Expr> = Vec::new();
                append_missing(&mut req_child, group_keys.iter().cloned());
                let mut deps = Vec::new();
                for e in req_output {
                    collect_agg_dependencies(e, &mut deps);
                }
                if let Some(h) = having {
                    collect_agg_dependencies(h, &mut deps);
                }
                append_missing(&mut req_child, deps);

                self.children[0].resolve(&req_child, true)?;
                let child_out = self.children[0].output.clone();

                *group_keys = fix_list(group_keys, &child_out)?;

                // second phase: extract aggregate functions into agg_core and
                // rewrite the output to reference the aggregate row
                // [group keys..., agg core...] by position
                agg_core.clear();
                let mut out = Vec::new();
                for e in req_output {
                    out.push(rewrite_agg_expr(e, group_keys, agg_core, &child_out)?);
                }
                if let Some(h) = having.take() {
                    *having = Some(rewrite_agg_expr(&h, group_keys, agg_core, &child_out)?);
                }
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                self.output = out;
            }

            LogicOp::Order { keys, .. } => {
                let mut req_child = req_output.to_vec();
                append_missing(&mut req_child, keys.iter().cloned());
                self.children[0].resolve(&req_child, remove_redundant)?;
                let child_out = self.children[0].output.clone();

                *keys = fix_list(keys, &child_out)?;
                let mut out = fix_list(req_output, &child_out)?;
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                self.output = out;
            }

            LogicOp::FromQuery { query } => {
                let sub_req = query.select_list.clone();
                self.children[0].resolve(&sub_req, true)?;

                let cols = query.all_columns_refs();
                if let Some(f) = self.filter.take() {
                    self.filter = Some(clone_fix_ordinal(&f, &cols)?);
                }
                let mut out = fix_list(req_output, &cols)?;
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                query.add_outer_refs_to_output(&mut out);
                self.output = out;
            }

            LogicOp::Insert { .. } => {
                self.children[0].resolve(req_output, false)?;
                self.output.clear();
            }

            LogicOp::Result => {
                let mut out = fix_list(req_output, &[])?;
                if remove_redundant {
                    out = dedup_exprs(out);
                }
                self.output = out;
            }

            LogicOp::MemoRef { .. } => {
                return Err(PlannerError::InvalidProgram(
                    "memo reference in an unresolved plan".to_string(),
                ))
            }
        }
        Ok(())
    }
}

/// Unwrap resolved reference wrappers
pub fn strip_ref(e: &Expr) -> &Expr {
    match e {
        Expr::Ref(r) => strip_ref(&r.expr),
        _ => e,
    }
}

/// Rewrite an expression so every column reference carries its position in
/// `children_output`. A whole-expression match yields a `Ref` to the match's
/// ordinal; already-resolved `Ref` wrappers are not re-descended.
pub fn clone_fix_ordinal(e: &Expr, children_output: &[Expr]) -> PlannerResult<Expr> {
    match e {
        Expr::ColRef(c) => {
            if c.outer_ref {
                return Ok(e.clone());
            }
            match find_in_output(c, children_output)? {
                Some(i) => {
                    let mut fixed = c.clone();
                    fixed.ordinal = i as i32;
                    Ok(Expr::ColRef(fixed))
                }
                None => Err(PlannerError::SemanticAnalyze(format!(
                    "column {} cannot be bound",
                    e
                ))),
            }
        }
        Expr::Ref(_) => Ok(e.clone()),
        _ => {
            if let Some(i) = children_output.iter().position(|o| strip_ref(o) == e) {
                return Ok(Expr::Ref(ExprRef {
                    expr: Box::new(e.clone()),
                    ordinal: i,
                }));
            }
            match e {
                Expr::Binary(b) => Ok(Expr::Binary(BinExpr {
                    op: b.op,
                    left: Box::new(clone_fix_ordinal(&b.left, children_output)?),
                    right: Box::new(clone_fix_ordinal(&b.right, children_output)?),
                })),
                Expr::Func(f) => Ok(Expr::Func(FuncExpr {
                    name: f.name.clone(),
                    args: f
                        .args
                        .iter()
                        .map(|a| clone_fix_ordinal(a, children_output))
                        .collect::<PlannerResult<Vec<_>>>()?,
                })),
                Expr::Agg(a) => {
                    let mut a = a.clone();
                    if let Some(arg) = a.arg.take() {
                        a.arg = Some(Box::new(clone_fix_ordinal(&arg, children_output)?));
                    }
                    Ok(Expr::Agg(a))
                }
                Expr::Subquery(s) => {
                    if !matches!(s.kind, SubqueryKind::Exists { .. }) && s.select_list.len() != 1 {
                        return Err(PlannerError::SemanticAnalyze(format!(
                            "subquery @{} must return exactly one column",
                            s.query_id
                        )));
                    }
                    let mut s = s.clone();
                    if let Some(lhs) = s.lhs.take() {
                        s.lhs = Some(Box::new(clone_fix_ordinal(&lhs, children_output)?));
                    }
                    let sub_req = s.select_list.clone();
                    s.plan.resolve(&sub_req, true)?;
                    Ok(Expr::Subquery(s))
                }
                Expr::Literal(_) => Ok(e.clone()),
                Expr::ColRef(_) | Expr::Ref(_) => unreachable!("handled above"),
            }
        }
    }
}

/// Locate a column reference in an output list by equality-or-alias match.
/// Identical duplicate entries collapse to the first; matches against
/// distinct sources are a binding ambiguity.
fn find_in_output(c: &ColExpr, out: &[Expr]) -> PlannerResult<Option<usize>> {
    let mut matches: Vec<usize> = Vec::new();
    for (i, o) in out.iter().enumerate() {
        if let Expr::ColRef(oc) = strip_ref(o) {
            if oc.col_name != c.col_name {
                continue;
            }
            match (&c.tab_name, &oc.tab_name) {
                (Some(t), Some(ot)) => {
                    if t == ot {
                        matches.push(i);
                    }
                }
                (Some(_), None) => {}
                (None, _) => matches.push(i),
            }
        }
    }
    if matches.len() <= 1 {
        return Ok(matches.first().copied());
    }
    let same_source = matches.windows(2).all(|w| {
        let (a, b) = (strip_ref(&out[w[0]]), strip_ref(&out[w[1]]));
        a == b
    });
    if same_source {
        Ok(Some(matches[0]))
    } else {
        Err(PlannerError::SemanticAnalyze(format!(
            "column {} is ambiguous",
            c.col_name
        )))
    }
}

/// Rewrite one aggregate-output expression: group-key matches and aggregate
/// functions become `Ref`s into the aggregate row `[keys..., agg core...]`;
/// any surviving bare column reference is a non-grouped column error.
fn rewrite_agg_expr(
    e: &Expr,
    group_keys: &[Expr],
    agg_core: &mut Vec<Expr>,
    child_out: &[Expr],
) -> PlannerResult<Expr> {
    if let Some(i) = group_keys.iter().position(|k| strip_ref(k) == strip_ref(e)) {
        return Ok(Expr::Ref(ExprRef {
            expr: Box::new(group_keys[i].clone()),
            ordinal: i,
        }));
    }
    match e {
        Expr::Agg(_) => {
            let fixed = clone_fix_ordinal(e, child_out)?;
            let j = match agg_core.iter().position(|a| *a == fixed) {
                Some(j) => j,
                None => {
                    agg_core.push(fixed.clone());
                    agg_core.len() - 1
                }
            };
            Ok(Expr::Ref(ExprRef {
                expr: Box::new(fixed),
                ordinal: group_keys.len() + j,
            }))
        }
        Expr::ColRef(c) => {
            if c.outer_ref {
                Ok(e.clone())
            } else {
                Err(PlannerError::SemanticAnalyze(format!(
                    "column {} must appear in group by clause",
                    e
                )))
            }
        }
        Expr::Binary(b) => Ok(Expr::Binary(BinExpr {
            op: b.op,
            left: Box::new(rewrite_agg_expr(&b.left, group_keys, agg_core, child_out)?),
            right: Box::new(rewrite_agg_expr(&b.right, group_keys, agg_core, child_out)?),
        })),
        Expr::Func(f) => Ok(Expr::Func(FuncExpr {
            name: f.name.clone(),
            args: f
                .args
                .iter()
                .map(|a| rewrite_agg_expr(a, group_keys, agg_core, child_out))
                .collect::<PlannerResult<Vec<_>>>()?,
        })),
        Expr::Subquery(s) => {
            let mut s = s.clone();
            if let Some(lhs) = s.lhs.take() {
                s.lhs = Some(Box::new(rewrite_agg_expr(
                    &lhs, group_keys, agg_core, child_out,
                )?));
            }
            let sub_req = s.select_list.clone();
            s.plan.resolve(&sub_req, true)?;
            Ok(Expr::Subquery(s))
        }
        Expr::Literal(_) | Expr::Ref(_) => Ok(e.clone()),
    }
}

fn collect_agg_dependencies(e: &Expr, deps: &mut Vec<Expr>) {
    e.visit(&mut |sub| {
        if let Expr::Agg(a) = sub {
            deps.extend(a.non_func_dependencies());
        }
    });
}

fn fix_list(list: &[Expr], children_output: &[Expr]) -> PlannerResult<Vec<Expr>> {
    list.iter()
        .map(|e| clone_fix_ordinal(e, children_output))
        .collect()
}

/// Column-reference leaves of an expression, outer references excluded
fn non_outer_col_exprs(e: &Expr) -> Vec<Expr> {
    e.col_refs()
        .into_iter()
        .filter(|c| !c.outer_ref)
        .map(|c| Expr::ColRef(c.clone()))
        .collect()
}

fn append_missing(list: &mut Vec<Expr>, extra: impl IntoIterator<Item = Expr>) {
    for e in extra {
        if !list.contains(&e) {
            list.push(e);
        }
    }
}

fn dedup_exprs(list: Vec<Expr>) -> Vec<Expr> {
    let mut out: Vec<Expr> = Vec::new();
    for e in list {
        if !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::planner::expr::AggKind;
    use crate::planner::logical::JoinKind;
    use crate::planner::table_ref::BaseTableRef;
    use crate::sql::ast::{BinOp, Literal};

    fn table(alias: &str, cols: &[&str]) -> BaseTableRef {
        BaseTableRef {
            name: alias.to_string(),
            alias: alias.to_string(),
            columns: cols
                .iter()
                .map(|c| (c.to_string(), DataType::Int))
                .collect(),
            outer_refs: Vec::new(),
        }
    }

    fn agg(kind: AggKind, arg: Expr) -> Expr {
        Expr::Agg(crate::planner::expr::AggExpr {
            kind,
            arg: Some(Box::new(arg)),
        })
    }

    fn ordinal_of(e: &Expr) -> i32 {
        match e {
            Expr::ColRef(c) => c.ordinal,
            Expr::Ref(r) => r.ordinal as i32,
            _ => panic!("no ordinal on {:?}", e),
        }
    }

    #[test]
    fn test_scan_resolution_sets_ordinals() {
        let mut scan = LogicNode::scan_table(table("a", &["i", "j", "k"]));
        scan.filter = Some(Expr::binary(
            BinOp::Gt,
            Expr::col("a", "k"),
            Expr::literal(Literal::Integer(5), DataType::BigInt),
        ));

        scan.resolve(&[Expr::col("a", "j")], true).unwrap();

        assert_eq!(scan.output.len(), 1);
        assert_eq!(ordinal_of(&scan.output[0]), 1);
        match scan.filter.as_ref().unwrap() {
            Expr::Binary(b) => assert_eq!(ordinal_of(&b.left), 2),
            _ => panic!("Expected binary filter"),
        }
    }

    #[test]
    fn test_scan_unknown_column_is_semantic_error() {
        let mut scan = LogicNode::scan_table(table("a", &["i"]));
        let err = scan.resolve(&[Expr::col("a", "zzz")], true).unwrap_err();
        assert!(matches!(err, PlannerError::SemanticAnalyze(_)));
    }

    #[test]
    fn test_join_partitions_request_and_fixes_predicate() {
        let pred = Expr::binary(BinOp::Eq, Expr::col("a", "i"), Expr::col("b", "j"));
        let mut join = LogicNode::join(
            JoinKind::Inner,
            Some(pred),
            LogicNode::scan_table(table("a", &["i", "k"])),
            LogicNode::scan_table(table("b", &["j"])),
        );

        join.resolve(&[Expr::col("a", "k"), Expr::col("b", "j")], true)
            .unwrap();

        // children got their own partitions: [a.k, a.i] and [b.j]
        assert_eq!(join.children[0].output.len(), 2);
        assert_eq!(join.children[1].output.len(), 1);

        // predicate ordinals index the concatenated child output
        match join.filter.as_ref().unwrap() {
            Expr::Binary(b) => {
                assert_eq!(ordinal_of(&b.left), 1); // a.i is second in left output
                assert_eq!(ordinal_of(&b.right), 2); // b.j follows left's two columns
            }
            _ => panic!("Expected binary predicate"),
        }
    }

    #[test]
    fn test_aggregate_core_wiring() {
        // SELECT a1, cos(a1*7)+sum(a1), sum(a1)+sum(a2+a3)*2 FROM t GROUP BY a1
        let a1 = Expr::col("t", "a1");
        let a2a3 = Expr::binary(BinOp::Add, Expr::col("t", "a2"), Expr::col("t", "a3"));
        let seven = Expr::literal(Literal::Integer(7), DataType::BigInt);
        let two = Expr::literal(Literal::Integer(2), DataType::BigInt);

        let req = vec![
            a1.clone(),
            Expr::binary(
                BinOp::Add,
                Expr::func("cos", vec![Expr::binary(BinOp::Mul, a1.clone(), seven)]),
                agg(AggKind::Sum, a1.clone()),
            ),
            Expr::binary(
                BinOp::Add,
                agg(AggKind::Sum, a1.clone()),
                Expr::binary(BinOp::Mul, agg(AggKind::Sum, a2a3.clone()), two),
            ),
        ];

        let mut node = LogicNode::aggregate(
            LogicNode::scan_table(table("t", &["a1", "a2", "a3"])),
            vec![a1.clone()],
            None,
        );
        node.resolve(&req, true).unwrap();

        let (agg_core, keys) = match &node.op {
            LogicOp::Aggregate {
                agg_core,
                group_keys,
                ..
            } => (agg_core, group_keys),
            _ => unreachable!(),
        };
        assert_eq!(keys.len(), 1);
        // exactly two aggregates, in discovery order
        assert_eq!(agg_core.len(), 2);
        assert_eq!(strip_ref(&agg_core[0]), &agg(AggKind::Sum, a1.clone()));
        assert_eq!(strip_ref(&agg_core[1]), &agg(AggKind::Sum, a2a3.clone()));

        // output[0] references the group key at position 0
        assert_eq!(ordinal_of(&node.output[0]), 0);

        // aggregates reference positions 1 and 2 of the aggregate row
        let mut ref_ordinals = Vec::new();
        node.output[1].visit(&mut |e| {
            if let Expr::Ref(r) = e {
                if matches!(*r.expr, Expr::Agg(_)) {
                    ref_ordinals.push(r.ordinal);
                }
            }
        });
        node.output[2].visit(&mut |e| {
            if let Expr::Ref(r) = e {
                if matches!(*r.expr, Expr::Agg(_)) {
                    ref_ordinals.push(r.ordinal);
                }
            }
        });
        assert_eq!(ref_ordinals, vec![1, 1, 2]);
    }

    #[test]
    fn test_non_grouped_column_is_semantic_error() {
        // SELECT a.i, sum(a.j) FROM a
        let req = vec![Expr::col("a", "i"), agg(AggKind::Sum, Expr::col("a", "j"))];
        let mut node = LogicNode::aggregate(
            LogicNode::scan_table(table("a", &["i", "j"])),
            Vec::new(),
            None,
        );
        let err = node.resolve(&req, true).unwrap_err();
        match err {
            PlannerError::SemanticAnalyze(msg) => assert!(msg.contains("a.i")),
            other => panic!("Expected SemanticAnalyze, got {:?}", other),
        }
    }

    #[test]
    fn test_mark_join_emits_marker() {
        use crate::planner::logical::marker_col;

        let pred = Expr::binary(BinOp::Eq, Expr::col("b", "j"), Expr::col("a", "i"));
        let join = LogicNode::mark_join(
            JoinKind::Mark,
            0,
            Some(pred),
            LogicNode::scan_table(table("a", &["i"])),
            LogicNode::scan_table(table("b", &["j"])),
        );
        let mut filter = LogicNode::filter_node(marker_col(0), join);
        filter.resolve(&[Expr::col("a", "i")], true).unwrap();

        // the join output carries the marker column after the requested columns
        let join = &filter.children[0];
        assert!(join.output.iter().any(is_marker));
        // and the enclosing filter resolves the marker to its position
        match filter.filter.as_ref().unwrap() {
            Expr::ColRef(c) => {
                assert_eq!(c.col_name, marker_name(0));
                assert_eq!(c.ordinal, 1);
            }
            other => panic!("Expected marker reference, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_output_stays_empty() {
        let row = vec![
            Expr::literal(Literal::Integer(1), DataType::BigInt),
            Expr::literal(Literal::String("x".to_string()), DataType::Text),
        ];
        let mut node = LogicNode::insert(
            table("users", &["id", "name"]),
            vec!["id".to_string(), "name".to_string()],
            LogicNode::result(),
        );
        node.resolve(&row, false).unwrap();
        assert!(node.output.is_empty());
        assert_eq!(node.children[0].output.len(), 2);
    }
}
