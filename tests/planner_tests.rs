//! Query planner integration tests
//!
//! Drives the full pipeline from SQL text: parse -> bind -> rewrite ->
//! resolve -> translate -> print.

use quillsql::catalog::{Catalog, ColumnDef, DataType, TableDef};
use quillsql::planner::{
    Explain, Expr, JoinKind, LogicOp, Optimizer, PhysicKind, PhysicNode, Planner, PlannerError,
    PlannerOptions,
};
use quillsql::sql::{Binder, Parser, SqlError};

/// Create a test catalog with small generic tables plus a TPC-H subset
fn test_catalog() -> Catalog {
    let mut catalog = Catalog::new();

    for name in ["a", "b", "c", "d"] {
        let t = TableDef::new(name)
            .column(ColumnDef::new("i", DataType::Int))
            .column(ColumnDef::new("j", DataType::Int))
            .column(ColumnDef::new("k", DataType::Int));
        catalog.create_table(t).unwrap();
    }

    let t = TableDef::new("t")
        .column(ColumnDef::new("a1", DataType::Int))
        .column(ColumnDef::new("a2", DataType::Int))
        .column(ColumnDef::new("a3", DataType::Int));
    catalog.create_table(t).unwrap();

    let orders = TableDef::new("orders")
        .column(ColumnDef::new("o_orderkey", DataType::Int).nullable(false))
        .column(ColumnDef::new("o_orderdate", DataType::Date))
        .column(ColumnDef::new("o_orderpriority", DataType::Varchar(15)));
    catalog.create_table(orders).unwrap();

    let lineitem = TableDef::new("lineitem")
        .column(ColumnDef::new("l_orderkey", DataType::Int).nullable(false))
        .column(ColumnDef::new("l_commitdate", DataType::Date))
        .column(ColumnDef::new("l_receiptdate", DataType::Date));
    catalog.create_table(lineitem).unwrap();

    let prices = TableDef::external("prices", "prices.csv")
        .column(ColumnDef::new("p_id", DataType::Int))
        .column(ColumnDef::new("p_val", DataType::Double));
    catalog.create_table(prices).unwrap();

    catalog
}

/// Run the full planning pipeline
fn plan_sql(catalog: &Catalog, sql: &str, options: &PlannerOptions) -> PhysicNode {
    try_plan_sql(catalog, sql, options).unwrap()
}

fn try_plan_sql(
    catalog: &Catalog,
    sql: &str,
    options: &PlannerOptions,
) -> Result<PhysicNode, PlannerError> {
    let stmt = Parser::parse_one(sql).unwrap();
    let bound = Binder::new(catalog).bind(stmt).unwrap();
    Planner::plan(bound, options)
}

fn filter_text(node: &PhysicNode) -> String {
    node.filter().map(|f| f.to_string()).unwrap_or_default()
}

fn scan_table_name(node: &PhysicNode) -> &str {
    match &node.unwrap_profiling().logic.as_ref().unwrap().op {
        LogicOp::ScanTable { table } => &table.name,
        other => panic!("Expected table scan, got {:?}", other),
    }
}

// ============ TPC-H Q4 Shape ============

const Q4: &str = "SELECT o_orderpriority, count(*) FROM orders \
     WHERE o_orderdate >= '1993-07-01' \
       AND o_orderdate < '1993-07-01' + interval '3' month \
       AND EXISTS (SELECT * FROM lineitem \
                   WHERE l_orderkey = o_orderkey AND l_commitdate < l_receiptdate) \
     GROUP BY o_orderpriority \
     ORDER BY o_orderpriority";

#[test]
fn test_q4_physical_shape() {
    let catalog = test_catalog();
    let plan = plan_sql(&catalog, Q4, &PlannerOptions::default());

    // root-down: Order -> HashAgg -> Filter -> MarkJoin -> [orders, lineitem]
    assert_eq!(plan.kind, PhysicKind::Order);
    let agg = &plan.children()[0];
    assert_eq!(agg.kind, PhysicKind::HashAgg);
    let filter = &agg.children()[0];
    assert_eq!(filter.kind, PhysicKind::Filter);
    let join = &filter.children()[0];
    assert_eq!(join.kind, PhysicKind::MarkJoin);

    // the enclosing filter's predicate is the marker column
    assert_eq!(filter_text(filter), "#marker@0[1]");

    // the mark join's predicate is the consumed correlated equality
    assert_eq!(
        filter_text(join),
        "lineitem.l_orderkey[2]=orders.o_orderkey[1]"
    );

    // both date conjuncts were pushed into the orders scan
    let orders = &join.children()[0];
    assert_eq!(orders.kind, PhysicKind::ScanTable);
    assert_eq!(scan_table_name(orders), "orders");
    let orders_filter = filter_text(orders);
    assert!(orders_filter.contains("o_orderdate[1]>='1993-07-01'"));
    assert!(orders_filter.contains("interval '3' month"));

    // the uncorrelated subquery conjunct was pushed into the lineitem scan
    let lineitem = &join.children()[1];
    assert_eq!(lineitem.kind, PhysicKind::ScanTable);
    assert_eq!(scan_table_name(lineitem), "lineitem");
    assert_eq!(
        filter_text(lineitem),
        "lineitem.l_commitdate[1]<lineitem.l_receiptdate[2]"
    );
}

#[test]
fn test_q4_aggregate_wiring() {
    let catalog = test_catalog();
    let plan = plan_sql(&catalog, Q4, &PlannerOptions::default());

    let agg = &plan.children()[0];
    match &agg.logic.as_ref().unwrap().op {
        LogicOp::Aggregate {
            group_keys,
            agg_core,
            ..
        } => {
            assert_eq!(group_keys.len(), 1);
            assert_eq!(agg_core.len(), 1);
            assert_eq!(agg_core[0].to_string(), "count(*)");
        }
        other => panic!("Expected aggregate, got {:?}", other),
    }
    // output: group key at position 0, count at position 1
    assert_eq!(
        agg.output()
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>(),
        vec!["{orders.o_orderpriority[0]}[0]", "{count(*)}[1]"]
    );
}

// ============ Join Strategy Selection ============

#[test]
fn test_hashable_inner_join() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT a.i FROM a, b WHERE a.i = b.j",
        &PlannerOptions::default(),
    );

    // the equality was absorbed as the join predicate, no residual filter
    assert_eq!(plan.kind, PhysicKind::HashJoin);
    assert_eq!(filter_text(&plan), "a.i[0]=b.j[1]");
    assert!(plan.children()[0].filter().is_none());
    assert!(plan.children()[1].filter().is_none());
}

#[test]
fn test_non_hashable_join_falls_back_to_nl() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT * FROM a, b WHERE a.i < b.j",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::NLJoin);
    assert_eq!(filter_text(&plan), "a.i[0]<b.j[4]");
}

#[test]
fn test_enable_hashjoin_false_forces_nl() {
    let catalog = test_catalog();
    let options = PlannerOptions {
        enable_hashjoin: false,
        ..Default::default()
    };
    let plan = plan_sql(&catalog, "SELECT a.i FROM a, b WHERE a.i = b.j", &options);
    assert_eq!(plan.kind, PhysicKind::NLJoin);
}

#[test]
fn test_enable_nljoin_false_is_planner_error() {
    let catalog = test_catalog();
    let options = PlannerOptions {
        enable_nljoin: false,
        ..Default::default()
    };
    let err = try_plan_sql(&catalog, "SELECT * FROM a, b WHERE a.i < b.j", &options).unwrap_err();
    assert!(matches!(err, PlannerError::NotImplemented(_)));

    // a hashable join still plans
    let plan = plan_sql(&catalog, "SELECT a.i FROM a, b WHERE a.i = b.j", &options);
    assert_eq!(plan.kind, PhysicKind::HashJoin);
}

// ============ Subquery Rewriting ============

#[test]
fn test_correlated_scalar_subquery_single_join() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT a.i, (SELECT max(b.j) FROM b WHERE b.k = a.k) FROM a",
        &PlannerOptions::default(),
    );

    // root is a single join whose right side is the aggregate over b
    assert_eq!(plan.kind, PhysicKind::SingleJoin);
    assert_eq!(filter_text(&plan), "b.k[3]=a.k[1]");

    let right = &plan.children()[1];
    assert_eq!(right.kind, PhysicKind::HashAgg);
    match &right.logic.as_ref().unwrap().op {
        LogicOp::Aggregate {
            group_keys,
            agg_core,
            ..
        } => {
            // the correlation column was hoisted into the group keys
            assert_eq!(group_keys.len(), 1);
            assert_eq!(group_keys[0].to_string(), "b.k[0]");
            assert_eq!(agg_core[0].to_string(), "max(b.j[1])");
        }
        other => panic!("Expected aggregate, got {:?}", other),
    }
}

#[test]
fn test_in_subquery_mark_join() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT a.i FROM a WHERE a.i IN (SELECT b.j FROM b)",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::Filter);
    assert!(filter_text(&plan).starts_with("#marker@0"));
    let join = &plan.children()[0];
    assert_eq!(join.kind, PhysicKind::MarkJoin);
    assert_eq!(filter_text(join), "a.i[0]=b.j[1]");
}

#[test]
fn test_not_exists_negates_marker() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT a.i FROM a WHERE NOT EXISTS (SELECT * FROM b WHERE b.j = a.i)",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::Filter);
    assert_eq!(filter_text(&plan), "not(#marker@0[1])");
    assert_eq!(plan.children()[0].kind, PhysicKind::MarkJoin);
}

#[test]
fn test_rewrite_disabled_keeps_subquery_expression() {
    let catalog = test_catalog();
    let options = PlannerOptions {
        enable_subquery_to_markjoin: false,
        ..Default::default()
    };
    let plan = plan_sql(
        &catalog,
        "SELECT a.i FROM a WHERE EXISTS (SELECT * FROM b WHERE b.j = a.i)",
        &options,
    );

    let text = Explain::format(&plan);
    assert!(!text.contains("PhysicMarkJoin"));
    // the subquery survives as an expression and its plan is rendered
    // beneath the filter that owns it
    assert!(text.contains("Filter: @0"));
    assert!(text.contains("Subquery 0:"));
}

#[test]
fn test_rewrite_is_idempotent() {
    let catalog = test_catalog();
    let stmt = Parser::parse_one(Q4).unwrap();
    let bound = Binder::new(&catalog).bind(stmt).unwrap();

    let optimizer = Optimizer::new(&PlannerOptions::default());
    let once = optimizer.rewrite(bound).unwrap();
    let twice = optimizer.rewrite(once.clone()).unwrap();
    assert_eq!(once, twice);
}

// ============ Aggregate Validation ============

#[test]
fn test_non_grouped_column_error() {
    let catalog = test_catalog();
    let err = try_plan_sql(
        &catalog,
        "SELECT a.i, sum(a.j) FROM a",
        &PlannerOptions::default(),
    )
    .unwrap_err();

    match err {
        PlannerError::SemanticAnalyze(msg) => {
            assert!(msg.contains("a.i"), "error should name a.i: {}", msg);
            assert!(msg.contains("group by"));
        }
        other => panic!("Expected SemanticAnalyze, got {:?}", other),
    }
}

#[test]
fn test_aggregate_ordinal_wiring() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT a1, cos(a1*7)+sum(a1), sum(a1)+sum(a2+a3)*2 FROM t GROUP BY a1",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::HashAgg);
    match &plan.logic.as_ref().unwrap().op {
        LogicOp::Aggregate { agg_core, .. } => {
            // exactly two aggregates, in discovery order
            assert_eq!(agg_core.len(), 2);
            assert_eq!(agg_core[0].to_string(), "sum(t.a1[0])");
            assert_eq!(agg_core[1].to_string(), "sum({t.a2+t.a3}[1])");
        }
        other => panic!("Expected aggregate, got {:?}", other),
    }

    // the output expressions reference the aggregate row positions 1 and 2
    let rendered: Vec<String> = plan.output().iter().map(|e| e.to_string()).collect();
    assert_eq!(rendered[0], "{t.a1[0]}[0]");
    assert_eq!(rendered[1], "cos({t.a1[0]}[0]*7)+{sum(t.a1[0])}[1]");
    assert_eq!(rendered[2], "{sum(t.a1[0])}[1]+{sum({t.a2+t.a3}[1])}[2]*2");
}

// ============ Resolution Invariants ============

fn check_resolved_exprs(node: &PhysicNode) {
    fn check(e: &Expr) -> bool {
        match e {
            // an already-resolved wrapper is not re-descended
            Expr::Ref(_) => true,
            Expr::ColRef(c) => c.outer_ref || c.ordinal >= 0,
            Expr::Binary(b) => check(&b.left) && check(&b.right),
            Expr::Func(f) => f.args.iter().all(check),
            Expr::Agg(a) => a.arg.as_deref().map(check).unwrap_or(true),
            Expr::Subquery(s) => s.lhs.as_deref().map(check).unwrap_or(true),
            Expr::Literal(_) => true,
        }
    }

    if let Some(f) = node.filter() {
        assert!(check(f), "unresolved column in filter: {}", f);
    }
    for e in node.output() {
        assert!(check(e), "unresolved column in output: {}", e);
    }
    for child in node.children() {
        check_resolved_exprs(child);
    }
}

#[test]
fn test_every_column_resolved_or_outer() {
    let catalog = test_catalog();
    let queries = [
        Q4,
        "SELECT a.i FROM a, b WHERE a.i = b.j",
        "SELECT * FROM a, b WHERE a.i < b.j",
        "SELECT a.i, (SELECT max(b.j) FROM b WHERE b.k = a.k) FROM a",
        "SELECT v.x, v.y FROM (SELECT i AS x, j AS y FROM a WHERE k > 0) v",
        "SELECT o_orderpriority, count(*) FROM orders GROUP BY o_orderpriority",
    ];
    for sql in queries {
        let plan = plan_sql(&catalog, sql, &PlannerOptions::default());
        check_resolved_exprs(&plan);
    }
}

// ============ Other Node Kinds ============

#[test]
fn test_from_query_plan() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT v.x FROM (SELECT i AS x FROM a) v",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::FromQuery);
    assert_eq!(plan.children()[0].kind, PhysicKind::ScanTable);
    assert_eq!(plan.output()[0].to_string(), "v.x[0]");
}

#[test]
fn test_external_file_scan() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT p_id FROM prices WHERE p_val > 10",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::ScanFile);
    assert_eq!(filter_text(&plan), "prices.p_val[1]>10");
    let text = Explain::format(&plan);
    assert!(text.contains("PhysicScanFile 'prices.csv' as prices"));
}

#[test]
fn test_insert_select_plan() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "INSERT INTO a (i, j, k) SELECT i, j, k FROM b",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::Insert);
    assert!(plan.output().is_empty());
    assert_eq!(plan.children()[0].kind, PhysicKind::ScanTable);
    assert_eq!(plan.children()[0].output().len(), 3);
}

#[test]
fn test_insert_values_plan() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "INSERT INTO a (i, j, k) VALUES (1, 2, 3)",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::Insert);
    assert_eq!(plan.children()[0].kind, PhysicKind::Result);
    assert_eq!(plan.children()[0].output().len(), 3);
}

#[test]
fn test_ambiguous_column_is_bind_error() {
    let catalog = test_catalog();
    let stmt = Parser::parse_one("SELECT i FROM a, b").unwrap();
    let err = Binder::new(&catalog).bind(stmt).unwrap_err();
    assert!(matches!(err, SqlError::AmbiguousColumn(_)));
}

// ============ Memo Routing ============

#[test]
fn test_memo_routing_matches_direct_translation() {
    let catalog = test_catalog();
    let direct = plan_sql(&catalog, Q4, &PlannerOptions::default());
    let via_memo = plan_sql(
        &catalog,
        Q4,
        &PlannerOptions {
            use_memo: true,
            ..Default::default()
        },
    );

    assert_eq!(direct, via_memo);
    assert_eq!(Explain::format(&direct), Explain::format(&via_memo));
}

// ============ Plan Printing ============

#[test]
fn test_explain_deterministic() {
    let catalog = test_catalog();
    let plan = plan_sql(&catalog, Q4, &PlannerOptions::default());
    assert_eq!(Explain::format(&plan), Explain::format(&plan));

    // an independently planned copy renders byte-identically
    let again = plan_sql(&catalog, Q4, &PlannerOptions::default());
    assert_eq!(Explain::format(&plan), Explain::format(&again));
}

#[test]
fn test_explain_q4_layout() {
    let catalog = test_catalog();
    let plan = plan_sql(&catalog, Q4, &PlannerOptions::default());
    let text = Explain::format(&plan);

    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("PhysicOrder"));
    assert!(lines[0].contains("(cost="));
    assert!(text.contains("    -> PhysicHashAgg"));
    assert!(text.contains("        -> PhysicFilter"));
    assert!(text.contains("            -> PhysicMarkJoin (Left)"));
    assert!(text.contains("PhysicScanTable orders"));
    assert!(text.contains("PhysicScanTable lineitem"));
    assert!(text.contains("Order by: orders.o_orderpriority[0]"));
    assert!(text.contains("Group by: orders.o_orderpriority[0]"));
    assert!(text.contains("Aggregates: count(*)"));
}

#[test]
fn test_profiling_invisible_in_output_and_equality() {
    let catalog = test_catalog();
    let bare = plan_sql(&catalog, Q4, &PlannerOptions::default());
    let mut profiled = plan_sql(
        &catalog,
        Q4,
        &PlannerOptions {
            profiling_enabled: true,
            ..Default::default()
        },
    );

    assert_eq!(profiled.kind, PhysicKind::Profiling);
    assert_eq!(profiled, bare);
    assert_eq!(Explain::format(&profiled), Explain::format(&bare));

    // observed row counts render on the wrapped node once recorded
    profiled.set_profile_rows(5);
    let text = Explain::format(&profiled);
    assert!(text.lines().next().unwrap().contains("(rows=5)"));
}

// ============ Join Kind Preservation ============

#[test]
fn test_left_join_preserved() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT a.i FROM a LEFT JOIN b ON a.i = b.j",
        &PlannerOptions::default(),
    );

    assert_eq!(plan.kind, PhysicKind::HashJoin);
    match &plan.logic.as_ref().unwrap().op {
        LogicOp::Join { kind, .. } => assert_eq!(*kind, JoinKind::Left),
        other => panic!("Expected join, got {:?}", other),
    }
    let text = Explain::format(&plan);
    assert!(text.contains("PhysicHashJoin (Left)"));
}
