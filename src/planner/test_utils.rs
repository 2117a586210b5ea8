//! Shared test utilities for planner module tests

use crate::catalog::{Catalog, ColumnDef, DataType, TableDef};

/// Create a test catalog with small generic tables plus a TPC-H subset
pub fn test_catalog() -> Catalog {
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
