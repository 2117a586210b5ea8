//! SQL parser wrapper around sqlparser crate
//!
//! Parses SQL text and converts the sqlparser AST into the internal
//! SELECT-core AST. Features outside the supported core (DDL, set
//! operations, LIMIT, DISTINCT, window functions) are rejected here.

use sqlparser::ast as sp;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser as SqlParser;

use crate::sql::ast::*;
use crate::sql::error::{SqlError, SqlResult};

/// SQL parser
pub struct Parser;

impl Parser {
    /// Parse a single SQL statement
    pub fn parse_one(sql: &str) -> SqlResult<Statement> {
        let dialect = MySqlDialect {};
        let ast = SqlParser::parse_sql(&dialect, sql)?;

        if ast.is_empty() {
            return Err(SqlError::Parse("empty SQL statement".to_string()));
        }
        if ast.len() > 1 {
            return Err(SqlError::Parse(
                "multiple statements not supported".to_string(),
            ));
        }

        convert_statement(ast.into_iter().next().unwrap())
    }
}

fn convert_statement(stmt: sp::Statement) -> SqlResult<Statement> {
    match stmt {
        sp::Statement::Query(query) => Ok(Statement::Select(convert_query(*query)?)),
        sp::Statement::Insert(insert) => convert_insert(insert),
        other => Err(SqlError::Unsupported(format!("statement: {}", other))),
    }
}

fn convert_insert(insert: sp::Insert) -> SqlResult<Statement> {
    let table = object_name(&insert.table_name)?;
    let columns = insert.columns.iter().map(|c| c.value.clone()).collect();

    let source = match insert.source {
        Some(query) => match *query.body {
            sp::SetExpr::Values(values) => {
                if values.rows.len() != 1 {
                    return Err(SqlError::Unsupported(
                        "multi-row VALUES".to_string(),
                    ));
                }
                let row = values
                    .rows
                    .into_iter()
                    .next()
                    .unwrap()
                    .iter()
                    .map(convert_expr)
                    .collect::<SqlResult<Vec<_>>>()?;
                InsertSource::Values(row)
            }
            _ => InsertSource::Query(Box::new(convert_query(*query)?)),
        },
        None => {
            return Err(SqlError::Unsupported(
                "INSERT without a row source".to_string(),
            ))
        }
    };

    Ok(Statement::Insert {
        table,
        columns,
        source,
    })
}

fn convert_query(query: sp::Query) -> SqlResult<SelectStatement> {
    if query.limit.is_some() || query.offset.is_some() {
        return Err(SqlError::Unsupported("LIMIT/OFFSET".to_string()));
    }
    if query.with.is_some() {
        return Err(SqlError::Unsupported("WITH".to_string()));
    }

    let mut select = match *query.body {
        sp::SetExpr::Select(select) => convert_select(*select)?,
        sp::SetExpr::Query(inner) => convert_query(*inner)?,
        _ => return Err(SqlError::Unsupported("set operation".to_string())),
    };

    for item in query.order_by {
        let ascending = item.asc.unwrap_or(true);
        select.order_by.push(OrderByItem {
            expr: convert_expr(&item.expr)?,
            ascending,
        });
    }

    Ok(select)
}

fn convert_select(select: sp::Select) -> SqlResult<SelectStatement> {
    if select.distinct.is_some() {
        return Err(SqlError::Unsupported("DISTINCT".to_string()));
    }

    let mut columns = Vec::new();
    for item in &select.projection {
        columns.push(convert_select_item(item)?);
    }

    let mut from = Vec::new();
    let mut joins = Vec::new();
    for twj in &select.from {
        from.push(convert_table_factor(&twj.relation)?);
        for join in &twj.joins {
            joins.push(convert_join(join)?);
        }
    }

    let filter = select.selection.as_ref().map(convert_expr).transpose()?;

    let group_by = match &select.group_by {
        sp::GroupByExpr::Expressions(exprs) => exprs
            .iter()
            .map(convert_expr)
            .collect::<SqlResult<Vec<_>>>()?,
        _ => return Err(SqlError::Unsupported("GROUP BY ALL".to_string())),
    };

    let having = select.having.as_ref().map(convert_expr).transpose()?;

    Ok(SelectStatement {
        columns,
        from,
        joins,
        filter,
        group_by,
        having,
        order_by: Vec::new(),
    })
}

fn convert_select_item(item: &sp::SelectItem) -> SqlResult<SelectItem> {
    match item {
        sp::SelectItem::UnnamedExpr(e) => Ok(SelectItem::Expr {
            expr: convert_expr(e)?,
            alias: None,
        }),
        sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
            expr: convert_expr(expr)?,
            alias: Some(alias.value.clone()),
        }),
        sp::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        sp::SelectItem::QualifiedWildcard(name, _) => {
            Ok(SelectItem::QualifiedWildcard(object_name(name)?))
        }
    }
}

fn convert_table_factor(factor: &sp::TableFactor) -> SqlResult<TableFactor> {
    match factor {
        sp::TableFactor::Table { name, alias, .. } => Ok(TableFactor::Table {
            name: object_name(name)?,
            alias: alias.as_ref().map(|a| a.name.value.clone()),
        }),
        sp::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let alias = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .ok_or_else(|| {
                    SqlError::InvalidOperation("derived table requires an alias".to_string())
                })?;
            Ok(TableFactor::Derived {
                query: Box::new(convert_query((**subquery).clone())?),
                alias,
            })
        }
        _ => Err(SqlError::Unsupported("table factor".to_string())),
    }
}

fn convert_join(join: &sp::Join) -> SqlResult<Join> {
    let (join_type, constraint) = match &join.join_operator {
        sp::JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
        sp::JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
        sp::JoinOperator::RightOuter(c) => (JoinType::Right, Some(c)),
        sp::JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
        sp::JoinOperator::CrossJoin => (JoinType::Cross, None),
        _ => return Err(SqlError::Unsupported("join operator".to_string())),
    };

    let condition = match constraint {
        Some(sp::JoinConstraint::On(e)) => Some(convert_expr(e)?),
        Some(sp::JoinConstraint::None) | None => None,
        Some(_) => return Err(SqlError::Unsupported("join constraint".to_string())),
    };

    Ok(Join {
        factor: convert_table_factor(&join.relation)?,
        join_type,
        condition,
    })
}

fn convert_binop(op: &sp::BinaryOperator) -> SqlResult<BinOp> {
    match op {
        sp::BinaryOperator::Plus => Ok(BinOp::Add),
        sp::BinaryOperator::Minus => Ok(BinOp::Sub),
        sp::BinaryOperator::Multiply => Ok(BinOp::Mul),
        sp::BinaryOperator::Divide => Ok(BinOp::Div),
        sp::BinaryOperator::Modulo => Ok(BinOp::Mod),
        sp::BinaryOperator::Eq => Ok(BinOp::Eq),
        sp::BinaryOperator::NotEq => Ok(BinOp::NotEq),
        sp::BinaryOperator::Lt => Ok(BinOp::Lt),
        sp::BinaryOperator::LtEq => Ok(BinOp::LtEq),
        sp::BinaryOperator::Gt => Ok(BinOp::Gt),
        sp::BinaryOperator::GtEq => Ok(BinOp::GtEq),
        sp::BinaryOperator::And => Ok(BinOp::And),
        sp::BinaryOperator::Or => Ok(BinOp::Or),
        other => Err(SqlError::Unsupported(format!("binary operator: {}", other))),
    }
}

fn convert_expr(expr: &sp::Expr) -> SqlResult<Expr> {
    match expr {
        sp::Expr::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: ident.value.clone(),
        }),
        sp::Expr::CompoundIdentifier(parts) => {
            if parts.len() != 2 {
                return Err(SqlError::Unsupported(
                    "deeply qualified identifier".to_string(),
                ));
            }
            Ok(Expr::Column {
                table: Some(parts[0].value.clone()),
                name: parts[1].value.clone(),
            })
        }
        sp::Expr::Value(value) => Ok(Expr::Literal(convert_value(value)?)),
        sp::Expr::BinaryOp { left, op, right } => Ok(Expr::Binary {
            left: Box::new(convert_expr(left)?),
            op: convert_binop(op)?,
            right: Box::new(convert_expr(right)?),
        }),
        sp::Expr::UnaryOp { op, expr } => match op {
            sp::UnaryOperator::Not => Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(convert_expr(expr)?),
            }),
            sp::UnaryOperator::Minus => Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(convert_expr(expr)?),
            }),
            sp::UnaryOperator::Plus => convert_expr(expr),
            _ => Err(SqlError::Unsupported("unary operator".to_string())),
        },
        sp::Expr::Nested(inner) => convert_expr(inner),
        sp::Expr::Function(func) => convert_function(func),
        sp::Expr::IsNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(convert_expr(inner)?),
            negated: false,
        }),
        sp::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(convert_expr(inner)?),
            negated: true,
        }),
        sp::Expr::Exists { subquery, negated } => Ok(Expr::Exists {
            query: Box::new(convert_query((**subquery).clone())?),
            negated: *negated,
        }),
        sp::Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => Ok(Expr::InSubquery {
            expr: Box::new(convert_expr(expr)?),
            query: Box::new(convert_query((**subquery).clone())?),
            negated: *negated,
        }),
        sp::Expr::Subquery(subquery) => Ok(Expr::ScalarSubquery(Box::new(convert_query(
            (**subquery).clone(),
        )?))),
        // BETWEEN low AND high desugars to two comparisons
        sp::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let e = convert_expr(expr)?;
            let both = Expr::Binary {
                left: Box::new(Expr::Binary {
                    left: Box::new(e.clone()),
                    op: BinOp::GtEq,
                    right: Box::new(convert_expr(low)?),
                }),
                op: BinOp::And,
                right: Box::new(Expr::Binary {
                    left: Box::new(e),
                    op: BinOp::LtEq,
                    right: Box::new(convert_expr(high)?),
                }),
            };
            Ok(negate_if(both, *negated))
        }
        // IN (v1, v2, ...) desugars to an OR chain of equalities
        sp::Expr::InList {
            expr,
            list,
            negated,
        } => {
            let e = convert_expr(expr)?;
            let mut chain: Option<Expr> = None;
            for item in list {
                let eq = Expr::Binary {
                    left: Box::new(e.clone()),
                    op: BinOp::Eq,
                    right: Box::new(convert_expr(item)?),
                };
                chain = Some(match chain {
                    Some(prev) => Expr::Binary {
                        left: Box::new(prev),
                        op: BinOp::Or,
                        right: Box::new(eq),
                    },
                    None => eq,
                });
            }
            let chain = chain
                .ok_or_else(|| SqlError::InvalidOperation("empty IN list".to_string()))?;
            Ok(negate_if(chain, *negated))
        }
        sp::Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => {
            let like = Expr::Binary {
                left: Box::new(convert_expr(expr)?),
                op: BinOp::Like,
                right: Box::new(convert_expr(pattern)?),
            };
            Ok(negate_if(like, *negated))
        }
        sp::Expr::Interval(interval) => convert_interval(interval).map(Expr::Literal),
        _ => Err(SqlError::Unsupported(format!("expression: {}", expr))),
    }
}

fn negate_if(expr: Expr, negated: bool) -> Expr {
    if negated {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    } else {
        expr
    }
}

fn convert_function(func: &sp::Function) -> SqlResult<Expr> {
    let name = func
        .name
        .0
        .last()
        .map(|i| i.value.to_lowercase())
        .ok_or_else(|| SqlError::InvalidOperation("unnamed function".to_string()))?;

    let args = match &func.args {
        sp::FunctionArguments::None => Vec::new(),
        sp::FunctionArguments::List(list) => {
            if list.duplicate_treatment.is_some() {
                return Err(SqlError::Unsupported("DISTINCT aggregate".to_string()));
            }
            let mut args = Vec::new();
            for arg in &list.args {
                match arg {
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => {
                        args.push(convert_expr(e)?)
                    }
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => {
                        args.push(Expr::Wildcard)
                    }
                    _ => return Err(SqlError::Unsupported("function argument".to_string())),
                }
            }
            args
        }
        sp::FunctionArguments::Subquery(_) => {
            return Err(SqlError::Unsupported("subquery function argument".to_string()))
        }
    };

    Ok(Expr::Function { name, args })
}

fn convert_value(value: &sp::Value) -> SqlResult<Literal> {
    match value {
        sp::Value::Number(n, _) => {
            if n.contains('.') || n.contains('e') || n.contains('E') {
                n.parse::<f64>()
                    .map(Literal::Float)
                    .map_err(|_| SqlError::Parse(format!("bad number: {}", n)))
            } else {
                n.parse::<i64>()
                    .map(Literal::Integer)
                    .map_err(|_| SqlError::Parse(format!("bad number: {}", n)))
            }
        }
        sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => {
            Ok(Literal::String(s.clone()))
        }
        sp::Value::Boolean(b) => Ok(Literal::Boolean(*b)),
        sp::Value::Null => Ok(Literal::Null),
        _ => Err(SqlError::Unsupported("literal".to_string())),
    }
}

fn convert_interval(interval: &sp::Interval) -> SqlResult<Literal> {
    let n: i32 = match interval.value.as_ref() {
        sp::Expr::Value(sp::Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|_| SqlError::Parse(format!("bad interval: {}", s)))?,
        sp::Expr::Value(sp::Value::Number(s, _)) => s
            .parse()
            .map_err(|_| SqlError::Parse(format!("bad interval: {}", s)))?,
        other => {
            return Err(SqlError::Unsupported(format!(
                "interval expression: {}",
                other
            )))
        }
    };

    match interval.leading_field {
        Some(sp::DateTimeField::Year) => Ok(Literal::Interval {
            months: n * 12,
            days: 0,
        }),
        Some(sp::DateTimeField::Month) => Ok(Literal::Interval { months: n, days: 0 }),
        Some(sp::DateTimeField::Day) => Ok(Literal::Interval { months: 0, days: n }),
        _ => Err(SqlError::Unsupported("interval unit".to_string())),
    }
}

fn object_name(name: &sp::ObjectName) -> SqlResult<String> {
    if name.0.len() != 1 {
        return Err(SqlError::Unsupported("qualified table name".to_string()));
    }
    Ok(name.0[0].value.clone())
}
