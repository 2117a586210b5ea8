//! Internal AST types
//!
//! These types represent parsed SQL statements in a form that's easier
//! to work with than the sqlparser AST. Only the SELECT core (plus INSERT)
//! survives conversion; everything else is rejected at the parse boundary.

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Date interval, normalized to months and days
    Interval { months: i32, days: i32 },
}

impl std::hash::Hash for Literal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Literal::Null => 0u8.hash(state),
            Literal::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Literal::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Literal::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state);
            }
            Literal::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Literal::Interval { months, days } => {
                5u8.hash(state);
                months.hash(state);
                days.hash(state);
            }
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
}

impl BinOp {
    /// Arithmetic operators
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    /// Comparison operators (boolean result)
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        )
    }

    /// Logical connectives
    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "=",
            BinOp::NotEq => "<>",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => " and ",
            BinOp::Or => " or ",
            BinOp::Like => " like ",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression (before binding)
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference (optionally qualified with table name)
    Column { table: Option<String>, name: String },
    /// Literal value
    Literal(Literal),
    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Unary operation
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Function call (includes aggregate functions before binding)
    Function { name: String, args: Vec<Expr> },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// EXISTS (subquery)
    Exists {
        query: Box<SelectStatement>,
        negated: bool,
    },
    /// expr IN (subquery)
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectStatement>,
        negated: bool,
    },
    /// Scalar subquery
    ScalarSubquery(Box<SelectStatement>),
    /// Wildcard, valid only as count(*) argument
    Wildcard,
}

/// SELECT item (column in SELECT list)
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// Expression with optional alias
    Expr { expr: Expr, alias: Option<String> },
    /// Wildcard (*)
    Wildcard,
    /// Qualified wildcard (table.*)
    QualifiedWildcard(String),
}

/// Table factor in FROM clause
#[derive(Debug, Clone, PartialEq)]
pub enum TableFactor {
    /// Named table, optionally aliased
    Table { name: String, alias: Option<String> },
    /// Derived table (subquery in FROM)
    Derived {
        query: Box<SelectStatement>,
        alias: String,
    },
}

/// JOIN type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// JOIN clause
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub factor: TableFactor,
    pub join_type: JoinType,
    pub condition: Option<Expr>,
}

/// ORDER BY item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub ascending: bool,
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub columns: Vec<SelectItem>,
    pub from: Vec<TableFactor>,
    pub joins: Vec<Join>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
}

/// INSERT row source
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// Single VALUES row
    Values(Vec<Expr>),
    /// INSERT ... SELECT
    Query(Box<SelectStatement>),
}

/// SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT query
    Select(SelectStatement),
    /// INSERT
    Insert {
        table: String,
        columns: Vec<String>,
        source: InsertSource,
    },
}
