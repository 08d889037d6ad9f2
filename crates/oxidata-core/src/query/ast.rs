//! Typed query AST.
//!
//! Every system option parses into one of these tagged variants before any
//! planning happens. Operator kinds carry their SQL rendering so no later
//! stage re-validates a stringly-typed operator.

use serde::{Deserialize, Serialize};

// ============================================================================
// Literals
// ============================================================================

/// A literal value appearing in a query option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Whether this literal is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for oxidata_sql::SqlParam {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Integer(i) => Self::Int(i),
            Value::Real(r) => Self::Real(r),
            Value::Text(s) => Self::Text(s),
        }
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `lt`
    Lt,
    /// `le`
    Le,
    /// `gt`
    Gt,
    /// `ge`
    Ge,
}

impl CompareOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// String predicate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringOp {
    /// `contains(field, 'v')`
    Contains,
    /// `startswith(field, 'v')`
    StartsWith,
    /// `endswith(field, 'v')`
    EndsWith,
}

impl StringOp {
    /// Build the LIKE pattern for a bound value. The wildcard travels with
    /// the parameter, never with the SQL text.
    pub fn like_pattern(self, value: &str) -> String {
        match self {
            Self::Contains => format!("%{}%", value),
            Self::StartsWith => format!("{}%", value),
            Self::EndsWith => format!("%{}", value),
        }
    }
}

/// A filter expression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    StringPred {
        field: String,
        op: StringOp,
        value: String,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn and(left: FilterExpr, right: FilterExpr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: FilterExpr, right: FilterExpr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: FilterExpr) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Visit every field reference in the tree.
    pub fn visit_fields<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Self::Compare { field, .. }
            | Self::StringPred { field, .. }
            | Self::In { field, .. } => visit(field),
            Self::And(l, r) | Self::Or(l, r) => {
                l.visit_fields(visit);
                r.visit_fields(visit);
            }
            Self::Not(inner) => inner.visit_fields(visit),
        }
    }
}

// ============================================================================
// Ordering and Paging
// ============================================================================

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `$orderby` term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

// ============================================================================
// Expand
// ============================================================================

/// One `$expand` item, possibly with nested options.
///
/// Per-expand `top`/`skip` apply at the outer query, bounding the joined row
/// set rather than the child set. That matches the wire behavior this
/// service inherited; child-level limits would need correlated subqueries.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpandItem {
    /// Navigation name (the FK's wire alias).
    pub path: String,
    pub select: Option<Vec<String>>,
    pub filter: Option<FilterExpr>,
    pub order_by: Option<Vec<OrderKey>>,
    pub top: Option<i64>,
    pub skip: Option<i64>,
    pub nested: Vec<ExpandItem>,
}

impl ExpandItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Aggregation and Compute
// ============================================================================

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "count" => Some(Self::Count),
            _ => None,
        }
    }
}

/// One `aggregate(source with op as alias)` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub source: String,
    pub op: AggregateOp,
    pub alias: String,
}

/// Parsed `$apply`.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Apply {
    pub group_by: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    /// Post-grouping predicate over group-by fields or aggregate aliases.
    pub having: Option<FilterExpr>,
}

/// One `$compute` entry: a validated expression and its alias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeItem {
    pub expression: String,
    pub alias: String,
}

// ============================================================================
// Query
// ============================================================================

/// A fully parsed set of system options. Absent fields mean "unspecified".
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub filter: Option<FilterExpr>,
    pub select: Option<Vec<String>>,
    pub order_by: Option<Vec<OrderKey>>,
    pub top: Option<i64>,
    pub skip: Option<i64>,
    pub expand: Option<Vec<ExpandItem>>,
    pub search: Option<String>,
    pub apply: Option<Apply>,
    pub compute: Option<Vec<ComputeItem>>,
    pub count: bool,
    pub delta_token: Option<String>,
}

impl Query {
    /// Whether any option was given at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
