//! Data-source mapping contract
//!
//! Shapes exchanged with the generic data-access layer: query expression
//! trees, sort directions, index descriptors and query options. Operator and
//! direction names are the exact upper-case tags used by that layer.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tingo_common::{DriverError, Result};

/// Query operators recognized by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOperator {
    And,
    Or,
    Not,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    Regex,
}

/// Operator, upstream tag, native filter token; indexed by discriminant
const OPERATOR_TABLE: [(QueryOperator, &str, &str); 12] = [
    (QueryOperator::And, "AND", "$and"),
    (QueryOperator::Or, "OR", "$or"),
    (QueryOperator::Not, "NOT", "$not"),
    (QueryOperator::Equal, "EQUAL", "$eq"),
    (QueryOperator::NotEqual, "NOT_EQUAL", "$ne"),
    (QueryOperator::GreaterThan, "GREATER_THAN", "$gt"),
    (QueryOperator::GreaterThanOrEqual, "GREATER_THAN_OR_EQUAL", "$gte"),
    (QueryOperator::LessThan, "LESS_THAN", "$lt"),
    (QueryOperator::LessThanOrEqual, "LESS_THAN_OR_EQUAL", "$lte"),
    (QueryOperator::In, "IN", "$in"),
    (QueryOperator::NotIn, "NOT_IN", "$nin"),
    (QueryOperator::Regex, "REGEX", "$regex"),
];

impl QueryOperator {
    pub const ALL: [QueryOperator; 12] = [
        QueryOperator::And,
        QueryOperator::Or,
        QueryOperator::Not,
        QueryOperator::Equal,
        QueryOperator::NotEqual,
        QueryOperator::GreaterThan,
        QueryOperator::GreaterThanOrEqual,
        QueryOperator::LessThan,
        QueryOperator::LessThanOrEqual,
        QueryOperator::In,
        QueryOperator::NotIn,
        QueryOperator::Regex,
    ];

    /// Upstream tag, e.g. `GREATER_THAN_OR_EQUAL`
    pub fn as_str(&self) -> &'static str {
        OPERATOR_TABLE[*self as usize].1
    }

    /// Token used in native filters, e.g. `$gte`
    pub fn native_token(&self) -> &'static str {
        OPERATOR_TABLE[*self as usize].2
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, QueryOperator::And | QueryOperator::Or | QueryOperator::Not)
    }
}

impl FromStr for QueryOperator {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        OPERATOR_TABLE
            .iter()
            .find(|(_, tag, _)| *tag == s)
            .map(|(op, _, _)| *op)
            .ok_or_else(|| DriverError::UnknownOperator {
                operator: s.to_string(),
            })
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The comparison subset of [`QueryOperator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    Regex,
}

impl ComparisonOperator {
    pub fn operator(&self) -> QueryOperator {
        match self {
            ComparisonOperator::Equal => QueryOperator::Equal,
            ComparisonOperator::NotEqual => QueryOperator::NotEqual,
            ComparisonOperator::GreaterThan => QueryOperator::GreaterThan,
            ComparisonOperator::GreaterThanOrEqual => QueryOperator::GreaterThanOrEqual,
            ComparisonOperator::LessThan => QueryOperator::LessThan,
            ComparisonOperator::LessThanOrEqual => QueryOperator::LessThanOrEqual,
            ComparisonOperator::In => QueryOperator::In,
            ComparisonOperator::NotIn => QueryOperator::NotIn,
            ComparisonOperator::Regex => QueryOperator::Regex,
        }
    }
}

impl TryFrom<QueryOperator> for ComparisonOperator {
    type Error = DriverError;

    fn try_from(op: QueryOperator) -> Result<Self> {
        Ok(match op {
            QueryOperator::Equal => ComparisonOperator::Equal,
            QueryOperator::NotEqual => ComparisonOperator::NotEqual,
            QueryOperator::GreaterThan => ComparisonOperator::GreaterThan,
            QueryOperator::GreaterThanOrEqual => ComparisonOperator::GreaterThanOrEqual,
            QueryOperator::LessThan => ComparisonOperator::LessThan,
            QueryOperator::LessThanOrEqual => ComparisonOperator::LessThanOrEqual,
            QueryOperator::In => ComparisonOperator::In,
            QueryOperator::NotIn => ComparisonOperator::NotIn,
            QueryOperator::Regex => ComparisonOperator::Regex,
            logical => {
                return Err(DriverError::Query(format!(
                    "{} is not a comparison operator",
                    logical
                )))
            }
        })
    }
}

/// One node of a query tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Comparison {
        operator: ComparisonOperator,
        field: String,
        value: Bson,
    },
}

impl Expression {
    pub fn and(children: Vec<Expression>) -> Self {
        Expression::And(children)
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expression) -> Self {
        Expression::Not(Box::new(child))
    }

    pub fn compare(
        operator: ComparisonOperator,
        field: impl Into<String>,
        value: impl Into<Bson>,
    ) -> Self {
        Expression::Comparison {
            operator,
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::Equal, field, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::NotEqual, field, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::GreaterThan, field, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::GreaterThanOrEqual, field, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::LessThan, field, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::LessThanOrEqual, field, value)
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Bson>) -> Self {
        Self::compare(ComparisonOperator::In, field, Bson::Array(values))
    }

    pub fn not_in(field: impl Into<String>, values: Vec<Bson>) -> Self {
        Self::compare(ComparisonOperator::NotIn, field, Bson::Array(values))
    }

    pub fn regex(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(ComparisonOperator::Regex, field, value)
    }

    pub fn operator(&self) -> QueryOperator {
        match self {
            Expression::And(_) => QueryOperator::And,
            Expression::Or(_) => QueryOperator::Or,
            Expression::Not(_) => QueryOperator::Not,
            Expression::Comparison { operator, .. } => operator.operator(),
        }
    }

    /// Parse the upstream document form of a query tree
    ///
    /// - `{operator: "AND" | "OR", children: [...]}`
    /// - `{operator: "NOT", child: {...}}`
    /// - `{operator: <comparison>, field: "...", value: ...}`
    ///
    /// An unrecognized `operator` tag fails with `UnknownOperator`; a node
    /// missing its operands fails with `Query`.
    pub fn from_document(node: &Document) -> Result<Self> {
        let tag = node
            .get_str("operator")
            .map_err(|_| DriverError::Query(format!("expression has no operator: {}", node)))?;
        let operator = QueryOperator::from_str(tag)?;

        match operator {
            QueryOperator::And | QueryOperator::Or => {
                let children = node.get_array("children").map_err(|_| {
                    DriverError::Query(format!("{} expression requires a children array", operator))
                })?;
                let children = children
                    .iter()
                    .map(|child| match child {
                        Bson::Document(child) => Expression::from_document(child),
                        other => Err(DriverError::Query(format!(
                            "{} child must be an expression, got {}",
                            operator, other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(if operator == QueryOperator::And {
                    Expression::And(children)
                } else {
                    Expression::Or(children)
                })
            }
            QueryOperator::Not => {
                let child = node.get_document("child").map_err(|_| {
                    DriverError::Query("NOT expression requires exactly one child".to_string())
                })?;
                Ok(Expression::not(Expression::from_document(child)?))
            }
            comparison => {
                let field = node.get_str("field").map_err(|_| {
                    DriverError::Query(format!("{} expression requires a field", comparison))
                })?;
                let value = node.get("value").cloned().ok_or_else(|| {
                    DriverError::Query(format!("{} expression requires a value", comparison))
                })?;
                Ok(Expression::Comparison {
                    operator: ComparisonOperator::try_from(comparison)?,
                    field: field.to_string(),
                    value,
                })
            }
        }
    }
}

/// Sort / index direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    /// Native encoding: ascending `1`, descending `-1`
    pub fn native_order(&self) -> i32 {
        match self {
            OrderDirection::Asc => 1,
            OrderDirection::Desc => -1,
        }
    }
}

impl FromStr for OrderDirection {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            _ => Err(DriverError::Query(format!(
                "Unknown order direction: {}. Use 'ASC' or 'DESC'.",
                s
            ))),
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    #[serde(default)]
    pub order: OrderDirection,
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub fields: Vec<IndexField>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            unique: false,
        }
    }

    /// Append a key field
    pub fn field(mut self, name: impl Into<String>, order: OrderDirection) -> Self {
        self.fields.push(IndexField {
            name: name.into(),
            order,
        });
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(rename = "dir", default)]
    pub direction: OrderDirection,
}

/// Paging and ordering for `find`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<SortKey>>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Append a sort key
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.get_or_insert_with(Vec::new).push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }
}
