//! Statement descriptors
//!
//! The router never sees SQL text. An upstream parser hands it one of these
//! descriptors: the referenced logic tables, a predicate tree reduced to the
//! shapes that can drive sharding, and for SELECT the merge shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ShardingError, ShardingResult};
use crate::merge::SelectContext;

/// A value position in the statement: inline literal or `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Value),
    /// 0-based index into the statement's parameter list
    Parameter(usize),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn param(index: usize) -> Self {
        Expression::Parameter(index)
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, Expression::Parameter(_))
    }

    pub fn resolve(&self, parameters: &[Value]) -> ShardingResult<Value> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Parameter(i) => parameters.get(*i).cloned().ok_or_else(|| {
                ShardingError::InvalidArgument(format!(
                    "Parameter {} is not bound ({} parameters given)",
                    i,
                    parameters.len()
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Owning logic table; unqualified columns apply to every table that
    /// shards on them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl Column {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
        }
    }

    pub fn of(table: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: Some(table.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOperator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Equal(Column, Expression),
    In(Column, Vec<Expression>),
    Between(Column, Expression, Expression),
    Compare(Column, CompareOperator, Expression),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// Anything that cannot constrain a sharding column (`LIKE`, functions, ...)
    Opaque,
}

impl Predicate {
    pub fn eq(column: Column, value: Expression) -> Self {
        Predicate::Equal(column, value)
    }

    pub fn in_list(column: Column, values: Vec<Expression>) -> Self {
        Predicate::In(column, values)
    }

    pub fn between(column: Column, lower: Expression, upper: Expression) -> Self {
        Predicate::Between(column, lower, upper)
    }

    pub fn compare(column: Column, op: CompareOperator, value: Expression) -> Self {
        Predicate::Compare(column, op, value)
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectStatement {
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
    #[serde(default)]
    pub context: SelectContext,
}

impl SelectStatement {
    pub fn new(tables: &[&str]) -> Self {
        Self {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn context(mut self, context: SelectContext) -> Self {
        self.context = context;
        self
    }
}

/// UPDATE or DELETE.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DmlStatement {
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
}

impl DmlStatement {
    pub fn new(tables: &[&str]) -> Self {
        Self {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            predicate: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertValues {
    /// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?)`
    Values {
        columns: Vec<String>,
        rows: Vec<Vec<Expression>>,
    },
    /// `INSERT INTO t SET a = ?, b = ?`
    Set(Vec<(String, Expression)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: String,
    pub values: InsertValues,
}

impl InsertStatement {
    pub fn values(table: &str, columns: &[&str], rows: Vec<Vec<Expression>>) -> Self {
        Self {
            table: table.to_string(),
            values: InsertValues::Values {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        }
    }

    pub fn set(table: &str, assignments: Vec<(&str, Expression)>) -> Self {
        Self {
            table: table.to_string(),
            values: InsertValues::Set(
                assignments
                    .into_iter()
                    .map(|(c, e)| (c.to_string(), e))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlStatement {
    Select(SelectStatement),
    Update(DmlStatement),
    Delete(DmlStatement),
    Insert(InsertStatement),
}

impl SqlStatement {
    pub fn tables(&self) -> Vec<&str> {
        match self {
            SqlStatement::Select(s) => s.tables.iter().map(|t| t.as_str()).collect(),
            SqlStatement::Update(s) | SqlStatement::Delete(s) => {
                s.tables.iter().map(|t| t.as_str()).collect()
            }
            SqlStatement::Insert(s) => vec![s.table.as_str()],
        }
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        match self {
            SqlStatement::Select(s) => s.predicate.as_ref(),
            SqlStatement::Update(s) | SqlStatement::Delete(s) => s.predicate.as_ref(),
            SqlStatement::Insert(_) => None,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, SqlStatement::Select(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SqlStatement::Select(_) => "SELECT",
            SqlStatement::Update(_) => "UPDATE",
            SqlStatement::Delete(_) => "DELETE",
            SqlStatement::Insert(_) => "INSERT",
        }
    }
}
