//! Statement routing
//!
//! A statement descriptor plus bound parameters goes in, a `RouteContext`
//! naming every (data source, actual tables) unit comes out.

pub mod condition;
pub mod engine;
mod insert;
pub mod result;
pub mod statement;

pub use condition::{extract_conditions, ShardingCondition, ShardingConditions};
pub use engine::RoutingEngine;
pub use result::{ExecutionUnit, GeneratedKey, InsertValueUnit, RouteContext, RouteResult, TableUnit};
pub use statement::{
    Column, CompareOperator, DmlStatement, Expression, InsertStatement, InsertValues, Predicate,
    SelectStatement, SqlStatement,
};
