//! Insert routing
//!
//! Both INSERT forms are normalized to per-row (column, expression) lists.
//! The flat parameter list is cut into one contiguous chunk per row, a key is
//! generated for rows that lack one, and every row is routed on its own.

use serde_json::Value;

use super::condition::ShardingCondition;
use super::engine::RoutingEngine;
use super::result::{ExecutionUnit, GeneratedKey, InsertValueUnit, RouteContext, RouteResult, TableUnit};
use super::statement::{Expression, InsertStatement, InsertValues};
use crate::error::{ShardingError, ShardingResult};
use crate::strategy::{HintManager, ListRouteValue, RouteValue};

/// One row, rewritten so placeholders index its own parameter chunk.
#[derive(Debug, Clone)]
struct InsertRow {
    columns: Vec<String>,
    values: Vec<Expression>,
    parameters: Vec<Value>,
}

impl InsertRow {
    fn value_of(&self, column: &str) -> ShardingResult<Option<Value>> {
        match self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)) {
            Some(i) => self.values[i].resolve(&self.parameters).map(Some),
            None => Ok(None),
        }
    }
}

/// Split `statement` into rows and cut `parameters` into per-row chunks.
fn normalize_rows(statement: &InsertStatement, parameters: &[Value]) -> ShardingResult<Vec<InsertRow>> {
    let raw_rows: Vec<(Vec<String>, Vec<&Expression>)> = match &statement.values {
        InsertValues::Values { columns, rows } => {
            if rows.is_empty() {
                return Err(ShardingError::InvalidArgument(format!(
                    "INSERT into '{}' has no rows",
                    statement.table
                )));
            }
            let mut raw = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                if row.len() != columns.len() {
                    return Err(ShardingError::InvalidArgument(format!(
                        "Row {} of INSERT into '{}' has {} values for {} columns",
                        i,
                        statement.table,
                        row.len(),
                        columns.len()
                    )));
                }
                raw.push((columns.clone(), row.iter().collect()));
            }
            raw
        }
        InsertValues::Set(assignments) => {
            let columns = assignments.iter().map(|(c, _)| c.clone()).collect();
            vec![(columns, assignments.iter().map(|(_, e)| e).collect())]
        }
    };
    chunk_rows(statement, raw_rows, parameters)
}

fn chunk_rows(
    statement: &InsertStatement,
    raw_rows: Vec<(Vec<String>, Vec<&Expression>)>,
    parameters: &[Value],
) -> ShardingResult<Vec<InsertRow>> {
    let placeholders: usize = raw_rows
        .iter()
        .map(|(_, values)| values.iter().filter(|v| v.is_parameter()).count())
        .sum();
    if placeholders != parameters.len() {
        return Err(ShardingError::InvalidArgument(format!(
            "INSERT into '{}' has {} placeholders but {} parameters",
            statement.table,
            placeholders,
            parameters.len()
        )));
    }

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (columns, values) in raw_rows {
        let mut chunk = Vec::new();
        let mut rewritten = Vec::with_capacity(values.len());
        for value in values {
            match value {
                Expression::Parameter(i) => {
                    let bound = parameters.get(*i).cloned().ok_or_else(|| {
                        ShardingError::InvalidArgument(format!(
                            "Parameter {} is not bound ({} parameters given)",
                            i,
                            parameters.len()
                        ))
                    })?;
                    rewritten.push(Expression::Parameter(chunk.len()));
                    chunk.push(bound);
                }
                literal => rewritten.push(literal.clone()),
            }
        }
        rows.push(InsertRow {
            columns,
            values: rewritten,
            parameters: chunk,
        });
    }
    Ok(rows)
}

/// Resolve the key column of every row, generating values where missing.
///
/// A generated value goes into the row's parameters when the row is
/// parameterized, otherwise it is inlined as a literal.
fn apply_generated_key(
    engine: &RoutingEngine<'_>,
    table: &str,
    rows: &mut [InsertRow],
) -> ShardingResult<Option<GeneratedKey>> {
    let rule = engine.rule();
    let column = match rule.find_generate_key_column(table) {
        Some(column) => column.to_string(),
        None => return Ok(None),
    };

    let supplied = rows
        .iter()
        .all(|r| r.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)));
    let mut values = Vec::with_capacity(rows.len());
    if supplied {
        for row in rows.iter() {
            values.push(row.value_of(&column)?.unwrap_or(Value::Null));
        }
        return Ok(Some(GeneratedKey {
            column,
            values,
            generated: false,
        }));
    }

    for row in rows.iter_mut() {
        if row.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
            values.push(row.value_of(&column)?.unwrap_or(Value::Null));
            continue;
        }
        let key = rule.generate_key(table)?;
        row.columns.push(column.clone());
        if row.parameters.is_empty() {
            row.values.push(Expression::Literal(key.clone()));
        } else {
            row.values.push(Expression::Parameter(row.parameters.len()));
            row.parameters.push(key.clone());
        }
        values.push(key);
    }
    tracing::debug!("Generated {} keys for {}.{}", values.len(), table, column);
    Ok(Some(GeneratedKey {
        column,
        values,
        generated: true,
    }))
}

fn row_condition(engine: &RoutingEngine<'_>, table: &str, row: &InsertRow) -> ShardingResult<ShardingCondition> {
    let mut route_values: Vec<RouteValue> = Vec::new();
    for (column, value) in row.columns.iter().zip(&row.values) {
        if engine.rule().is_sharding_column(column, table) {
            let value = value.resolve(&row.parameters)?;
            route_values.push(ListRouteValue::new(column.as_str(), table, vec![value]).into());
        }
    }
    Ok(ShardingCondition::new(route_values))
}

pub(crate) fn route_insert(
    engine: &RoutingEngine<'_>,
    statement: &InsertStatement,
    parameters: &[Value],
    hint: Option<&HintManager>,
) -> ShardingResult<RouteContext> {
    let rule = engine.rule();
    let table = statement.table.as_str();
    let mut rows = normalize_rows(statement, parameters)?;
    let generated_key = apply_generated_key(engine, table, &mut rows)?;

    let mut units = Vec::new();
    match rule.find_table_rule(table) {
        Some(table_rule) => {
            for (i, row) in rows.into_iter().enumerate() {
                let condition = row_condition(engine, table, &row)?;
                let nodes = engine.route_table(table_rule, std::slice::from_ref(&condition), hint)?;
                if nodes.len() != 1 {
                    return Err(ShardingError::UnsupportedRoute(format!(
                        "Row {} of INSERT into '{}' routes to {} data nodes, expected exactly one",
                        i,
                        table,
                        nodes.len()
                    )));
                }
                let node = &nodes[0];
                units.push(insert_unit(&node.data_source_name, table, &node.table_name, row));
            }
        }
        None => {
            // Broadcast tables take every row everywhere; other unsharded
            // tables live in the default data source
            let table_rule = rule.table_rule(table)?;
            for row in rows {
                for node in &table_rule.actual_data_nodes {
                    units.push(insert_unit(&node.data_source_name, table, &node.table_name, row.clone()));
                }
            }
        }
    }

    Ok(RouteContext {
        route_result: RouteResult::Routed(units),
        generated_key,
    })
}

fn insert_unit(data_source: &str, logic_table: &str, actual_table: &str, row: InsertRow) -> ExecutionUnit {
    let mut unit = ExecutionUnit::new(
        data_source,
        vec![TableUnit::new(logic_table, actual_table)],
        row.parameters,
    );
    unit.insert_value = Some(InsertValueUnit {
        columns: row.columns,
        values: row.values,
    });
    unit
}
