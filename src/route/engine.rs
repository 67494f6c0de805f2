//! Routing engine
//!
//! Picks a routing shape per statement, then turns sharding conditions into
//! execution units:
//! - broadcast: every data source (DML) or the first one (SELECT)
//! - default data source: unsharded tables
//! - standard: one sharded table or one binding group, co-members aligned by index
//! - complex: sharded tables routed independently, joined per common data source

use serde_json::Value;

use super::condition::{extract_conditions, ShardingCondition, ShardingConditions};
use super::insert::route_insert;
use super::result::{ExecutionUnit, RouteContext, RouteResult, TableUnit};
use super::statement::SqlStatement;
use crate::error::{ShardingError, ShardingResult};
use crate::rule::{DataNode, ShardingRule, TableRule};
use crate::strategy::{HintManager, ShardingContext, ShardingDimension};

pub struct RoutingEngine<'r> {
    rule: &'r ShardingRule,
}

impl<'r> RoutingEngine<'r> {
    pub fn new(rule: &'r ShardingRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &'r ShardingRule {
        self.rule
    }

    /// Route one statement with its bound parameters.
    ///
    /// `hint` carries values for tables sharded by a hint strategy; it is
    /// only read.
    pub fn route(
        &self,
        statement: &SqlStatement,
        parameters: &[Value],
        hint: Option<&HintManager>,
    ) -> ShardingResult<RouteContext> {
        let context = match statement {
            SqlStatement::Insert(insert) => route_insert(self, insert, parameters, hint)?,
            _ => RouteContext {
                route_result: self.route_query_or_dml(statement, parameters, hint)?,
                generated_key: None,
            },
        };
        tracing::debug!(
            "Routed {} on {:?} to {} units",
            statement.kind(),
            statement.tables(),
            context.units().len()
        );
        Ok(context)
    }

    fn route_query_or_dml(
        &self,
        statement: &SqlStatement,
        parameters: &[Value],
        hint: Option<&HintManager>,
    ) -> ShardingResult<RouteResult> {
        let tables = statement.tables();
        if tables.is_empty() {
            return Err(ShardingError::InvalidArgument(
                "Statement references no tables".to_string(),
            ));
        }

        if self.rule.is_all_broadcast_tables(&tables) {
            return Ok(self.route_broadcast(&tables, statement.is_query(), parameters));
        }
        if self.rule.is_all_in_default_data_source(&tables) {
            return self.route_default(&tables, parameters);
        }

        let conditions = extract_conditions(self.rule, &tables, statement.predicate(), parameters)?;
        if conditions.is_always_false() {
            return Ok(RouteResult::NoTargets);
        }

        let sharded: Vec<&str> = tables
            .iter()
            .copied()
            .filter(|t| self.rule.find_table_rule(t).is_some())
            .collect();
        let ride_along: Vec<&str> = tables
            .iter()
            .copied()
            .filter(|t| self.rule.find_table_rule(t).is_none())
            .collect();

        if sharded.is_empty() {
            // Broadcast tables next to default-data-source tables
            return self.route_default(&tables, parameters);
        }

        let allowed = self.ride_along_data_sources(&ride_along)?;
        let units = if sharded.len() == 1 || self.rule.is_all_binding_tables(&sharded) {
            tracing::debug!("Standard routing for {:?}", sharded);
            self.route_standard(&sharded, &ride_along, allowed.as_deref(), &conditions, parameters, hint)?
        } else {
            tracing::debug!("Complex routing for {:?}", sharded);
            self.route_complex(&sharded, &ride_along, allowed.as_deref(), &conditions, parameters, hint)?
        };
        Ok(RouteResult::Routed(units))
    }

    fn route_broadcast(&self, tables: &[&str], is_query: bool, parameters: &[Value]) -> RouteResult {
        let data_sources: Vec<&String> = if is_query {
            self.rule.data_source_names().iter().take(1).collect()
        } else {
            self.rule.data_source_names().iter().collect()
        };
        let units = data_sources
            .into_iter()
            .map(|ds| ExecutionUnit::new(ds.as_str(), logic_units(tables), parameters.to_vec()))
            .collect();
        RouteResult::Routed(units)
    }

    fn route_default(&self, tables: &[&str], parameters: &[Value]) -> ShardingResult<RouteResult> {
        let default = match self.rule.default_data_source() {
            Some(ds) => ds,
            None => {
                let missing = tables
                    .iter()
                    .find(|t| !self.rule.is_broadcast_table(t))
                    .unwrap_or(&tables[0]);
                return Err(ShardingError::TableRuleNotFound(missing.to_string()));
            }
        };
        Ok(RouteResult::Routed(vec![ExecutionUnit::new(
            default,
            logic_units(tables),
            parameters.to_vec(),
        )]))
    }

    /// Data sources a unit may use given its unsharded companions. Broadcast
    /// tables live everywhere; other unsharded tables pin the default data source.
    fn ride_along_data_sources(&self, ride_along: &[&str]) -> ShardingResult<Option<Vec<String>>> {
        let pinned = ride_along.iter().any(|t| !self.rule.is_broadcast_table(t));
        if !pinned {
            return Ok(None);
        }
        let missing = ride_along
            .iter()
            .find(|t| !self.rule.is_broadcast_table(t))
            .copied()
            .unwrap_or_default();
        match self.rule.default_data_source() {
            Some(ds) => Ok(Some(vec![ds.to_string()])),
            None => Err(ShardingError::TableRuleNotFound(missing.to_string())),
        }
    }

    fn route_standard(
        &self,
        sharded: &[&str],
        ride_along: &[&str],
        allowed: Option<&[String]>,
        conditions: &ShardingConditions,
        parameters: &[Value],
        hint: Option<&HintManager>,
    ) -> ShardingResult<Vec<ExecutionUnit>> {
        let primary = sharded[0];
        let table_rule = self.rule.table_rule(primary)?;
        let nodes = self.route_table(&table_rule, &conditions.conditions, hint)?;

        let mut units = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !is_allowed(allowed, &node.data_source_name) {
                continue;
            }
            let mut table_units = vec![TableUnit::new(primary, node.table_name.as_str())];
            for other in &sharded[1..] {
                let actual = self.rule.binding_actual_table(
                    &node.data_source_name,
                    other,
                    primary,
                    &node.table_name,
                )?;
                table_units.push(TableUnit::new(*other, actual));
            }
            table_units.extend(logic_units(ride_along));
            units.push(ExecutionUnit::new(
                node.data_source_name,
                table_units,
                parameters.to_vec(),
            ));
        }
        Ok(units)
    }

    fn route_complex(
        &self,
        sharded: &[&str],
        ride_along: &[&str],
        allowed: Option<&[String]>,
        conditions: &ShardingConditions,
        parameters: &[Value],
        hint: Option<&HintManager>,
    ) -> ShardingResult<Vec<ExecutionUnit>> {
        let mut routed: Vec<Vec<DataNode>> = Vec::with_capacity(sharded.len());
        for table in sharded {
            let table_rule = self.rule.table_rule(table)?;
            routed.push(self.route_table(&table_rule, &conditions.conditions, hint)?);
        }

        let mut units = Vec::new();
        for ds in self.rule.data_source_names() {
            if !is_allowed(allowed, ds) {
                continue;
            }
            let per_table: Vec<Vec<&str>> = routed
                .iter()
                .map(|nodes| {
                    nodes
                        .iter()
                        .filter(|n| &n.data_source_name == ds)
                        .map(|n| n.table_name.as_str())
                        .collect()
                })
                .collect();
            if per_table.iter().any(|tables| tables.is_empty()) {
                continue;
            }
            for combination in cartesian(&per_table) {
                let mut table_units: Vec<TableUnit> = sharded
                    .iter()
                    .zip(combination)
                    .map(|(logic, actual)| TableUnit::new(*logic, actual))
                    .collect();
                table_units.extend(logic_units(ride_along));
                units.push(ExecutionUnit::new(ds.as_str(), table_units, parameters.to_vec()));
            }
        }
        Ok(units)
    }

    /// Data nodes of one table for a set of conditions, in node order.
    ///
    /// Each condition is routed database first, then table within every routed
    /// data source; the results are unioned.
    pub(crate) fn route_table(
        &self,
        table_rule: &TableRule,
        conditions: &[ShardingCondition],
        hint: Option<&HintManager>,
    ) -> ShardingResult<Vec<DataNode>> {
        let database_strategy = self.rule.database_strategy(table_rule);
        let table_strategy = self.rule.table_strategy(table_rule);
        let database_ctx = ShardingContext {
            logic_table: &table_rule.logic_table,
            dimension: ShardingDimension::Database,
            hint,
        };
        let table_ctx = ShardingContext {
            dimension: ShardingDimension::Table,
            ..database_ctx
        };

        let mut routed: Vec<DataNode> = Vec::new();
        for condition in conditions {
            let data_sources = database_strategy.do_sharding(
                &table_rule.actual_data_source_names(),
                &condition.route_values,
                &database_ctx,
            )?;
            for ds in data_sources {
                let tables = table_rule.actual_table_names(&ds);
                for table in table_strategy.do_sharding(&tables, &condition.route_values, &table_ctx)? {
                    let node = DataNode::new(ds.as_str(), table);
                    if !routed.contains(&node) {
                        routed.push(node);
                    }
                }
            }
        }
        Ok(table_rule
            .actual_data_nodes
            .iter()
            .filter(|n| routed.contains(n))
            .cloned()
            .collect())
    }
}

fn is_allowed(allowed: Option<&[String]>, data_source: &str) -> bool {
    allowed.map_or(true, |a| a.iter().any(|ds| ds == data_source))
}

fn logic_units(tables: &[&str]) -> Vec<TableUnit> {
    tables.iter().map(|t| TableUnit::new(*t, *t)).collect()
}

/// Every combination picking one entry per list, leftmost list slowest.
fn cartesian<'a>(lists: &[Vec<&'a str>]) -> Vec<Vec<&'a str>> {
    let mut combinations: Vec<Vec<&'a str>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combinations.len() * list.len());
        for prefix in &combinations {
            for item in list {
                let mut combination = prefix.clone();
                combination.push(*item);
                next.push(combination);
            }
        }
        combinations = next;
    }
    combinations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian() {
        let lists = vec![vec!["a", "b"], vec!["x", "y", "z"]];
        let combinations = cartesian(&lists);
        assert_eq!(combinations.len(), 6);
        assert_eq!(combinations[0], vec!["a", "x"]);
        assert_eq!(combinations[5], vec!["b", "z"]);
    }

    #[test]
    fn test_is_allowed() {
        let allowed = vec!["ds_0".to_string()];
        assert!(is_allowed(None, "ds_9"));
        assert!(is_allowed(Some(&allowed), "ds_0"));
        assert!(!is_allowed(Some(&allowed), "ds_1"));
    }
}
