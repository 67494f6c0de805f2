//! Shared rule fixtures for the integration tests
//!
//! Two data sources, `t_order` and `t_order_item` bound together and split
//! two ways in each, `t_config` broadcast and `t_user` in the default data
//! source.

#![allow(dead_code)]

use serde_json::Value;
use shardsql::config::{AlgorithmConfig, ShardingRuleConfig, ShardingStrategyConfig, TableRuleConfig};
use shardsql::route::{Column, Expression, Predicate};
use shardsql::{AlgorithmRegistry, ShardingRule};

pub fn order_config() -> ShardingRuleConfig {
    ShardingRuleConfig::new(&["ds_0", "ds_1"])
        .default_data_source("ds_0")
        .table(
            TableRuleConfig::new("t_order", Some("ds_${0..1}.t_order_${0..1}"))
                .table_strategy(ShardingStrategyConfig::inline("order_id", "t_order_${order_id % 2}"))
                .key_generator("order_id", "increment"),
        )
        .table(
            TableRuleConfig::new("t_order_item", Some("ds_${0..1}.t_order_item_${0..1}"))
                .table_strategy(ShardingStrategyConfig::inline(
                    "order_id",
                    "t_order_item_${order_id % 2}",
                )),
        )
        .binding_group(&["t_order", "t_order_item"])
        .broadcast_table("t_config")
        .default_database_strategy(ShardingStrategyConfig::inline("user_id", "ds_${user_id % 2}"))
        .key_generator("increment", AlgorithmConfig::new("INCREMENT").prop("start", 100))
}

pub fn order_rule() -> ShardingRule {
    build(&order_config())
}

pub fn build(config: &ShardingRuleConfig) -> ShardingRule {
    ShardingRule::new(config, &AlgorithmRegistry::with_builtins()).expect("Failed to build sharding rule")
}

pub fn eq(column: &str, value: impl Into<Value>) -> Predicate {
    Predicate::eq(Column::new(column), Expression::literal(value))
}

pub fn eq_param(column: &str, index: usize) -> Predicate {
    Predicate::eq(Column::new(column), Expression::param(index))
}

pub fn in_list(column: &str, values: &[i64]) -> Predicate {
    Predicate::in_list(
        Column::new(column),
        values.iter().map(|v| Expression::literal(*v)).collect(),
    )
}

/// `ds.table` of every unit's first table
pub fn nodes(units: &[shardsql::route::ExecutionUnit]) -> Vec<String> {
    units
        .iter()
        .map(|u| format!("{}.{}", u.data_source_name, u.table_units[0].actual_table))
        .collect()
}
