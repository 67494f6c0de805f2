// ==================== INSERT Routing Tests ====================

mod common;

use common::*;
use serde_json::{json, Value};
use shardsql::config::{AlgorithmConfig, ShardingRuleConfig, TableRuleConfig};
use shardsql::route::{Expression, InsertStatement, SqlStatement};
use shardsql::{RoutingEngine, ShardingError};

fn insert(table: &str, columns: &[&str], rows: Vec<Vec<Expression>>) -> SqlStatement {
    SqlStatement::Insert(InsertStatement::values(table, columns, rows))
}

fn params_rows(rows: usize, width: usize) -> Vec<Vec<Expression>> {
    (0..rows)
        .map(|r| (0..width).map(|c| Expression::param(r * width + c)).collect())
        .collect()
}

#[test]
fn test_batch_insert_with_generated_key() {
    let rule = order_rule();
    let statement = insert("t_order", &["user_id", "status"], params_rows(3, 2));
    let params = vec![json!(10), json!("a"), json!(11), json!("b"), json!(12), json!("c")];
    let context = RoutingEngine::new(&rule).route(&statement, &params, None).unwrap();

    let units = context.units();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0].parameters, vec![json!(10), json!("a"), json!(100)]);
    assert_eq!(units[1].parameters, vec![json!(11), json!("b"), json!(101)]);
    assert_eq!(units[2].parameters, vec![json!(12), json!("c"), json!(102)]);
    assert_eq!(
        nodes(units),
        vec!["ds_0.t_order_0", "ds_1.t_order_1", "ds_0.t_order_0"]
    );

    for unit in units {
        let row = unit.insert_value.as_ref().unwrap();
        assert_eq!(row.columns, vec!["user_id", "status", "order_id"]);
        assert_eq!(row.to_string(), "(?, ?, ?)");
    }

    let key = context.generated_key.unwrap();
    assert_eq!(key.column, "order_id");
    assert_eq!(key.values, vec![json!(100), json!(101), json!(102)]);
    assert!(key.generated);
}

#[test]
fn test_literal_insert_inlines_generated_key() {
    let rule = order_rule();
    let statement = insert(
        "t_order",
        &["user_id", "status"],
        vec![vec![Expression::literal(3), Expression::literal("it's")]],
    );
    let context = RoutingEngine::new(&rule).route(&statement, &[], None).unwrap();
    let unit = &context.units()[0];
    assert!(unit.parameters.is_empty());
    assert_eq!(unit.insert_value.as_ref().unwrap().to_string(), "(3, 'it''s', 100)");
    assert_eq!(nodes(context.units()), vec!["ds_1.t_order_0"]);
}

#[test]
fn test_explicit_key_is_not_generated() {
    let rule = order_rule();
    let statement = insert("t_order", &["order_id", "user_id"], params_rows(2, 2));
    let params = vec![json!(7), json!(0), json!(8), json!(1)];
    let context = RoutingEngine::new(&rule).route(&statement, &params, None).unwrap();

    assert_eq!(nodes(context.units()), vec!["ds_0.t_order_1", "ds_1.t_order_0"]);
    assert_eq!(context.units()[1].parameters, vec![json!(8), json!(1)]);
    let key = context.generated_key.unwrap();
    assert_eq!(key.values, vec![json!(7), json!(8)]);
    assert!(!key.generated);
}

#[test]
fn test_set_form() {
    let rule = order_rule();
    let statement = SqlStatement::Insert(InsertStatement::set(
        "t_order",
        vec![("user_id", Expression::param(0)), ("order_id", Expression::param(1))],
    ));
    let context = RoutingEngine::new(&rule)
        .route(&statement, &[json!(3), json!(8)], None)
        .unwrap();
    assert_eq!(nodes(context.units()), vec!["ds_1.t_order_0"]);
    assert_eq!(context.units()[0].parameters, vec![json!(3), json!(8)]);
}

#[test]
fn test_broadcast_insert_goes_everywhere() {
    let rule = order_rule();
    let statement = insert("t_config", &["name", "value"], params_rows(2, 2));
    let params = vec![json!("a"), json!(1), json!("b"), json!(2)];
    let context = RoutingEngine::new(&rule).route(&statement, &params, None).unwrap();

    assert_eq!(
        nodes(context.units()),
        vec!["ds_0.t_config", "ds_1.t_config", "ds_0.t_config", "ds_1.t_config"]
    );
    assert_eq!(context.units()[2].parameters, vec![json!("b"), json!(2)]);
    assert!(context.generated_key.is_none());
}

#[test]
fn test_default_data_source_insert() {
    let rule = order_rule();
    let statement = insert("t_user", &["id"], vec![vec![Expression::literal(1)]]);
    let context = RoutingEngine::new(&rule).route(&statement, &[], None).unwrap();
    assert_eq!(nodes(context.units()), vec!["ds_0.t_user"]);
}

#[test]
fn test_row_spanning_data_sources_is_rejected() {
    let rule = order_rule();
    // No user_id: the database strategy cannot narrow the row
    let statement = insert("t_order", &["status"], vec![vec![Expression::literal("new")]]);
    let err = RoutingEngine::new(&rule).route(&statement, &[], None).unwrap_err();
    assert!(matches!(err, ShardingError::UnsupportedRoute(_)));
}

#[test]
fn test_parameter_count_mismatch() {
    let rule = order_rule();
    let statement = insert("t_order", &["user_id", "status"], params_rows(2, 2));
    let err = RoutingEngine::new(&rule)
        .route(&statement, &[json!(1), json!("a"), json!(2)], None)
        .unwrap_err();
    assert!(matches!(err, ShardingError::InvalidArgument(_)));
}

#[test]
fn test_missing_key_generator() {
    let mut table = TableRuleConfig::new("t_event", Some("ds_0.t_event"));
    table.key_generate_column = Some("id".to_string());
    let rule = build(&ShardingRuleConfig::new(&["ds_0"]).table(table));
    let statement = insert("t_event", &["name"], vec![vec![Expression::literal("x")]]);
    let err = RoutingEngine::new(&rule).route(&statement, &[], None).unwrap_err();
    assert!(matches!(err, ShardingError::Configuration(_)));
}

#[test]
fn test_snowflake_keys_increase() {
    let config = ShardingRuleConfig::new(&["ds_0"])
        .table(TableRuleConfig::new("t_event", Some("ds_0.t_event")).key_generator("id", "snowflake"))
        .key_generator("snowflake", AlgorithmConfig::new("SNOWFLAKE").prop("worker_id", 1));
    let rule = build(&config);
    let rows = (0..5).map(|i| vec![Expression::literal(i)]).collect();
    let statement = insert("t_event", &["seq"], rows);
    let context = RoutingEngine::new(&rule).route(&statement, &[], None).unwrap();

    let keys: Vec<i64> = context
        .generated_key
        .unwrap()
        .values
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    assert_eq!(keys.len(), 5);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_default_key_generator() {
    let mut config = ShardingRuleConfig::new(&["ds_0"])
        .table(TableRuleConfig::new("t_event", Some("ds_0.t_event")))
        .key_generator("uuid", AlgorithmConfig::new("UUID"))
        .default_key_generator("uuid");
    config.tables[0].key_generate_column = Some("id".to_string());
    let rule = build(&config);
    let statement = insert("t_event", &["name"], vec![vec![Expression::literal("x")]]);
    let context = RoutingEngine::new(&rule).route(&statement, &[], None).unwrap();

    let key = context.generated_key.unwrap();
    match &key.values[0] {
        Value::String(s) => assert_eq!(s.len(), 32),
        other => panic!("expected a uuid string, got {}", other),
    }
}
