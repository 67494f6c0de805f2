//! Rule model
//!
//! Immutable description of how logic tables map onto data nodes. Built once
//! from a [`ShardingRuleConfig`] and shared read-only afterwards.

pub mod data_node;
pub mod inline;
pub mod key_generator;
pub mod table_rule;

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use data_node::DataNode;
pub use key_generator::KeyGenerator;
pub use table_rule::{BindingTableRule, TableRule};

use crate::config::{ShardingRuleConfig, ShardingStrategyConfig};
use crate::error::{ShardingError, ShardingResult};
use crate::strategy::builtin::InlineShardingAlgorithm;
use crate::strategy::{
    AlgorithmRegistry, ComplexShardingStrategy, HintShardingStrategy, ShardingStrategy,
    StandardShardingStrategy,
};

#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    table_rules: Vec<TableRule>,
    /// lowercase logic table -> position in `table_rules`
    table_index: HashMap<String, usize>,
    binding_table_rules: Vec<BindingTableRule>,
    broadcast_tables: Vec<String>,
    default_database_strategy: ShardingStrategy,
    default_table_strategy: ShardingStrategy,
    default_data_source: Option<String>,
    default_key_generator: Option<Arc<dyn KeyGenerator>>,
}

/// Resolves the named algorithms of a configuration through a registry.
struct RuleBuilder<'a> {
    config: &'a ShardingRuleConfig,
    registry: &'a AlgorithmRegistry,
    key_generators: HashMap<String, Arc<dyn KeyGenerator>>,
}

impl<'a> RuleBuilder<'a> {
    fn new(config: &'a ShardingRuleConfig, registry: &'a AlgorithmRegistry) -> ShardingResult<Self> {
        let mut key_generators = HashMap::new();
        for (name, generator) in &config.key_generators {
            key_generators.insert(
                name.clone(),
                registry.create_key_generator(&generator.type_name, &generator.props)?,
            );
        }
        Ok(Self {
            config,
            registry,
            key_generators,
        })
    }

    fn algorithm_config(&self, name: &str) -> ShardingResult<&'a crate::config::AlgorithmConfig> {
        self.config
            .algorithms
            .get(name)
            .ok_or_else(|| ShardingError::config(format!("Unknown sharding algorithm '{}'", name)))
    }

    fn key_generator(&self, name: &str) -> ShardingResult<Arc<dyn KeyGenerator>> {
        self.key_generators
            .get(name)
            .cloned()
            .ok_or_else(|| ShardingError::config(format!("Unknown key generator '{}'", name)))
    }

    fn strategy(&self, config: &ShardingStrategyConfig) -> ShardingResult<ShardingStrategy> {
        Ok(match config {
            ShardingStrategyConfig::Standard {
                sharding_column,
                precise_algorithm,
                range_algorithm,
            } => {
                let precise = self.algorithm_config(precise_algorithm)?;
                let range = match range_algorithm {
                    Some(name) => {
                        let range = self.algorithm_config(name)?;
                        Some(self.registry.create_range(&range.type_name, &range.props)?)
                    }
                    None => None,
                };
                ShardingStrategy::Standard(StandardShardingStrategy {
                    column: sharding_column.clone(),
                    precise: self.registry.create_precise(&precise.type_name, &precise.props)?,
                    range,
                })
            }
            ShardingStrategyConfig::Complex {
                sharding_columns,
                algorithm,
            } => {
                let columns: Vec<String> = sharding_columns
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                if columns.is_empty() {
                    return Err(ShardingError::config("Complex strategy needs sharding columns"));
                }
                let algorithm = self.algorithm_config(algorithm)?;
                ShardingStrategy::Complex(ComplexShardingStrategy {
                    columns,
                    algorithm: self.registry.create_complex(&algorithm.type_name, &algorithm.props)?,
                })
            }
            ShardingStrategyConfig::Hint { algorithm } => {
                let algorithm = self.algorithm_config(algorithm)?;
                ShardingStrategy::Hint(HintShardingStrategy {
                    algorithm: self.registry.create_hint(&algorithm.type_name, &algorithm.props)?,
                })
            }
            ShardingStrategyConfig::Inline {
                sharding_column,
                algorithm_expression,
            } => ShardingStrategy::Standard(StandardShardingStrategy {
                column: sharding_column.clone(),
                precise: Arc::new(InlineShardingAlgorithm::new(algorithm_expression)?),
                range: None,
            }),
            ShardingStrategyConfig::None => ShardingStrategy::None,
        })
    }
}

impl ShardingRule {
    pub fn new(config: &ShardingRuleConfig, registry: &AlgorithmRegistry) -> ShardingResult<Self> {
        if config.data_sources.is_empty() {
            return Err(ShardingError::InvalidArgument(
                "Data sources cannot be empty.".to_string(),
            ));
        }
        let data_source_names = config.data_sources.clone();
        if let Some(default) = &config.default_data_source {
            if !data_source_names.contains(default) {
                return Err(ShardingError::config(format!(
                    "Default data source '{}' is not one of {:?}",
                    default, data_source_names
                )));
            }
        }

        let builder = RuleBuilder::new(config, registry)?;
        let mut table_rules = Vec::with_capacity(config.tables.len());
        let mut table_index = HashMap::new();
        for table in &config.tables {
            let mut rule = TableRule::new(
                &table.logic_table,
                table.actual_data_nodes.as_deref(),
                &data_source_names,
            )?;
            rule.database_strategy = table
                .database_strategy
                .as_ref()
                .map(|s| builder.strategy(s))
                .transpose()?;
            rule.table_strategy = table
                .table_strategy
                .as_ref()
                .map(|s| builder.strategy(s))
                .transpose()?;
            rule.generate_key_column = table.key_generate_column.clone();
            rule.key_generator = table
                .key_generator
                .as_deref()
                .map(|name| builder.key_generator(name))
                .transpose()?;
            if table_index.insert(rule.logic_table.clone(), table_rules.len()).is_some() {
                return Err(ShardingError::config(format!(
                    "Table rule '{}' is configured twice",
                    table.logic_table
                )));
            }
            table_rules.push(rule);
        }

        let default_database_strategy = config
            .default_database_strategy
            .as_ref()
            .map(|s| builder.strategy(s))
            .transpose()?
            .unwrap_or(ShardingStrategy::None);
        let default_table_strategy = config
            .default_table_strategy
            .as_ref()
            .map(|s| builder.strategy(s))
            .transpose()?
            .unwrap_or(ShardingStrategy::None);
        let default_key_generator = config
            .default_key_generator
            .as_deref()
            .map(|name| builder.key_generator(name))
            .transpose()?;

        let rule = Self {
            data_source_names,
            table_rules,
            table_index,
            binding_table_rules: config
                .binding_groups()
                .into_iter()
                .map(BindingTableRule::new)
                .collect(),
            broadcast_tables: config.broadcast_tables.iter().map(|t| t.to_lowercase()).collect(),
            default_database_strategy,
            default_table_strategy,
            default_data_source: config.default_data_source.clone(),
            default_key_generator,
        };
        rule.check_binding_groups()?;

        tracing::debug!(
            "Sharding rule built: {} data sources, {} tables, {} binding groups, {} broadcast tables",
            rule.data_source_names.len(),
            rule.table_rules.len(),
            rule.binding_table_rules.len(),
            rule.broadcast_tables.len()
        );
        Ok(rule)
    }

    /// Members of a binding group must exist and share a per-data-source table layout.
    fn check_binding_groups(&self) -> ShardingResult<()> {
        for group in &self.binding_table_rules {
            let mut head: Option<&TableRule> = None;
            for logic_table in &group.logic_tables {
                let rule = self.find_table_rule(logic_table).ok_or_else(|| {
                    ShardingError::config(format!(
                        "Binding table '{}' has no table rule",
                        logic_table
                    ))
                })?;
                let first = match head {
                    Some(first) => first,
                    None => {
                        head = Some(rule);
                        continue;
                    }
                };
                if first.actual_data_source_names() != rule.actual_data_source_names() {
                    return Err(ShardingError::config(format!(
                        "Binding tables '{}' and '{}' use different data sources",
                        first.logic_table, rule.logic_table
                    )));
                }
                for ds in first.actual_data_source_names() {
                    if first.actual_table_names(&ds).len() != rule.actual_table_names(&ds).len() {
                        return Err(ShardingError::config(format!(
                            "Binding tables '{}' and '{}' have different table counts in '{}'",
                            first.logic_table, rule.logic_table, ds
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.table_rules
    }

    pub fn binding_table_rules(&self) -> &[BindingTableRule] {
        &self.binding_table_rules
    }

    pub fn broadcast_tables(&self) -> &[String] {
        &self.broadcast_tables
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_index
            .get(&logic_table.to_lowercase())
            .map(|i| &self.table_rules[*i])
    }

    /// Table rule for `logic_table`, synthesized for broadcast tables and for
    /// tables that fall back to the default data source.
    pub fn table_rule(&self, logic_table: &str) -> ShardingResult<Cow<'_, TableRule>> {
        if let Some(rule) = self.find_table_rule(logic_table) {
            return Ok(Cow::Borrowed(rule));
        }
        if self.is_broadcast_table(logic_table) {
            return Ok(Cow::Owned(TableRule::broadcast(logic_table, &self.data_source_names)));
        }
        if let Some(default) = &self.default_data_source {
            return Ok(Cow::Owned(TableRule::single(logic_table, default)));
        }
        Err(ShardingError::TableRuleNotFound(logic_table.to_string()))
    }

    pub fn find_table_rule_by_actual_table(&self, actual_table: &str) -> Option<&TableRule> {
        self.table_rules.iter().find(|r| r.is_existed(actual_table))
    }

    /// Logic tables that own `actual_table`.
    pub fn logic_table_names(&self, actual_table: &str) -> Vec<&str> {
        self.table_rules
            .iter()
            .filter(|r| r.is_existed(actual_table))
            .map(|r| r.logic_table.as_str())
            .collect()
    }

    pub fn find_binding_table_rule(&self, logic_table: &str) -> Option<&BindingTableRule> {
        self.binding_table_rules
            .iter()
            .find(|r| r.has_logic_table(logic_table))
    }

    /// True when every table belongs to one binding group. Empty input is never bound.
    pub fn is_all_binding_tables<S: AsRef<str>>(&self, logic_tables: &[S]) -> bool {
        let Some(first) = logic_tables.first() else {
            return false;
        };
        match self.find_binding_table_rule(first.as_ref()) {
            Some(group) => logic_tables.iter().all(|t| group.has_logic_table(t.as_ref())),
            None => false,
        }
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(logic_table))
    }

    pub fn is_all_broadcast_tables<S: AsRef<str>>(&self, logic_tables: &[S]) -> bool {
        !logic_tables.is_empty() && logic_tables.iter().all(|t| self.is_broadcast_table(t.as_ref()))
    }

    /// True when none of the tables is sharded or broadcast and a default data source exists.
    pub fn is_all_in_default_data_source<S: AsRef<str>>(&self, logic_tables: &[S]) -> bool {
        self.default_data_source.is_some()
            && !logic_tables.is_empty()
            && logic_tables.iter().all(|t| {
                self.find_table_rule(t.as_ref()).is_none() && !self.is_broadcast_table(t.as_ref())
            })
    }

    pub fn database_strategy<'r>(&'r self, table_rule: &'r TableRule) -> &'r ShardingStrategy {
        table_rule
            .database_strategy
            .as_ref()
            .unwrap_or(&self.default_database_strategy)
    }

    pub fn table_strategy<'r>(&'r self, table_rule: &'r TableRule) -> &'r ShardingStrategy {
        table_rule
            .table_strategy
            .as_ref()
            .unwrap_or(&self.default_table_strategy)
    }

    /// True when `column` drives either sharding dimension of `logic_table`.
    pub fn is_sharding_column(&self, column: &str, logic_table: &str) -> bool {
        match self.find_table_rule(logic_table) {
            Some(rule) => {
                self.database_strategy(rule).has_sharding_column(column)
                    || self.table_strategy(rule).has_sharding_column(column)
            }
            None => false,
        }
    }

    pub fn find_generate_key_column(&self, logic_table: &str) -> Option<&str> {
        self.find_table_rule(logic_table)
            .and_then(|r| r.generate_key_column.as_deref())
    }

    /// Next key for `logic_table`, from its own generator or the default one.
    pub fn generate_key(&self, logic_table: &str) -> ShardingResult<Value> {
        let generator = self
            .find_table_rule(logic_table)
            .and_then(|r| r.key_generator.as_ref())
            .or(self.default_key_generator.as_ref())
            .ok_or_else(|| {
                ShardingError::config(format!(
                    "No key generator configured for table '{}'",
                    logic_table
                ))
            })?;
        generator.generate_key()
    }

    /// First data node of `logic_table`.
    pub fn data_node(&self, logic_table: &str) -> ShardingResult<DataNode> {
        let rule = self.table_rule(logic_table)?;
        rule.actual_data_nodes.first().cloned().ok_or_else(|| {
            ShardingError::config(format!("Table '{}' has no actual data nodes", logic_table))
        })
    }

    /// First data node of `logic_table` inside `data_source_name`.
    pub fn data_node_in(&self, data_source_name: &str, logic_table: &str) -> ShardingResult<DataNode> {
        let rule = self.table_rule(logic_table)?;
        rule.actual_data_nodes
            .iter()
            .find(|n| n.data_source_name == data_source_name)
            .cloned()
            .ok_or_else(|| {
                ShardingError::config(format!(
                    "Cannot find actual data node for data source name: '{}' and logic table name: '{}'",
                    data_source_name, logic_table
                ))
            })
    }

    /// The actual table of `logic_table` aligned with `other_actual_table` of
    /// its binding partner `other_logic_table` in `data_source_name`.
    pub fn binding_actual_table(
        &self,
        data_source_name: &str,
        logic_table: &str,
        other_logic_table: &str,
        other_actual_table: &str,
    ) -> ShardingResult<String> {
        let other = self.table_rule(other_logic_table)?;
        let index = other
            .find_actual_table_index(data_source_name, other_actual_table)
            .ok_or_else(|| {
                ShardingError::config(format!(
                    "Actual table '{}' is not a node of '{}' in '{}'",
                    other_actual_table, other_logic_table, data_source_name
                ))
            })?;
        let rule = self.table_rule(logic_table)?;
        rule.actual_table_names(data_source_name)
            .into_iter()
            .nth(index)
            .ok_or_else(|| {
                ShardingError::config(format!(
                    "Cannot find binding actual table, data source: {}, logic table: {}, other actual table: {}",
                    data_source_name, logic_table, other_actual_table
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlgorithmConfig, TableRuleConfig};

    fn config() -> ShardingRuleConfig {
        ShardingRuleConfig::new(&["ds_0", "ds_1"])
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

    fn rule() -> ShardingRule {
        ShardingRule::new(&config(), &AlgorithmRegistry::with_builtins()).unwrap()
    }

    #[test]
    fn test_empty_data_sources() {
        let config = ShardingRuleConfig::default();
        let err = ShardingRule::new(&config, &AlgorithmRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ShardingError::InvalidArgument(_)));
    }

    #[test]
    fn test_table_rule_lookup() {
        let rule = rule();
        assert!(rule.find_table_rule("T_ORDER").is_some());
        assert!(rule.find_table_rule("t_user").is_none());

        let broadcast = rule.table_rule("t_config").unwrap();
        assert_eq!(broadcast.actual_data_nodes.len(), 2);

        let err = rule.table_rule("t_user").unwrap_err();
        assert!(matches!(err, ShardingError::TableRuleNotFound(_)));
    }

    #[test]
    fn test_default_data_source_fallback() {
        let config = config().default_data_source("ds_1");
        let rule = ShardingRule::new(&config, &AlgorithmRegistry::with_builtins()).unwrap();
        let table = rule.table_rule("t_user").unwrap();
        assert_eq!(table.actual_data_nodes, vec![DataNode::new("ds_1", "t_user")]);
        assert!(rule.is_all_in_default_data_source(&["t_user", "t_other"]));
        assert!(!rule.is_all_in_default_data_source(&["t_user", "t_order"]));
    }

    #[test]
    fn test_binding_and_broadcast() {
        let rule = rule();
        let empty: [&str; 0] = [];
        assert!(!rule.is_all_binding_tables(&empty));
        assert!(rule.is_all_binding_tables(&["T_ORDER", "t_order"]));
        assert!(rule.is_all_binding_tables(&["t_order", "t_order_item"]));
        assert!(!rule.is_all_binding_tables(&["t_order", "t_config"]));

        assert!(!rule.is_all_broadcast_tables(&empty));
        assert!(rule.is_all_broadcast_tables(&["T_CONFIG"]));
        assert!(!rule.is_all_broadcast_tables(&["t_config", "t_order"]));
    }

    #[test]
    fn test_binding_actual_table() {
        let rule = rule();
        let actual = rule
            .binding_actual_table("ds_1", "t_order_item", "t_order", "t_order_1")
            .unwrap();
        assert_eq!(actual, "t_order_item_1");
    }

    #[test]
    fn test_binding_group_misaligned() {
        let config = ShardingRuleConfig::new(&["ds_0", "ds_1"])
            .table(TableRuleConfig::new("t_order", Some("ds_${0..1}.t_order_${0..1}")))
            .table(TableRuleConfig::new("t_order_item", Some("ds_${0..1}.t_order_item_${0..2}")))
            .binding_group(&["t_order", "t_order_item"]);
        let err = ShardingRule::new(&config, &AlgorithmRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ShardingError::Configuration(_)));
    }

    #[test]
    fn test_data_nodes() {
        let rule = rule();
        assert_eq!(rule.data_node("t_order").unwrap(), DataNode::new("ds_0", "t_order_0"));
        assert_eq!(
            rule.data_node_in("ds_1", "t_order").unwrap(),
            DataNode::new("ds_1", "t_order_0")
        );
        assert!(matches!(
            rule.data_node_in("ds_9", "t_order"),
            Err(ShardingError::Configuration(_))
        ));
    }

    #[test]
    fn test_generate_key() {
        let rule = rule();
        assert_eq!(rule.find_generate_key_column("t_order"), Some("order_id"));
        assert_eq!(rule.generate_key("t_order").unwrap(), Value::from(100));
        assert_eq!(rule.generate_key("t_order").unwrap(), Value::from(101));
        assert!(matches!(
            rule.generate_key("t_order_item"),
            Err(ShardingError::Configuration(_))
        ));
    }

    #[test]
    fn test_sharding_columns() {
        let rule = rule();
        assert!(rule.is_sharding_column("order_id", "t_order"));
        assert!(rule.is_sharding_column("user_id", "t_order"));
        assert!(!rule.is_sharding_column("status", "t_order"));
        assert_eq!(rule.logic_table_names("t_order_item_1"), vec!["t_order_item"]);
        assert!(rule.find_table_rule_by_actual_table("t_order_0").is_some());
    }

    #[test]
    fn test_unknown_algorithm_name() {
        let config = ShardingRuleConfig::new(&["ds_0"]).table(
            TableRuleConfig::new("t_order", None)
                .table_strategy(ShardingStrategyConfig::standard("order_id", "missing", None)),
        );
        let err = ShardingRule::new(&config, &AlgorithmRegistry::with_builtins()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown sharding algorithm 'missing'"
        );
    }
}
