//! Sharding rule configuration
//!
//! A `ShardingRuleConfig` is plain data, usually read from a TOML file:
//!
//! ```toml
//! data_sources = ["ds_0", "ds_1"]
//! binding_tables = ["t_order, t_order_item"]
//! broadcast_tables = ["t_config"]
//! default_database_strategy = { type = "inline", sharding_column = "user_id", algorithm_expression = "ds_${user_id % 2}" }
//!
//! [[tables]]
//! logic_table = "t_order"
//! actual_data_nodes = "ds_${0..1}.t_order_${0..1}"
//! table_strategy = { type = "standard", sharding_column = "order_id", precise_algorithm = "order_mod", range_algorithm = "order_mod" }
//! key_generate_column = "order_id"
//! key_generator = "snowflake"
//!
//! [algorithms.order_mod]
//! type = "MOD"
//! props = { sharding_count = 2 }
//!
//! [key_generators.snowflake]
//! type = "SNOWFLAKE"
//! props = { worker_id = 1 }
//! ```
//!
//! ## Environment Variables
//!
//! `load` reads a `.env` file next to the configuration file, then applies:
//!
//! - `SHARDSQL_DATA_SOURCES` - comma separated data source names
//! - `SHARDSQL_DEFAULT_DATA_SOURCE` - default data source for unsharded tables

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ShardingError, ShardingResult};
use crate::strategy::Props;

pub const ENV_DATA_SOURCES: &str = "SHARDSQL_DATA_SOURCES";
pub const ENV_DEFAULT_DATA_SOURCE: &str = "SHARDSQL_DEFAULT_DATA_SOURCE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    #[serde(default)]
    pub data_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Each entry is one group, comma separated: `"t_order, t_order_item"`
    #[serde(default)]
    pub binding_tables: Vec<String>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_table_strategy: Option<ShardingStrategyConfig>,
    /// Name of an entry in `key_generators`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_generator: Option<String>,
    #[serde(default)]
    pub algorithms: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub key_generators: BTreeMap<String, AlgorithmConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.t_order_${0..1}`; when absent the
    /// table lives once in every data source under its logic name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_data_nodes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_strategy: Option<ShardingStrategyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generate_column: Option<String>,
    /// Name of an entry in `key_generators`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generator: Option<String>,
}

/// Strategy binding, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShardingStrategyConfig {
    Standard {
        sharding_column: String,
        precise_algorithm: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range_algorithm: Option<String>,
    },
    Complex {
        /// Comma separated column names
        sharding_columns: String,
        algorithm: String,
    },
    Hint {
        algorithm: String,
    },
    /// Shorthand for a standard strategy over an inline expression
    Inline {
        sharding_column: String,
        algorithm_expression: String,
    },
    None,
}

/// A named algorithm or key generator: registry type plus properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub props: Props,
}

impl AlgorithmConfig {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            props: Props::new(),
        }
    }

    pub fn prop(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }
}

impl ShardingStrategyConfig {
    pub fn inline(sharding_column: &str, algorithm_expression: &str) -> Self {
        ShardingStrategyConfig::Inline {
            sharding_column: sharding_column.to_string(),
            algorithm_expression: algorithm_expression.to_string(),
        }
    }

    pub fn standard(sharding_column: &str, precise_algorithm: &str, range_algorithm: Option<&str>) -> Self {
        ShardingStrategyConfig::Standard {
            sharding_column: sharding_column.to_string(),
            precise_algorithm: precise_algorithm.to_string(),
            range_algorithm: range_algorithm.map(|s| s.to_string()),
        }
    }

    pub fn complex(sharding_columns: &str, algorithm: &str) -> Self {
        ShardingStrategyConfig::Complex {
            sharding_columns: sharding_columns.to_string(),
            algorithm: algorithm.to_string(),
        }
    }

    pub fn hint(algorithm: &str) -> Self {
        ShardingStrategyConfig::Hint {
            algorithm: algorithm.to_string(),
        }
    }
}

impl TableRuleConfig {
    pub fn new(logic_table: &str, actual_data_nodes: Option<&str>) -> Self {
        Self {
            logic_table: logic_table.to_string(),
            actual_data_nodes: actual_data_nodes.map(|s| s.to_string()),
            database_strategy: None,
            table_strategy: None,
            key_generate_column: None,
            key_generator: None,
        }
    }

    pub fn database_strategy(mut self, strategy: ShardingStrategyConfig) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn table_strategy(mut self, strategy: ShardingStrategyConfig) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn key_generator(mut self, column: &str, generator: &str) -> Self {
        self.key_generate_column = Some(column.to_string());
        self.key_generator = Some(generator.to_string());
        self
    }
}

impl ShardingRuleConfig {
    pub fn new<S: AsRef<str>>(data_sources: &[S]) -> Self {
        Self {
            data_sources: data_sources.iter().map(|s| s.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text. No environment overrides are applied.
    pub fn from_toml_str(text: &str) -> ShardingResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file, honouring `.env` and environment overrides.
    pub fn load(path: &Path) -> ShardingResult<Self> {
        if let Some(dir) = path.parent() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
        }

        if !path.exists() {
            return Err(ShardingError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides_with(|key| std::env::var(key).ok());
        tracing::debug!(
            "Loaded sharding config from {} ({} data sources, {} tables)",
            path.display(),
            config.data_sources.len(),
            config.tables.len()
        );
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(data_sources) = lookup(ENV_DATA_SOURCES) {
            let names: Vec<String> = data_sources
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !names.is_empty() {
                self.data_sources = names;
            }
        }

        if let Some(default_data_source) = lookup(ENV_DEFAULT_DATA_SOURCE) {
            if !default_data_source.is_empty() {
                self.default_data_source = Some(default_data_source);
            }
        }
    }

    pub fn table(mut self, table: TableRuleConfig) -> Self {
        self.tables.push(table);
        self
    }

    pub fn binding_group(mut self, tables: &[&str]) -> Self {
        self.binding_tables.push(tables.join(","));
        self
    }

    pub fn broadcast_table(mut self, table: &str) -> Self {
        self.broadcast_tables.push(table.to_string());
        self
    }

    pub fn default_data_source(mut self, name: &str) -> Self {
        self.default_data_source = Some(name.to_string());
        self
    }

    pub fn default_database_strategy(mut self, strategy: ShardingStrategyConfig) -> Self {
        self.default_database_strategy = Some(strategy);
        self
    }

    pub fn default_table_strategy(mut self, strategy: ShardingStrategyConfig) -> Self {
        self.default_table_strategy = Some(strategy);
        self
    }

    pub fn default_key_generator(mut self, name: &str) -> Self {
        self.default_key_generator = Some(name.to_string());
        self
    }

    pub fn algorithm(mut self, name: &str, algorithm: AlgorithmConfig) -> Self {
        self.algorithms.insert(name.to_string(), algorithm);
        self
    }

    pub fn key_generator(mut self, name: &str, generator: AlgorithmConfig) -> Self {
        self.key_generators.insert(name.to_string(), generator);
        self
    }

    /// Binding groups split into table names.
    pub fn binding_groups(&self) -> Vec<Vec<String>> {
        self.binding_tables
            .iter()
            .map(|group| {
                group
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect()
    }
}
