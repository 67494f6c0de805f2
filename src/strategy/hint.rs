//! Hint context
//!
//! A `HintManager` carries sharding values that do not come from SQL
//! predicates. It is opened for one unit of work, handed explicitly to the
//! routing engine, and cleared when it goes out of scope, so hints can never
//! bleed into a later statement.

use std::collections::HashMap;

use serde_json::Value;

/// Which half of a data node a strategy is routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardingDimension {
    Database,
    Table,
}

#[derive(Debug, Default)]
pub struct HintManager {
    database_values: HashMap<String, Vec<Value>>,
    table_values: HashMap<String, Vec<Value>>,
}

impl HintManager {
    /// Open an empty hint scope.
    pub fn open() -> Self {
        tracing::trace!("Hint scope opened");
        Self::default()
    }

    /// Run `f` inside a fresh hint scope; the scope is released on every exit path.
    pub fn scoped<R>(f: impl FnOnce(&mut HintManager) -> R) -> R {
        let mut hint = HintManager::open();
        f(&mut hint)
    }

    pub fn add_database_sharding_value(&mut self, logic_table: &str, value: impl Into<Value>) {
        self.database_values
            .entry(logic_table.to_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn add_table_sharding_value(&mut self, logic_table: &str, value: impl Into<Value>) {
        self.table_values
            .entry(logic_table.to_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn sharding_values(&self, logic_table: &str, dimension: ShardingDimension) -> &[Value] {
        let values = match dimension {
            ShardingDimension::Database => &self.database_values,
            ShardingDimension::Table => &self.table_values,
        };
        values
            .get(&logic_table.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.database_values.is_empty() && self.table_values.is_empty()
    }

    /// Explicitly end the scope.
    pub fn close(self) {}
}

impl Drop for HintManager {
    fn drop(&mut self) {
        self.database_values.clear();
        self.table_values.clear();
        tracing::trace!("Hint scope closed");
    }
}
