use std::fmt;
use std::sync::Arc;

use super::data_node::DataNode;
use super::inline;
use super::key_generator::KeyGenerator;
use crate::error::{ShardingError, ShardingResult};
use crate::strategy::ShardingStrategy;

/// Mapping of one logic table onto its data nodes.
#[derive(Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub actual_data_nodes: Vec<DataNode>,
    pub database_strategy: Option<ShardingStrategy>,
    pub table_strategy: Option<ShardingStrategy>,
    pub generate_key_column: Option<String>,
    pub key_generator: Option<Arc<dyn KeyGenerator>>,
}

impl fmt::Debug for TableRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRule")
            .field("logic_table", &self.logic_table)
            .field("actual_data_nodes", &self.actual_data_nodes)
            .field("database_strategy", &self.database_strategy)
            .field("table_strategy", &self.table_strategy)
            .field("generate_key_column", &self.generate_key_column)
            .finish()
    }
}

impl TableRule {
    /// Build the node list from an inline expression.
    ///
    /// Without an expression the table exists once per data source under its
    /// logic name. Nodes naming a data source outside `data_sources` are rejected.
    pub fn new(
        logic_table: &str,
        actual_data_nodes: Option<&str>,
        data_sources: &[String],
    ) -> ShardingResult<Self> {
        let nodes = match actual_data_nodes.map(str::trim).filter(|s| !s.is_empty()) {
            Some(expression) => {
                let mut nodes = Vec::new();
                for text in inline::expand(expression)? {
                    let node = DataNode::parse(&text)?;
                    if !data_sources.iter().any(|ds| ds == &node.data_source_name) {
                        return Err(ShardingError::config(format!(
                            "Actual data node '{}' of '{}' refers to unknown data source",
                            node, logic_table
                        )));
                    }
                    if nodes.contains(&node) {
                        return Err(ShardingError::config(format!(
                            "Actual data node '{}' of '{}' is listed twice",
                            node, logic_table
                        )));
                    }
                    nodes.push(node);
                }
                nodes
            }
            None => data_sources
                .iter()
                .map(|ds| DataNode::new(ds.as_str(), logic_table))
                .collect(),
        };
        if nodes.is_empty() {
            return Err(ShardingError::config(format!(
                "Table '{}' has no actual data nodes",
                logic_table
            )));
        }
        Ok(Self {
            logic_table: logic_table.to_lowercase(),
            actual_data_nodes: nodes,
            database_strategy: None,
            table_strategy: None,
            generate_key_column: None,
            key_generator: None,
        })
    }

    /// A table replicated in every data source.
    pub fn broadcast(logic_table: &str, data_sources: &[String]) -> Self {
        Self {
            logic_table: logic_table.to_lowercase(),
            actual_data_nodes: data_sources
                .iter()
                .map(|ds| DataNode::new(ds.as_str(), logic_table))
                .collect(),
            database_strategy: None,
            table_strategy: None,
            generate_key_column: None,
            key_generator: None,
        }
    }

    /// An unsharded table living in one data source.
    pub fn single(logic_table: &str, data_source: &str) -> Self {
        Self::broadcast(logic_table, &[data_source.to_string()])
    }

    /// Data source names in node order, without repeats.
    pub fn actual_data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in &self.actual_data_nodes {
            if !names.contains(&node.data_source_name) {
                names.push(node.data_source_name.clone());
            }
        }
        names
    }

    /// Actual tables of one data source, in node order.
    pub fn actual_table_names(&self, data_source_name: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source_name == data_source_name)
            .map(|n| n.table_name.clone())
            .collect()
    }

    /// Position of `actual_table` among the tables of `data_source_name`.
    pub fn find_actual_table_index(&self, data_source_name: &str, actual_table: &str) -> Option<usize> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source_name == data_source_name)
            .position(|n| n.table_name.eq_ignore_ascii_case(actual_table))
    }

    pub fn is_existed(&self, actual_table: &str) -> bool {
        self.actual_data_nodes
            .iter()
            .any(|n| n.table_name.eq_ignore_ascii_case(actual_table))
    }
}

/// Logic tables whose actual tables always line up by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTableRule {
    pub logic_tables: Vec<String>,
}

impl BindingTableRule {
    pub fn new(logic_tables: Vec<String>) -> Self {
        Self {
            logic_tables: logic_tables.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn has_logic_table(&self, logic_table: &str) -> bool {
        self.logic_tables.iter().any(|t| t.eq_ignore_ascii_case(logic_table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_sources() -> Vec<String> {
        vec!["ds_0".to_string(), "ds_1".to_string()]
    }

    #[test]
    fn test_nodes_from_expression() {
        let rule = TableRule::new("T_ORDER", Some("ds_${0..1}.t_order_${0..2}"), &data_sources()).unwrap();
        assert_eq!(rule.logic_table, "t_order");
        assert_eq!(rule.actual_data_nodes.len(), 6);
        assert_eq!(rule.actual_data_nodes[0], DataNode::new("ds_0", "t_order_0"));
        assert_eq!(rule.actual_data_nodes[5], DataNode::new("ds_1", "t_order_2"));
        assert_eq!(rule.actual_data_source_names(), data_sources());
        assert_eq!(
            rule.actual_table_names("ds_1"),
            vec!["t_order_0", "t_order_1", "t_order_2"]
        );
        assert_eq!(rule.find_actual_table_index("ds_1", "T_ORDER_2"), Some(2));
        assert_eq!(rule.find_actual_table_index("ds_1", "t_order_9"), None);
        assert!(rule.is_existed("t_order_1"));
    }

    #[test]
    fn test_nodes_default_to_every_data_source() {
        let rule = TableRule::new("t_user", None, &data_sources()).unwrap();
        assert_eq!(
            rule.actual_data_nodes,
            vec![DataNode::new("ds_0", "t_user"), DataNode::new("ds_1", "t_user")]
        );
    }

    #[test]
    fn test_unknown_data_source_rejected() {
        let err = TableRule::new("t_order", Some("ds_${0..2}.t_order"), &data_sources()).unwrap_err();
        assert!(err.to_string().contains("unknown data source"));
    }

    #[test]
    fn test_binding_rule_case_insensitive() {
        let rule = BindingTableRule::new(vec!["T_Order".to_string(), "t_order_item".to_string()]);
        assert!(rule.has_logic_table("t_ORDER"));
        assert!(!rule.has_logic_table("t_user"));
    }
}
