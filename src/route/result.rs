use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::statement::Expression;
use crate::rule::DataNode;

/// A logic table and the actual table it is rewritten to in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableUnit {
    pub logic_table: String,
    pub actual_table: String,
}

impl TableUnit {
    pub fn new(logic_table: impl Into<String>, actual_table: impl Into<String>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_table: actual_table.into(),
        }
    }
}

/// One rewritten INSERT row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertValueUnit {
    pub columns: Vec<String>,
    /// Placeholders index into the owning unit's parameters
    pub values: Vec<Expression>,
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

impl fmt::Display for InsertValueUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .values
            .iter()
            .map(|v| match v {
                Expression::Parameter(_) => "?".to_string(),
                Expression::Literal(value) => render_literal(value),
            })
            .collect();
        write!(f, "({})", rendered.join(", "))
    }
}

/// Work for one physical target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionUnit {
    pub data_source_name: String,
    pub table_units: Vec<TableUnit>,
    pub parameters: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_value: Option<InsertValueUnit>,
}

impl ExecutionUnit {
    pub fn new(data_source_name: impl Into<String>, table_units: Vec<TableUnit>, parameters: Vec<Value>) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            table_units,
            parameters,
            insert_value: None,
        }
    }

    /// Actual table standing in for `logic_table`.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_units
            .iter()
            .find(|u| u.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|u| u.actual_table.as_str())
    }

    /// Data node of the first table unit.
    pub fn data_node(&self) -> Option<DataNode> {
        self.table_units
            .first()
            .map(|u| DataNode::new(self.data_source_name.as_str(), u.actual_table.as_str()))
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables: Vec<String> = self
            .table_units
            .iter()
            .map(|u| format!("{}->{}", u.logic_table, u.actual_table))
            .collect();
        write!(f, "{} [{}]", self.data_source_name, tables.join(", "))?;
        if let Some(insert_value) = &self.insert_value {
            write!(f, " {}", insert_value)?;
        }
        if !self.parameters.is_empty() {
            write!(f, " {}", Value::Array(self.parameters.clone()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteResult {
    Routed(Vec<ExecutionUnit>),
    /// Literal predicates can never match: contact no shard and return nothing
    NoTargets,
}

impl RouteResult {
    pub fn units(&self) -> &[ExecutionUnit] {
        match self {
            RouteResult::Routed(units) => units,
            RouteResult::NoTargets => &[],
        }
    }

    pub fn is_no_targets(&self) -> bool {
        matches!(self, RouteResult::NoTargets)
    }

    /// Distinct data sources in unit order.
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in self.units() {
            if !names.contains(&unit.data_source_name.as_str()) {
                names.push(unit.data_source_name.as_str());
            }
        }
        names
    }

    /// (data source, actual table) of every unit's first table.
    pub fn data_nodes(&self) -> Vec<DataNode> {
        self.units().iter().filter_map(|u| u.data_node()).collect()
    }
}

/// Key values of an INSERT, one per row, in row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedKey {
    pub column: String,
    pub values: Vec<Value>,
    /// False when every row supplied the key itself
    pub generated: bool,
}

/// Everything routing produced for one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteContext {
    pub route_result: RouteResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<GeneratedKey>,
}

impl RouteContext {
    pub fn units(&self) -> &[ExecutionUnit] {
        self.route_result.units()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_value_display() {
        let unit = InsertValueUnit {
            columns: vec!["a".into(), "b".into(), "c".into()],
            values: vec![Expression::param(0), Expression::param(1), Expression::param(2)],
        };
        assert_eq!(unit.to_string(), "(?, ?, ?)");

        let unit = InsertValueUnit {
            columns: vec!["a".into(), "b".into(), "c".into()],
            values: vec![
                Expression::literal(12),
                Expression::literal("it's"),
                Expression::Literal(Value::Null),
            ],
        };
        assert_eq!(unit.to_string(), "(12, 'it''s', NULL)");
    }

    #[test]
    fn test_route_result_accessors() {
        let result = RouteResult::Routed(vec![
            ExecutionUnit::new("ds_0", vec![TableUnit::new("t_order", "t_order_0")], vec![json!(1)]),
            ExecutionUnit::new("ds_0", vec![TableUnit::new("t_order", "t_order_1")], vec![]),
            ExecutionUnit::new("ds_1", vec![TableUnit::new("t_order", "t_order_0")], vec![]),
        ]);
        assert_eq!(result.data_source_names(), vec!["ds_0", "ds_1"]);
        assert_eq!(result.units()[1].actual_table("T_ORDER"), Some("t_order_1"));
        assert_eq!(result.data_nodes()[2], DataNode::new("ds_1", "t_order_0"));
        assert!(RouteResult::NoTargets.units().is_empty());
        assert_eq!(
            result.units()[0].to_string(),
            "ds_0 [t_order->t_order_0] [1]"
        );
    }
}
