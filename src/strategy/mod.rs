//! Sharding strategies
//!
//! A strategy turns the route values of one condition into the subset of
//! targets (data sources or actual tables) a logic table must visit. The set
//! of strategy kinds is closed: standard, complex, hint and none.

pub mod algorithm;
pub mod builtin;
pub mod hint;
pub mod registry;
pub mod value;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use algorithm::{
    ComplexKeysShardingAlgorithm, ComplexShardingValues, HintShardingAlgorithm,
    HintShardingValue, PreciseShardingAlgorithm, PreciseShardingValue, RangeShardingAlgorithm,
    RangeShardingValue,
};
pub use hint::{HintManager, ShardingDimension};
pub use registry::{AlgorithmRegistry, Props};
pub use value::{ListRouteValue, RangeRouteValue, RouteValue, ValueRange};

use crate::error::{ShardingError, ShardingResult};

/// Everything a strategy needs besides the route values themselves.
#[derive(Clone, Copy)]
pub struct ShardingContext<'a> {
    pub logic_table: &'a str,
    pub dimension: ShardingDimension,
    pub hint: Option<&'a HintManager>,
}

/// One column bound to a precise algorithm and an optional range algorithm.
#[derive(Clone)]
pub struct StandardShardingStrategy {
    pub column: String,
    pub precise: Arc<dyn PreciseShardingAlgorithm>,
    pub range: Option<Arc<dyn RangeShardingAlgorithm>>,
}

/// Several columns handed together to one algorithm.
#[derive(Clone)]
pub struct ComplexShardingStrategy {
    pub columns: Vec<String>,
    pub algorithm: Arc<dyn ComplexKeysShardingAlgorithm>,
}

/// Routes by values pushed into a [`HintManager`], ignoring predicates.
#[derive(Clone)]
pub struct HintShardingStrategy {
    pub algorithm: Arc<dyn HintShardingAlgorithm>,
}

#[derive(Clone)]
pub enum ShardingStrategy {
    Standard(StandardShardingStrategy),
    Complex(ComplexShardingStrategy),
    Hint(HintShardingStrategy),
    None,
}

impl fmt::Debug for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingStrategy::Standard(s) => f
                .debug_struct("Standard")
                .field("column", &s.column)
                .field("precise", &s.precise)
                .field("range", &s.range)
                .finish(),
            ShardingStrategy::Complex(s) => f
                .debug_struct("Complex")
                .field("columns", &s.columns)
                .field("algorithm", &s.algorithm)
                .finish(),
            ShardingStrategy::Hint(s) => {
                f.debug_struct("Hint").field("algorithm", &s.algorithm).finish()
            }
            ShardingStrategy::None => write!(f, "None"),
        }
    }
}

impl ShardingStrategy {
    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::Standard(s) => vec![s.column.as_str()],
            ShardingStrategy::Complex(s) => s.columns.iter().map(|c| c.as_str()).collect(),
            ShardingStrategy::Hint(_) | ShardingStrategy::None => Vec::new(),
        }
    }

    pub fn has_sharding_column(&self, column: &str) -> bool {
        self.sharding_columns()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Route `available_targets` through this strategy.
    ///
    /// `route_values` are the values of one sharding condition; values for
    /// other tables or columns are ignored. A sharding column without a value
    /// routes to every available target.
    pub fn do_sharding(
        &self,
        available_targets: &[String],
        route_values: &[RouteValue],
        ctx: &ShardingContext<'_>,
    ) -> ShardingResult<Vec<String>> {
        match self {
            ShardingStrategy::Standard(s) => s.do_sharding(available_targets, route_values, ctx),
            ShardingStrategy::Complex(s) => s.do_sharding(available_targets, route_values, ctx),
            ShardingStrategy::Hint(s) => s.do_sharding(available_targets, ctx),
            ShardingStrategy::None => Ok(available_targets.to_vec()),
        }
    }
}

impl StandardShardingStrategy {
    fn do_sharding(
        &self,
        available_targets: &[String],
        route_values: &[RouteValue],
        ctx: &ShardingContext<'_>,
    ) -> ShardingResult<Vec<String>> {
        let route_value = match route_values
            .iter()
            .find(|v| v.matches(ctx.logic_table, &self.column))
        {
            Some(v) => v,
            None => return Ok(available_targets.to_vec()),
        };
        let routed = match route_value {
            RouteValue::List(list) => {
                let mut routed = Vec::with_capacity(list.values.len());
                for value in &list.values {
                    let sharding_value = PreciseShardingValue {
                        logic_table: ctx.logic_table,
                        column_name: &self.column,
                        value,
                    };
                    routed.push(self.precise.do_sharding(available_targets, &sharding_value)?);
                }
                routed
            }
            RouteValue::Range(range) => match &self.range {
                Some(algorithm) => {
                    let sharding_value = RangeShardingValue {
                        logic_table: ctx.logic_table,
                        column_name: &self.column,
                        range: &range.range,
                    };
                    algorithm.do_sharding(available_targets, &sharding_value)?
                }
                None => {
                    tracing::debug!(
                        "No range algorithm for {}.{}, routing range {} to all {} targets",
                        ctx.logic_table,
                        self.column,
                        range.range,
                        available_targets.len()
                    );
                    return Ok(available_targets.to_vec());
                }
            },
        };
        retain_available(available_targets, &routed)
    }
}

impl ComplexShardingStrategy {
    fn do_sharding(
        &self,
        available_targets: &[String],
        route_values: &[RouteValue],
        ctx: &ShardingContext<'_>,
    ) -> ShardingResult<Vec<String>> {
        let mut column_values: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
        let mut column_ranges: HashMap<String, ValueRange> = HashMap::new();
        for column in &self.columns {
            for value in route_values.iter().filter(|v| v.matches(ctx.logic_table, column)) {
                match value {
                    RouteValue::List(list) => {
                        column_values.insert(column.clone(), list.values.clone());
                    }
                    RouteValue::Range(range) => {
                        column_ranges.insert(column.clone(), range.range.clone());
                    }
                }
            }
        }
        if column_values.is_empty() && column_ranges.is_empty() {
            return Ok(available_targets.to_vec());
        }
        let sharding_values = ComplexShardingValues {
            logic_table: ctx.logic_table,
            column_values,
            column_ranges,
        };
        let routed = self.algorithm.do_sharding(available_targets, &sharding_values)?;
        retain_available(available_targets, &routed)
    }
}

impl HintShardingStrategy {
    fn do_sharding(
        &self,
        available_targets: &[String],
        ctx: &ShardingContext<'_>,
    ) -> ShardingResult<Vec<String>> {
        let values = ctx
            .hint
            .map(|h| h.sharding_values(ctx.logic_table, ctx.dimension))
            .unwrap_or(&[]);
        if values.is_empty() {
            return Ok(available_targets.to_vec());
        }
        let sharding_value = HintShardingValue {
            logic_table: ctx.logic_table,
            values,
        };
        let routed = self.algorithm.do_sharding(available_targets, &sharding_value)?;
        retain_available(available_targets, &routed)
    }
}

/// Keep the available targets an algorithm picked, in available order.
fn retain_available(available_targets: &[String], routed: &[String]) -> ShardingResult<Vec<String>> {
    if let Some(unknown) = routed
        .iter()
        .find(|r| !available_targets.iter().any(|a| a.eq_ignore_ascii_case(r)))
    {
        return Err(ShardingError::Algorithm(format!(
            "Routed to '{}', which is not one of {:?}",
            unknown, available_targets
        )));
    }
    Ok(available_targets
        .iter()
        .filter(|a| routed.iter().any(|r| r.eq_ignore_ascii_case(a)))
        .cloned()
        .collect())
}
