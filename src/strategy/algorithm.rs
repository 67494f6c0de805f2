//! Sharding algorithm traits.
//!
//! Implement one of these to plug a custom algorithm into the
//! [`AlgorithmRegistry`](super::AlgorithmRegistry). Every algorithm receives the
//! targets available for the dimension being routed (data source names or
//! actual table names) and returns the subset the value maps to.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::value::ValueRange;
use crate::error::ShardingResult;

/// One value from an `=` / `IN` predicate.
#[derive(Debug, Clone, Copy)]
pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column_name: &'a str,
    pub value: &'a Value,
}

/// One range from a `BETWEEN` / comparison predicate.
#[derive(Debug, Clone, Copy)]
pub struct RangeShardingValue<'a> {
    pub logic_table: &'a str,
    pub column_name: &'a str,
    pub range: &'a ValueRange,
}

/// Every sharding column of a complex strategy that the statement constrains.
#[derive(Debug, Clone, Default)]
pub struct ComplexShardingValues<'a> {
    pub logic_table: &'a str,
    pub column_values: HashMap<String, Vec<Value>>,
    pub column_ranges: HashMap<String, ValueRange>,
}

/// Values pushed through a [`HintManager`](super::HintManager).
#[derive(Debug, Clone, Copy)]
pub struct HintShardingValue<'a> {
    pub logic_table: &'a str,
    pub values: &'a [Value],
}

pub trait PreciseShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<String>;
}

pub trait RangeShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>>;
}

pub trait ComplexKeysShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_values: &ComplexShardingValues<'_>,
    ) -> ShardingResult<Vec<String>>;
}

pub trait HintShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &HintShardingValue<'_>,
    ) -> ShardingResult<Vec<String>>;
}
