//! Cross-shard aggregation
//!
//! Each projection maps to a combine rule applied to the per-shard partial
//! values of one group:
//! - COUNT and SUM add the partials
//! - MAX and MIN keep the extreme non-null partial
//! - AVG adds its derived COUNT and SUM partials and divides once at the end

use std::cmp::Ordering;

use serde_json::Value;

use super::context::{AggregationKind, AggregationProjection};
use crate::error::{ShardingError, ShardingResult};
use crate::value::{as_f64, compare_values, number_from_f64};

/// A running numeric total that stays integral until it cannot.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Total {
    Int(i64),
    Float(f64),
}

impl Total {
    fn add(self, value: &Value) -> ShardingResult<Total> {
        if let Value::Number(n) = value {
            if let (Total::Int(acc), Some(i)) = (self, n.as_i64()) {
                if let Some(sum) = acc.checked_add(i) {
                    return Ok(Total::Int(sum));
                }
            }
        }
        let f = as_f64(value).ok_or_else(|| {
            ShardingError::Merge(format!("Cannot aggregate non-numeric value {}", value))
        })?;
        Ok(Total::Float(self.as_f64() + f))
    }

    fn as_f64(self) -> f64 {
        match self {
            Total::Int(i) => i as f64,
            Total::Float(f) => f,
        }
    }

    fn to_value(self) -> Value {
        match self {
            Total::Int(i) => Value::from(i),
            Total::Float(f) => number_from_f64(f),
        }
    }
}

fn add_partial(total: Option<Total>, partial: &Value) -> ShardingResult<Option<Total>> {
    if partial.is_null() {
        return Ok(total);
    }
    total.unwrap_or(Total::Int(0)).add(partial).map(Some)
}

#[derive(Debug, Clone)]
enum State {
    Count(Total),
    Sum(Option<Total>),
    Extreme(Option<Value>),
    Avg { count: Total, sum: Option<Total> },
}

/// Accumulator for one aggregate projection within one group.
#[derive(Debug, Clone)]
pub struct AggregationUnit {
    projection: AggregationProjection,
    inputs: Vec<usize>,
    state: State,
}

impl AggregationUnit {
    pub fn new(projection: AggregationProjection) -> ShardingResult<Self> {
        let state = match projection.kind {
            AggregationKind::Count => State::Count(Total::Int(0)),
            AggregationKind::Sum => State::Sum(None),
            AggregationKind::Max | AggregationKind::Min => State::Extreme(None),
            AggregationKind::Avg => State::Avg {
                count: Total::Int(0),
                sum: None,
            },
        };
        Ok(Self {
            inputs: projection.input_indexes()?,
            projection,
            state,
        })
    }

    /// Fold one shard row's partial values into the group.
    pub fn merge(&mut self, row: &[Value]) -> ShardingResult<()> {
        let input = |i: usize| row.get(self.inputs[i]).unwrap_or(&Value::Null);
        let kind = self.projection.kind;
        match &mut self.state {
            State::Count(total) => {
                let partial = input(0);
                if !partial.is_null() {
                    *total = total.add(partial)?;
                }
            }
            State::Sum(total) => *total = add_partial(*total, input(0))?,
            State::Extreme(current) => {
                let partial = input(0);
                if partial.is_null() {
                    return Ok(());
                }
                let wanted = if kind == AggregationKind::Max {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                let replace = match current {
                    Some(existing) => compare_values(partial, existing) == wanted,
                    None => true,
                };
                if replace {
                    *current = Some(partial.clone());
                }
            }
            State::Avg { count, sum } => {
                let partial_count = input(0);
                if !partial_count.is_null() {
                    *count = count.add(partial_count)?;
                }
                *sum = add_partial(*sum, input(1))?;
            }
        }
        Ok(())
    }

    /// The merged value of the projection column.
    pub fn result(&self) -> Value {
        match &self.state {
            State::Count(total) => total.to_value(),
            State::Sum(total) => total.map_or(Value::Null, Total::to_value),
            State::Extreme(current) => current.clone().unwrap_or(Value::Null),
            State::Avg { count, sum } => match sum {
                Some(sum) if count.as_f64() != 0.0 => number_from_f64(sum.as_f64() / count.as_f64()),
                _ => Value::Null,
            },
        }
    }

    /// Write the merged value, and for AVG the merged derived columns, into `row`.
    pub fn write_into(&self, row: &mut Vec<Value>) {
        put(row, self.projection.index, self.result());
        if let State::Avg { count, sum } = &self.state {
            put(row, self.inputs[0], count.to_value());
            put(row, self.inputs[1], sum.map_or(Value::Null, Total::to_value));
        }
    }
}

fn put(row: &mut Vec<Value>, index: usize, value: Value) {
    if row.len() <= index {
        row.resize(index + 1, Value::Null);
    }
    row[index] = value;
}

/// The aggregation units of one group, applied in projection order.
#[derive(Debug, Clone)]
pub struct AggregationUnits {
    units: Vec<AggregationUnit>,
}

impl AggregationUnits {
    pub fn new(projections: &[AggregationProjection]) -> ShardingResult<Self> {
        let units = projections
            .iter()
            .map(|p| AggregationUnit::new(*p))
            .collect::<ShardingResult<Vec<_>>>()?;
        Ok(Self { units })
    }

    pub fn merge(&mut self, row: &[Value]) -> ShardingResult<()> {
        for unit in &mut self.units {
            unit.merge(row)?;
        }
        Ok(())
    }

    pub fn write_into(&self, row: &mut Vec<Value>) {
        for unit in &self.units {
            unit.write_into(row);
        }
    }
}
