//! Shape of a SELECT as far as merging is concerned.
//!
//! Column indexes are 0-based positions in the per-shard result rows,
//! including hidden columns added for AVG recomposition.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ShardingError, ShardingResult};
use crate::value::as_i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Where NULL sits in the natural order before direction is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrdering {
    /// NULL below every value: first ascending, last descending
    #[default]
    Smallest,
    /// NULL above every value: last ascending, first descending
    Largest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub index: usize,
    #[serde(default)]
    pub direction: OrderDirection,
    #[serde(default)]
    pub nulls: NullOrdering,
}

impl OrderByItem {
    pub fn asc(index: usize) -> Self {
        Self {
            index,
            direction: OrderDirection::Asc,
            nulls: NullOrdering::Smallest,
        }
    }

    pub fn desc(index: usize) -> Self {
        Self {
            index,
            direction: OrderDirection::Desc,
            nulls: NullOrdering::Smallest,
        }
    }

    pub fn nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationKind {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

/// An aggregate column. AVG carries the hidden COUNT and SUM columns it is
/// recomposed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationProjection {
    pub index: usize,
    pub kind: AggregationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_count_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_sum_index: Option<usize>,
}

impl AggregationProjection {
    pub fn new(index: usize, kind: AggregationKind) -> Self {
        Self {
            index,
            kind,
            derived_count_index: None,
            derived_sum_index: None,
        }
    }

    pub fn avg(index: usize, count_index: usize, sum_index: usize) -> Self {
        Self {
            index,
            kind: AggregationKind::Avg,
            derived_count_index: Some(count_index),
            derived_sum_index: Some(sum_index),
        }
    }

    /// Columns read from each shard row to accumulate this projection.
    pub fn input_indexes(&self) -> ShardingResult<Vec<usize>> {
        match self.kind {
            AggregationKind::Avg => match (self.derived_count_index, self.derived_sum_index) {
                (Some(count), Some(sum)) => Ok(vec![count, sum]),
                _ => Err(ShardingError::InvalidArgument(format!(
                    "AVG projection at column {} needs derived COUNT and SUM columns",
                    self.index
                ))),
            },
            _ => Ok(vec![self.index]),
        }
    }
}

/// A LIMIT operand, either inline or bound at execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationValue {
    Literal(i64),
    Parameter(usize),
}

impl PaginationValue {
    pub fn resolve(&self, parameters: &[Value]) -> ShardingResult<u64> {
        let n = match self {
            PaginationValue::Literal(n) => *n,
            PaginationValue::Parameter(i) => {
                let value = parameters.get(*i).ok_or_else(|| {
                    ShardingError::InvalidArgument(format!(
                        "Pagination parameter {} is not bound ({} parameters given)",
                        i,
                        parameters.len()
                    ))
                })?;
                as_i64(value).map_err(|_| {
                    ShardingError::InvalidArgument(format!(
                        "Pagination parameter {} is not an integer: {}",
                        i, value
                    ))
                })?
            }
        };
        u64::try_from(n).map_err(|_| {
            ShardingError::InvalidArgument(format!("Pagination value cannot be negative: {}", n))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<PaginationValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<PaginationValue>,
}

impl Pagination {
    pub fn new(offset: Option<PaginationValue>, row_count: Option<PaginationValue>) -> Self {
        Self { offset, row_count }
    }

    /// `LIMIT offset, row_count` with literal operands
    pub fn limit(offset: i64, row_count: i64) -> Self {
        Self::new(
            Some(PaginationValue::Literal(offset)),
            Some(PaginationValue::Literal(row_count)),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectContext {
    #[serde(default)]
    pub aggregations: Vec<AggregationProjection>,
    #[serde(default)]
    pub group_by: Vec<OrderByItem>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl SelectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregation(mut self, projection: AggregationProjection) -> Self {
        self.aggregations.push(projection);
        self
    }

    pub fn group_by(mut self, item: OrderByItem) -> Self {
        self.group_by.push(item);
        self
    }

    pub fn order_by(mut self, item: OrderByItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn has_grouping(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }

    /// Shards return rows already sorted by GROUP BY when ORDER BY is absent
    /// or identical to it.
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        !self.group_by.is_empty() && (self.order_by.is_empty() || self.order_by == self.group_by)
    }

    /// The order rows leave the merge in: ORDER BY, else GROUP BY.
    pub fn effective_order(&self) -> &[OrderByItem] {
        if self.order_by.is_empty() {
            &self.group_by
        } else {
            &self.order_by
        }
    }
}
