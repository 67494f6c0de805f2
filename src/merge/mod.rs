//! Result merging
//!
//! `MergeEngine` turns the cursors of every routed shard into one logical
//! cursor. The combine strategy is chosen once per query from the SELECT
//! shape:
//! - GROUP BY with ORDER BY absent or equal to it: group-by stream
//! - any other grouping or aggregation: group-by memory
//! - ORDER BY only: order-by stream
//! - neither: shards concatenated
//!
//! Pagination wraps whichever strategy was chosen.

pub mod aggregation;
pub mod compare;
pub mod context;
pub mod group_by;
pub mod group_by_value;
pub mod query_result;
pub mod stream;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use aggregation::{AggregationUnit, AggregationUnits};
pub use context::{
    AggregationKind, AggregationProjection, NullOrdering, OrderByItem, OrderDirection, Pagination,
    PaginationValue, SelectContext,
};
pub use group_by::{GroupByMemoryMergedResult, GroupByStreamMergedResult};
pub use group_by_value::GroupByValue;
pub use query_result::{MemoryQueryResult, QueryResult};
pub use stream::{IteratorStreamMergedResult, OrderByStreamMergedResult};

use crate::error::{ShardingError, ShardingResult};

enum MergeStrategy<'a> {
    Iterator(IteratorStreamMergedResult<'a>),
    OrderBy(OrderByStreamMergedResult<'a>),
    GroupByStream(GroupByStreamMergedResult<'a>),
    GroupByMemory(GroupByMemoryMergedResult),
}

impl MergeStrategy<'_> {
    fn name(&self) -> &'static str {
        match self {
            MergeStrategy::Iterator(_) => "iterator stream",
            MergeStrategy::OrderBy(_) => "order-by stream",
            MergeStrategy::GroupByStream(_) => "group-by stream",
            MergeStrategy::GroupByMemory(_) => "group-by memory",
        }
    }

    fn next(&mut self) -> ShardingResult<bool> {
        match self {
            MergeStrategy::Iterator(r) => r.next(),
            MergeStrategy::OrderBy(r) => r.next(),
            MergeStrategy::GroupByStream(r) => r.next(),
            MergeStrategy::GroupByMemory(r) => r.next(),
        }
    }

    fn value(&self, index: usize) -> ShardingResult<Value> {
        match self {
            MergeStrategy::Iterator(r) => r.value(index),
            MergeStrategy::OrderBy(r) => r.value(index),
            MergeStrategy::GroupByStream(r) => r.value(index),
            MergeStrategy::GroupByMemory(r) => r.value(index),
        }
    }
}

/// The single logical cursor over all shards.
pub struct MergedResult<'a> {
    strategy: MergeStrategy<'a>,
    labels: Vec<String>,
    /// Rows still allowed by LIMIT; `None` means unbounded
    remaining: Option<u64>,
    positioned: bool,
}

impl<'a> MergedResult<'a> {
    fn new(
        strategy: MergeStrategy<'a>,
        labels: Vec<String>,
        offset: u64,
        row_count: Option<u64>,
    ) -> ShardingResult<Self> {
        let mut merged = Self {
            strategy,
            labels,
            remaining: row_count,
            positioned: false,
        };
        let mut skipped = 0;
        while skipped < offset && merged.strategy.next()? {
            skipped += 1;
        }
        if skipped < offset {
            tracing::trace!("Offset {} passes the last of {} rows", offset, skipped);
            merged.remaining = Some(0);
        }
        Ok(merged)
    }

    pub fn next(&mut self) -> ShardingResult<bool> {
        if self.remaining == Some(0) {
            self.positioned = false;
            return Ok(false);
        }
        self.positioned = self.strategy.next()?;
        if self.positioned {
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
        }
        Ok(self.positioned)
    }

    pub fn value(&self, index: usize) -> ShardingResult<Value> {
        if !self.positioned {
            return Err(ShardingError::Merge("No current row".to_string()));
        }
        self.strategy.value(index)
    }

    /// Decode a cell into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> ShardingResult<T> {
        let value = self.value(index)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ShardingError::Merge(format!("Cannot decode column {} from {}: {}", index, value, e))
        })
    }

    pub fn column_count(&self) -> usize {
        self.labels.len()
    }

    pub fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.labels
            .get(index)
            .cloned()
            .ok_or_else(|| ShardingError::Merge(format!("Column index {} out of range", index)))
    }

    /// Remaining rows as vectors of `column_count()` cells.
    pub fn collect_rows(mut self) -> ShardingResult<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push(
                (0..self.column_count())
                    .map(|i| self.value(i))
                    .collect::<ShardingResult<Vec<_>>>()?,
            );
        }
        Ok(rows)
    }
}

/// Builds the merged cursor for one SELECT.
pub struct MergeEngine<'c> {
    context: &'c SelectContext,
    parameters: &'c [Value],
}

impl<'c> MergeEngine<'c> {
    /// `parameters` are the statement's bound parameters, for LIMIT placeholders.
    pub fn new(context: &'c SelectContext, parameters: &'c [Value]) -> Self {
        Self {
            context,
            parameters,
        }
    }

    /// Merge the shard cursors. Memory merge drains every cursor here, so a
    /// failing shard surfaces from this call; stream merges surface it from
    /// `next()` / `value()`.
    pub fn merge<'a>(&self, results: Vec<&'a mut dyn QueryResult>) -> ShardingResult<MergedResult<'a>> {
        let (offset, row_count) = self.pagination()?;
        let labels = match results.first() {
            Some(r) => (0..r.column_count())
                .map(|i| r.column_label(i))
                .collect::<ShardingResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let context = self.context;
        let strategy = if context.has_grouping() {
            if context.is_same_group_by_and_order_by() {
                MergeStrategy::GroupByStream(GroupByStreamMergedResult::new(results, context))
            } else {
                MergeStrategy::GroupByMemory(GroupByMemoryMergedResult::new(results, context)?)
            }
        } else if !context.order_by.is_empty() {
            MergeStrategy::OrderBy(OrderByStreamMergedResult::new(results, &context.order_by))
        } else {
            MergeStrategy::Iterator(IteratorStreamMergedResult::new(results))
        };
        let labels = match &strategy {
            MergeStrategy::GroupByMemory(r) if labels.is_empty() => (0..r.column_count())
                .map(|i| format!("column_{}", i))
                .collect(),
            _ => labels,
        };
        tracing::debug!(
            "Merging with {} (offset {}, row count {:?})",
            strategy.name(),
            offset,
            row_count
        );
        MergedResult::new(strategy, labels, offset, row_count)
    }

    fn pagination(&self) -> ShardingResult<(u64, Option<u64>)> {
        let pagination = match &self.context.pagination {
            Some(p) => p,
            None => return Ok((0, None)),
        };
        let offset = match &pagination.offset {
            Some(v) => v.resolve(self.parameters)?,
            None => 0,
        };
        let row_count = match &pagination.row_count {
            Some(v) => Some(v.resolve(self.parameters)?),
            None => None,
        };
        Ok((offset, row_count))
    }
}
