//! GROUP BY merges
//!
//! The stream variant relies on every shard returning rows sorted by the
//! GROUP BY columns and combines consecutive rows of one group while reading
//! one row ahead. The memory variant drains every shard into a grouping map
//! first and sorts the merged groups afterwards.

use std::collections::HashMap;

use serde_json::Value;

use super::aggregation::AggregationUnits;
use super::compare::compare_rows;
use super::context::{AggregationProjection, OrderByItem, SelectContext};
use super::group_by_value::GroupByValue;
use super::query_result::{read_row, QueryResult};
use super::stream::OrderByStreamMergedResult;
use crate::error::{ShardingError, ShardingResult};

pub struct GroupByStreamMergedResult<'a> {
    inner: OrderByStreamMergedResult<'a>,
    group_by: Vec<OrderByItem>,
    aggregations: Vec<AggregationProjection>,
    column_count: usize,
    /// Inner cursor sits on the first row of the next group
    pending: bool,
    started: bool,
    current: Option<Vec<Value>>,
}

impl<'a> GroupByStreamMergedResult<'a> {
    pub fn new(results: Vec<&'a mut dyn QueryResult>, context: &SelectContext) -> Self {
        let column_count = results.first().map_or(0, |r| r.column_count());
        Self {
            inner: OrderByStreamMergedResult::new(results, &context.group_by),
            group_by: context.group_by.clone(),
            aggregations: context.aggregations.clone(),
            column_count,
            pending: false,
            started: false,
            current: None,
        }
    }

    pub fn next(&mut self) -> ShardingResult<bool> {
        if !self.started {
            self.started = true;
            self.pending = self.inner.next()?;
        }
        if !self.pending {
            self.current = None;
            return Ok(false);
        }

        let mut row = read_row(&self.inner, self.column_count)?;
        let key = GroupByValue::from_row(&row, &self.group_by);
        let mut units = AggregationUnits::new(&self.aggregations)?;
        units.merge(&row)?;
        loop {
            self.pending = self.inner.next()?;
            if !self.pending {
                break;
            }
            let candidate = read_row(&self.inner, self.column_count)?;
            if GroupByValue::from_row(&candidate, &self.group_by) != key {
                break;
            }
            units.merge(&candidate)?;
        }
        units.write_into(&mut row);
        tracing::trace!("Group {:?} merged", key.values());
        self.current = Some(row);
        Ok(true)
    }

    pub fn value(&self, index: usize) -> ShardingResult<Value> {
        current_value(self.current.as_deref(), index)
    }
}

fn current_value(row: Option<&[Value]>, index: usize) -> ShardingResult<Value> {
    let row = row.ok_or_else(|| ShardingError::Merge("No current row".to_string()))?;
    row.get(index)
        .cloned()
        .ok_or_else(|| ShardingError::Merge(format!("Column index {} out of range", index)))
}

pub struct GroupByMemoryMergedResult {
    rows: Vec<Vec<Value>>,
    labels: Vec<String>,
    column_count: usize,
    position: Option<usize>,
}

impl GroupByMemoryMergedResult {
    /// Drain every shard, group and combine the rows, then sort the groups.
    pub fn new(results: Vec<&mut dyn QueryResult>, context: &SelectContext) -> ShardingResult<Self> {
        let column_count = match results.first() {
            Some(r) => r.column_count(),
            None => fallback_column_count(&context.aggregations),
        };
        let labels = match results.first() {
            Some(r) => (0..r.column_count())
                .map(|i| r.column_label(i))
                .collect::<ShardingResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let mut groups: Vec<(Vec<Value>, AggregationUnits)> = Vec::new();
        let mut index: HashMap<GroupByValue, usize> = HashMap::new();
        for result in results {
            while result.next()? {
                let row = read_row(&*result, column_count)?;
                let key = GroupByValue::from_row(&row, &context.group_by);
                match index.get(&key) {
                    Some(&i) => groups[i].1.merge(&row)?,
                    None => {
                        let mut units = AggregationUnits::new(&context.aggregations)?;
                        units.merge(&row)?;
                        index.insert(key, groups.len());
                        groups.push((row, units));
                    }
                }
            }
        }

        // Aggregation over no rows still answers with one row
        if groups.is_empty() && context.group_by.is_empty() && !context.aggregations.is_empty() {
            let units = AggregationUnits::new(&context.aggregations)?;
            groups.push((vec![Value::Null; column_count], units));
        }

        let mut rows: Vec<Vec<Value>> = groups
            .into_iter()
            .map(|(mut row, units)| {
                units.write_into(&mut row);
                row
            })
            .collect();
        let order = context.effective_order();
        rows.sort_by(|a, b| compare_rows(order, a, b));
        tracing::debug!("Memory merge produced {} groups", rows.len());

        Ok(Self {
            rows,
            labels,
            column_count,
            position: None,
        })
    }

    pub fn next(&mut self) -> ShardingResult<bool> {
        let next = self.position.map_or(0, |i| i + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    pub fn value(&self, index: usize) -> ShardingResult<Value> {
        current_value(self.position.and_then(|i| self.rows.get(i)).map(|r| r.as_slice()), index)
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.labels
            .get(index)
            .cloned()
            .ok_or_else(|| ShardingError::Merge(format!("Column index {} out of range", index)))
    }
}

/// Widest column any aggregation writes, for merges with no shard at all.
fn fallback_column_count(aggregations: &[AggregationProjection]) -> usize {
    aggregations
        .iter()
        .flat_map(|a| {
            [Some(a.index), a.derived_count_index, a.derived_sum_index]
                .into_iter()
                .flatten()
        })
        .max()
        .map_or(0, |i| i + 1)
}
