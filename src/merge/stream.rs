//! Stream merges: rows are pulled from the shard cursors on demand, at most
//! one pending row per shard.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use serde_json::Value;

use super::compare::compare_sort_keys;
use super::context::OrderByItem;
use super::query_result::QueryResult;
use crate::error::{ShardingError, ShardingResult};

fn no_current_row() -> ShardingError {
    ShardingError::Merge("No current row".to_string())
}

/// Shards drained one after another in the order given.
pub struct IteratorStreamMergedResult<'a> {
    results: Vec<&'a mut dyn QueryResult>,
    current: usize,
    positioned: bool,
}

impl<'a> IteratorStreamMergedResult<'a> {
    pub fn new(results: Vec<&'a mut dyn QueryResult>) -> Self {
        Self {
            results,
            current: 0,
            positioned: false,
        }
    }

    pub fn next(&mut self) -> ShardingResult<bool> {
        while self.current < self.results.len() {
            if self.results[self.current].next()? {
                self.positioned = true;
                return Ok(true);
            }
            self.current += 1;
        }
        self.positioned = false;
        Ok(false)
    }

    pub fn value(&self, index: usize) -> ShardingResult<Value> {
        if !self.positioned {
            return Err(no_current_row());
        }
        self.results[self.current].value(index)
    }
}

/// Head row of one shard waiting in the priority queue.
struct OrderByValue {
    shard: usize,
    sort_keys: Vec<Value>,
    items: Arc<[OrderByItem]>,
}

impl PartialEq for OrderByValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderByValue {}

impl PartialOrd for OrderByValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderByValue {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest: invert so the first row in order wins,
        // and on ties the lower shard goes first
        compare_sort_keys(&self.items, &self.sort_keys, &other.sort_keys)
            .reverse()
            .then_with(|| other.shard.cmp(&self.shard))
    }
}

/// K-way merge of shards that are each sorted by `items`.
pub struct OrderByStreamMergedResult<'a> {
    results: Vec<&'a mut dyn QueryResult>,
    items: Arc<[OrderByItem]>,
    queue: BinaryHeap<OrderByValue>,
    current: Option<usize>,
    initialized: bool,
}

impl<'a> OrderByStreamMergedResult<'a> {
    pub fn new(results: Vec<&'a mut dyn QueryResult>, items: &[OrderByItem]) -> Self {
        Self {
            queue: BinaryHeap::with_capacity(results.len()),
            results,
            items: items.into(),
            current: None,
            initialized: false,
        }
    }

    /// Advance shard `shard` and queue its new head row, if any.
    fn pull(&mut self, shard: usize) -> ShardingResult<()> {
        let result = &mut self.results[shard];
        if !result.next()? {
            tracing::trace!("Shard {} exhausted", shard);
            return Ok(());
        }
        let sort_keys = self
            .items
            .iter()
            .map(|item| result.value(item.index))
            .collect::<ShardingResult<Vec<_>>>()?;
        self.queue.push(OrderByValue {
            shard,
            sort_keys,
            items: Arc::clone(&self.items),
        });
        Ok(())
    }

    pub fn next(&mut self) -> ShardingResult<bool> {
        if !self.initialized {
            self.initialized = true;
            for shard in 0..self.results.len() {
                self.pull(shard)?;
            }
        } else if let Some(shard) = self.current.take() {
            self.pull(shard)?;
        }
        self.current = self.queue.pop().map(|head| head.shard);
        Ok(self.current.is_some())
    }

    pub fn value(&self, index: usize) -> ShardingResult<Value> {
        match self.current {
            Some(shard) => self.results[shard].value(index),
            None => Err(no_current_row()),
        }
    }
}

impl QueryResult for OrderByStreamMergedResult<'_> {
    fn next(&mut self) -> ShardingResult<bool> {
        OrderByStreamMergedResult::next(self)
    }

    fn value(&self, index: usize) -> ShardingResult<Value> {
        OrderByStreamMergedResult::value(self, index)
    }

    fn column_count(&self) -> usize {
        self.results.first().map_or(0, |r| r.column_count())
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        match self.results.first() {
            Some(r) => r.column_label(index),
            None => Err(ShardingError::Merge(format!("Column index {} out of range", index))),
        }
    }
}
