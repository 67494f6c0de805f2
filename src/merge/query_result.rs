use serde_json::Value;

use crate::error::{ShardingError, ShardingResult};

/// Forward cursor over the rows one shard returned.
///
/// Implemented by the execution layer. Errors raised here are handed back to
/// the caller of the merged cursor untouched.
pub trait QueryResult {
    /// Advance to the next row; `false` once exhausted.
    fn next(&mut self) -> ShardingResult<bool>;

    /// Cell of the current row at a 0-based column index.
    fn value(&self, index: usize) -> ShardingResult<Value>;

    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> ShardingResult<String>;
}

/// A `QueryResult` over rows already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Vec<Value>>,
    cursor: Option<usize>,
}

impl MemoryQueryResult {
    pub fn new(labels: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            rows,
            cursor: None,
        }
    }

    fn current(&self) -> ShardingResult<&[Value]> {
        self.cursor
            .and_then(|i| self.rows.get(i))
            .map(|row| row.as_slice())
            .ok_or_else(|| ShardingError::QueryResult("No current row".to_string()))
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> ShardingResult<bool> {
        let next = self.cursor.map_or(0, |i| i + 1);
        if next < self.rows.len() {
            self.cursor = Some(next);
            Ok(true)
        } else {
            // Park past the end so value() fails after exhaustion
            self.cursor = Some(self.rows.len());
            Ok(false)
        }
    }

    fn value(&self, index: usize) -> ShardingResult<Value> {
        self.current()?.get(index).cloned().ok_or_else(|| {
            ShardingError::QueryResult(format!("Column index {} out of range", index))
        })
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> ShardingResult<String> {
        self.labels.get(index).cloned().ok_or_else(|| {
            ShardingError::QueryResult(format!("Column index {} out of range", index))
        })
    }
}

/// Copy every cell of the current row.
pub(crate) fn read_row(result: &dyn QueryResult, column_count: usize) -> ShardingResult<Vec<Value>> {
    (0..column_count).map(|i| result.value(i)).collect()
}
