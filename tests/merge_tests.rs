// ==================== Result Merge Tests ====================

use serde_json::{json, Value};
use shardsql::merge::{
    AggregationKind, AggregationProjection, GroupByMemoryMergedResult, GroupByStreamMergedResult,
    MemoryQueryResult, MergeEngine, NullOrdering, OrderByItem, Pagination, QueryResult,
    SelectContext,
};
use shardsql::{ShardingError, ShardingResult};

fn shard(labels: &[&str], rows: Vec<Vec<Value>>) -> MemoryQueryResult {
    MemoryQueryResult::new(labels, rows)
}

fn merge_rows(context: &SelectContext, shards: &mut [MemoryQueryResult]) -> ShardingResult<Vec<Vec<Value>>> {
    let results: Vec<&mut dyn QueryResult> = shards.iter_mut().map(|s| s as &mut dyn QueryResult).collect();
    MergeEngine::new(context, &[]).merge(results)?.collect_rows()
}

/// A shard that yields `rows` good rows and then fails.
struct FailingQueryResult {
    rows: usize,
    position: usize,
}

impl QueryResult for FailingQueryResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if self.position == self.rows {
            return Err(ShardingError::QueryResult("connection reset".to_string()));
        }
        self.position += 1;
        Ok(true)
    }

    fn value(&self, _index: usize) -> ShardingResult<Value> {
        Ok(json!(self.position))
    }

    fn column_count(&self) -> usize {
        1
    }

    fn column_label(&self, _index: usize) -> ShardingResult<String> {
        Ok("v".to_string())
    }
}

// Columns: 0 key, 1 COUNT, 2 SUM, 3 AVG, 4 AVG count, 5 AVG sum
const LABELS: [&str; 6] = ["k", "cnt", "total", "avg", "avg_cnt", "avg_sum"];

fn aggregate_context() -> SelectContext {
    SelectContext::new()
        .group_by(OrderByItem::asc(0))
        .aggregation(AggregationProjection::new(1, AggregationKind::Count))
        .aggregation(AggregationProjection::new(2, AggregationKind::Sum))
        .aggregation(AggregationProjection::avg(3, 4, 5))
}

fn aggregate_shards() -> Vec<MemoryQueryResult> {
    vec![
        shard(&LABELS, vec![
            vec![json!("J"), json!(1), json!(7), json!(7.0), json!(1), json!(7)],
            vec![json!("K"), json!(3), json!(30), json!(10.0), json!(3), json!(30)],
        ]),
        shard(&LABELS, vec![
            vec![json!("K"), json!(2), json!(10), json!(5.0), json!(2), json!(10)],
            vec![json!("L"), json!(4), json!(2), json!(0.5), json!(4), json!(2)],
        ]),
    ]
}

#[test]
fn test_stream_group_by_recomposes_avg() {
    let context = aggregate_context();
    let rows = merge_rows(&context, &mut aggregate_shards()).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec![json!("K"), json!(5), json!(40), json!(8.0), json!(5), json!(40)]);
}

#[test]
fn test_memory_group_by_recomposes_avg() {
    // ORDER BY differs from GROUP BY: memory merge
    let context = aggregate_context().order_by(OrderByItem::desc(2));
    let rows = merge_rows(&context, &mut aggregate_shards()).unwrap();
    let keys: Vec<&Value> = rows.iter().map(|r| &r[0]).collect();
    assert_eq!(keys, vec![&json!("K"), &json!("J"), &json!("L")]);
    assert_eq!(rows[0], vec![json!("K"), json!(5), json!(40), json!(8.0), json!(5), json!(40)]);
}

#[test]
fn test_stream_and_memory_merge_agree() {
    let context = aggregate_context();

    let mut stream_shards = aggregate_shards();
    let results: Vec<&mut dyn QueryResult> =
        stream_shards.iter_mut().map(|s| s as &mut dyn QueryResult).collect();
    let mut stream = GroupByStreamMergedResult::new(results, &context);
    let mut from_stream = Vec::new();
    while stream.next().unwrap() {
        from_stream.push((0..6).map(|i| stream.value(i).unwrap()).collect::<Vec<_>>());
    }

    let mut memory_shards = aggregate_shards();
    let results: Vec<&mut dyn QueryResult> =
        memory_shards.iter_mut().map(|s| s as &mut dyn QueryResult).collect();
    let mut memory = GroupByMemoryMergedResult::new(results, &context).unwrap();
    let mut from_memory = Vec::new();
    while memory.next().unwrap() {
        from_memory.push((0..6).map(|i| memory.value(i).unwrap()).collect::<Vec<_>>());
    }

    assert_eq!(from_stream.len(), 3);
    assert_eq!(from_stream, from_memory);
}

#[test]
fn test_aggregation_without_group_by() {
    let context = SelectContext::new()
        .aggregation(AggregationProjection::new(0, AggregationKind::Count))
        .aggregation(AggregationProjection::new(1, AggregationKind::Max))
        .aggregation(AggregationProjection::new(2, AggregationKind::Min));
    let labels = ["cnt", "mx", "mn"];
    let mut shards = vec![
        shard(&labels, vec![vec![json!(2), json!(9), json!(3)]]),
        shard(&labels, vec![vec![json!(5), json!(4), json!(-1)]]),
        shard(&labels, vec![vec![json!(0), Value::Null, Value::Null]]),
    ];
    let rows = merge_rows(&context, &mut shards).unwrap();
    assert_eq!(rows, vec![vec![json!(7), json!(9), json!(-1)]]);

    let mut empty = vec![shard(&labels, vec![]), shard(&labels, vec![])];
    let rows = merge_rows(&context, &mut empty).unwrap();
    assert_eq!(rows, vec![vec![json!(0), Value::Null, Value::Null]]);
}

#[test]
fn test_large_integer_groups_stay_distinct() {
    let context = SelectContext::new()
        .group_by(OrderByItem::asc(0))
        .order_by(OrderByItem::desc(1))
        .aggregation(AggregationProjection::new(1, AggregationKind::Count));
    let labels = ["order_id", "cnt"];
    let mut shards = vec![
        shard(&labels, vec![vec![json!(9_007_199_254_740_993_i64), json!(2)]]),
        shard(&labels, vec![vec![json!(9_007_199_254_740_992_i64), json!(1)]]),
    ];
    let rows = merge_rows(&context, &mut shards).unwrap();
    assert_eq!(
        rows,
        vec![
            vec![json!(9_007_199_254_740_993_i64), json!(2)],
            vec![json!(9_007_199_254_740_992_i64), json!(1)],
        ]
    );
}

fn numbered_shards() -> Vec<MemoryQueryResult> {
    vec![
        shard(&["v"], vec![vec![json!(1)], vec![json!(3)]]),
        shard(&["v"], vec![vec![json!(2)], vec![json!(4)]]),
    ]
}

#[test]
fn test_pagination_over_short_sequence() {
    let context = SelectContext::new()
        .order_by(OrderByItem::asc(0))
        .paginate(Pagination::limit(2, 3));
    let rows = merge_rows(&context, &mut numbered_shards()).unwrap();
    assert_eq!(rows, vec![vec![json!(3)], vec![json!(4)]]);
}

#[test]
fn test_pagination_offset_past_end() {
    for offset in [4, 5, 100] {
        let context = SelectContext::new()
            .order_by(OrderByItem::asc(0))
            .paginate(Pagination::limit(offset, 3));
        let rows = merge_rows(&context, &mut numbered_shards()).unwrap();
        assert!(rows.is_empty());
    }
}

#[test]
fn test_pagination_row_count_caps_output() {
    let context = SelectContext::new().paginate(Pagination::limit(0, 1));
    let rows = merge_rows(&context, &mut numbered_shards()).unwrap();
    assert_eq!(rows, vec![vec![json!(1)]]);
}

#[test]
fn test_negative_pagination_is_rejected() {
    let context = SelectContext::new().paginate(Pagination::limit(-1, 3));
    let err = merge_rows(&context, &mut numbered_shards()).unwrap_err();
    assert!(matches!(err, ShardingError::InvalidArgument(_)));
}

#[test]
fn test_null_ordering_policies() {
    let shards = || {
        vec![
            shard(&["v"], vec![vec![Value::Null], vec![json!(2)]]),
            shard(&["v"], vec![vec![json!(1)], vec![json!(3)]]),
        ]
    };

    let context = SelectContext::new().order_by(OrderByItem::asc(0));
    let rows = merge_rows(&context, &mut shards()).unwrap();
    assert_eq!(rows, vec![vec![Value::Null], vec![json!(1)], vec![json!(2)], vec![json!(3)]]);

    // Shards sorted with NULL last
    let mut shards = vec![
        shard(&["v"], vec![vec![json!(2)], vec![Value::Null]]),
        shard(&["v"], vec![vec![json!(1)], vec![json!(3)]]),
    ];
    let context = SelectContext::new().order_by(OrderByItem::asc(0).nulls(NullOrdering::Largest));
    let rows = merge_rows(&context, &mut shards).unwrap();
    assert_eq!(rows, vec![vec![json!(1)], vec![json!(2)], vec![json!(3)], vec![Value::Null]]);
}

#[test]
fn test_mixed_types_order_by_rank() {
    let mut shards = vec![
        shard(&["v"], vec![vec![json!(false)], vec![json!("a")]]),
        shard(&["v"], vec![vec![json!(10)], vec![json!([1])]]),
    ];
    let context = SelectContext::new().order_by(OrderByItem::asc(0));
    let rows = merge_rows(&context, &mut shards).unwrap();
    assert_eq!(
        rows,
        vec![vec![json!(false)], vec![json!(10)], vec![json!("a")], vec![json!([1])]]
    );
}

#[test]
fn test_stream_merge_fails_fast() {
    let mut good = shard(&["v"], vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]]);
    let mut bad = FailingQueryResult { rows: 1, position: 0 };
    let context = SelectContext::new().order_by(OrderByItem::asc(0));
    let results: Vec<&mut dyn QueryResult> = vec![&mut good, &mut bad];
    let mut merged = MergeEngine::new(&context, &[]).merge(results).unwrap();

    let mut error = None;
    for _ in 0..5 {
        match merged.next() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }
    assert!(matches!(error, Some(ShardingError::QueryResult(ref m)) if m == "connection reset"));
}

#[test]
fn test_memory_merge_fails_fast() {
    let mut good = shard(&["v"], vec![vec![json!(1)]]);
    let mut bad = FailingQueryResult { rows: 2, position: 0 };
    let context = SelectContext::new()
        .group_by(OrderByItem::asc(0))
        .order_by(OrderByItem::desc(0));
    let results: Vec<&mut dyn QueryResult> = vec![&mut good, &mut bad];
    let err = MergeEngine::new(&context, &[]).merge(results).err().unwrap();
    assert!(matches!(err, ShardingError::QueryResult(_)));
}

#[test]
fn test_no_shards() {
    let context = SelectContext::new().order_by(OrderByItem::asc(0));
    let results: Vec<&mut dyn QueryResult> = Vec::new();
    let mut merged = MergeEngine::new(&context, &[]).merge(results).unwrap();
    assert!(!merged.next().unwrap());
    assert_eq!(merged.column_count(), 0);
}
