//! Row ordering for ORDER BY / GROUP BY items.

use std::cmp::Ordering;

use serde_json::Value;

use super::context::{NullOrdering, OrderByItem, OrderDirection};
use crate::value::compare_values;

/// Compare two cells under one item: NULL placement first, then direction.
pub fn compare_with(item: &OrderByItem, left: &Value, right: &Value) -> Ordering {
    let natural = match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match item.nulls {
            NullOrdering::Smallest => Ordering::Less,
            NullOrdering::Largest => Ordering::Greater,
        },
        (false, true) => match item.nulls {
            NullOrdering::Smallest => Ordering::Greater,
            NullOrdering::Largest => Ordering::Less,
        },
        (false, false) => compare_values(left, right),
    };
    match item.direction {
        OrderDirection::Asc => natural,
        OrderDirection::Desc => natural.reverse(),
    }
}

/// Compare sort keys extracted in item order (`keys[i]` belongs to `items[i]`).
pub fn compare_sort_keys(items: &[OrderByItem], left: &[Value], right: &[Value]) -> Ordering {
    for (i, item) in items.iter().enumerate() {
        let ord = compare_with(
            item,
            left.get(i).unwrap_or(&Value::Null),
            right.get(i).unwrap_or(&Value::Null),
        );
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compare full rows at each item's column index.
pub fn compare_rows(items: &[OrderByItem], left: &[Value], right: &[Value]) -> Ordering {
    for item in items {
        let ord = compare_with(
            item,
            left.get(item.index).unwrap_or(&Value::Null),
            right.get(item.index).unwrap_or(&Value::Null),
        );
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
