use std::hash::{Hash, Hasher};

use serde_json::Value;

use super::context::OrderByItem;
use crate::value::{hash_value, values_equal};

/// The GROUP BY key of one row. Numbers compare by value, so `1` and `1.0`
/// land in the same group.
#[derive(Debug, Clone)]
pub struct GroupByValue {
    values: Vec<Value>,
}

impl GroupByValue {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn from_row(row: &[Value], group_by: &[OrderByItem]) -> Self {
        Self::new(
            group_by
                .iter()
                .map(|item| row.get(item.index).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl PartialEq for GroupByValue {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| values_equal(a, b))
    }
}

impl Eq for GroupByValue {}

impl Hash for GroupByValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.len().hash(state);
        for value in &self.values {
            hash_value(value, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_group_by_value_equality() {
        let group_by = [OrderByItem::asc(0), OrderByItem::asc(2)];
        let a = GroupByValue::from_row(&[json!("k"), json!(1), json!(2)], &group_by);
        let b = GroupByValue::from_row(&[json!("k"), json!(99), json!(2.0)], &group_by);
        let c = GroupByValue::from_row(&[json!("k"), json!(1), json!(3)], &group_by);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<GroupByValue> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_large_integer_keys() {
        let a = GroupByValue::new(vec![json!(9_007_199_254_740_993_i64)]);
        let b = GroupByValue::new(vec![json!(9_007_199_254_740_992_i64)]);
        assert_ne!(a, b);
        let set: HashSet<GroupByValue> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_missing_column_is_null() {
        let key = GroupByValue::from_row(&[json!(1)], &[OrderByItem::asc(4)]);
        assert_eq!(key.values(), &[Value::Null]);
    }
}
