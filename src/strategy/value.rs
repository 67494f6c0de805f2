//! Route values: what a predicate tells the router about one sharding column.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use serde_json::Value;

use crate::value::{compare_values, values_equal};

/// A contiguous range of values, from `BETWEEN` or `<`/`>` predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn new(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self { lower, upper }
    }

    /// `[lower, upper]`, as produced by `BETWEEN`.
    pub fn closed(lower: Value, upper: Value) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    pub fn at_least(lower: Value) -> Self {
        Self::new(Bound::Included(lower), Bound::Unbounded)
    }

    pub fn greater_than(lower: Value) -> Self {
        Self::new(Bound::Excluded(lower), Bound::Unbounded)
    }

    pub fn at_most(upper: Value) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(upper))
    }

    pub fn less_than(upper: Value) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(upper))
    }

    pub fn contains(&self, value: &Value) -> bool {
        let above_lower = match &self.lower {
            Bound::Included(l) => compare_values(value, l) != Ordering::Less,
            Bound::Excluded(l) => compare_values(value, l) == Ordering::Greater,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(u) => compare_values(value, u) != Ordering::Greater,
            Bound::Excluded(u) => compare_values(value, u) == Ordering::Less,
            Bound::Unbounded => true,
        };
        above_lower && below_upper
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(l), Bound::Included(u)) => compare_values(l, u) == Ordering::Greater,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => compare_values(l, u) != Ordering::Less,
        }
    }

    /// Intersection of two ranges, `None` when they cannot overlap.
    pub fn intersect(&self, other: &ValueRange) -> Option<ValueRange> {
        let lower = tighter_lower(&self.lower, &other.lower);
        let upper = tighter_upper(&self.upper, &other.upper);
        let range = ValueRange::new(lower, upper);
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }
}

fn tighter_lower(a: &Bound<Value>, b: &Bound<Value>) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match compare_values(x, y) {
                Ordering::Greater => a.clone(),
                Ordering::Less => b.clone(),
                Ordering::Equal => {
                    if matches!(a, Bound::Excluded(_)) {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
            }
        }
    }
}

fn tighter_upper(a: &Bound<Value>, b: &Bound<Value>) -> Bound<Value> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => {
            match compare_values(x, y) {
                Ordering::Less => a.clone(),
                Ordering::Greater => b.clone(),
                Ordering::Equal => {
                    if matches!(a, Bound::Excluded(_)) {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
            }
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(v) => write!(f, "[{}", v)?,
            Bound::Excluded(v) => write!(f, "({}", v)?,
            Bound::Unbounded => write!(f, "(-inf")?,
        }
        write!(f, "..")?;
        match &self.upper {
            Bound::Included(v) => write!(f, "{}]", v),
            Bound::Excluded(v) => write!(f, "{})", v),
            Bound::Unbounded => write!(f, "+inf)"),
        }
    }
}

/// Discrete values for one column, from `=` or `IN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRouteValue {
    pub column_name: String,
    pub table_name: String,
    pub values: Vec<Value>,
}

impl ListRouteValue {
    pub fn new(column_name: impl Into<String>, table_name: impl Into<String>, values: Vec<Value>) -> Self {
        let mut distinct: Vec<Value> = Vec::with_capacity(values.len());
        for value in values {
            if !distinct.iter().any(|v| values_equal(v, &value)) {
                distinct.push(value);
            }
        }
        Self {
            column_name: column_name.into(),
            table_name: table_name.into(),
            values: distinct,
        }
    }
}

/// A range of values for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRouteValue {
    pub column_name: String,
    pub table_name: String,
    pub range: ValueRange,
}

impl RangeRouteValue {
    pub fn new(column_name: impl Into<String>, table_name: impl Into<String>, range: ValueRange) -> Self {
        Self {
            column_name: column_name.into(),
            table_name: table_name.into(),
            range,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteValue {
    List(ListRouteValue),
    Range(RangeRouteValue),
}

impl RouteValue {
    pub fn column_name(&self) -> &str {
        match self {
            RouteValue::List(v) => &v.column_name,
            RouteValue::Range(v) => &v.column_name,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            RouteValue::List(v) => &v.table_name,
            RouteValue::Range(v) => &v.table_name,
        }
    }

    pub fn matches(&self, table: &str, column: &str) -> bool {
        self.table_name().eq_ignore_ascii_case(table) && self.column_name().eq_ignore_ascii_case(column)
    }
}

impl From<ListRouteValue> for RouteValue {
    fn from(value: ListRouteValue) -> Self {
        RouteValue::List(value)
    }
}

impl From<RangeRouteValue> for RouteValue {
    fn from(value: RangeRouteValue) -> Self {
        RouteValue::Range(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_range_contains() {
        let range = ValueRange::closed(json!(10), json!(20));
        assert!(range.contains(&json!(10)));
        assert!(range.contains(&json!(20)));
        assert!(!range.contains(&json!(21)));

        let open = ValueRange::greater_than(json!(5));
        assert!(!open.contains(&json!(5)));
        assert!(open.contains(&json!(6)));
    }

    #[test]
    fn test_range_intersect() {
        let a = ValueRange::closed(json!(1), json!(10));
        let b = ValueRange::closed(json!(5), json!(20));
        assert_eq!(a.intersect(&b), Some(ValueRange::closed(json!(5), json!(10))));

        let c = ValueRange::closed(json!(11), json!(12));
        assert_eq!(a.intersect(&c), None);

        let d = ValueRange::less_than(json!(1));
        assert_eq!(a.intersect(&d), None);

        let e = ValueRange::at_least(json!(10));
        assert_eq!(a.intersect(&e), Some(ValueRange::closed(json!(10), json!(10))));
    }

    #[test]
    fn test_list_route_value_dedups() {
        let value = ListRouteValue::new("order_id", "t_order", vec![json!(1), json!(1.0), json!(2)]);
        assert_eq!(value.values, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_route_value_matches_case_insensitively() {
        let value: RouteValue = ListRouteValue::new("ORDER_ID", "T_Order", vec![json!(1)]).into();
        assert!(value.matches("t_order", "order_id"));
        assert!(!value.matches("t_order_item", "order_id"));
    }

    #[test]
    fn test_range_display() {
        let range = ValueRange::new(Bound::Excluded(json!(1)), Bound::Unbounded);
        assert_eq!(range.to_string(), "(1..+inf)");
    }
}
