//! Built-in sharding algorithms.
//!
//! Suffix-based algorithms (`MOD`, `HASH_MOD`, `BOUNDARY_RANGE`) pick the
//! target whose trailing number equals the computed shard index, so
//! `t_order_1` and `ds_1` are both shard 1.

use std::collections::HashMap;
use std::ops::Bound;

use serde_json::Value;

use super::algorithm::{
    ComplexKeysShardingAlgorithm, ComplexShardingValues, HintShardingAlgorithm,
    HintShardingValue, PreciseShardingAlgorithm, PreciseShardingValue, RangeShardingAlgorithm,
    RangeShardingValue,
};
use super::registry::Props;
use super::value::ValueRange;
use crate::error::{ShardingError, ShardingResult};
use crate::rule::inline::InlineExpression;
use crate::value::{as_f64, as_i64, display_value};

/// Trailing decimal suffix of a target name: `t_order_12` -> 12.
fn target_suffix(target: &str) -> Option<u64> {
    let digits = target.len() - target.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    target[target.len() - digits..].parse().ok()
}

fn target_by_suffix(available_targets: &[String], index: u64) -> ShardingResult<String> {
    available_targets
        .iter()
        .find(|t| target_suffix(t) == Some(index))
        .cloned()
        .ok_or_else(|| {
            ShardingError::Algorithm(format!(
                "No target with suffix {} among {:?}",
                index, available_targets
            ))
        })
}

fn targets_by_suffixes(available_targets: &[String], indexes: &[u64]) -> Vec<String> {
    available_targets
        .iter()
        .filter(|t| target_suffix(t).is_some_and(|s| indexes.contains(&s)))
        .cloned()
        .collect()
}

pub(crate) fn prop_str<'a>(props: &'a Props, key: &str) -> ShardingResult<&'a str> {
    match props.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(ShardingError::config(format!(
            "Property '{}' must be a string, got {}",
            key, other
        ))),
        None => Err(ShardingError::config(format!("Missing property '{}'", key))),
    }
}

pub(crate) fn prop_i64(props: &Props, key: &str) -> ShardingResult<Option<i64>> {
    match props.get(key) {
        None => Ok(None),
        Some(value) => as_i64(value).map(Some).map_err(|_| {
            ShardingError::config(format!("Property '{}' must be an integer, got {}", key, value))
        }),
    }
}

/// Integer bounds of a range, inclusive; `None` when a side is open or not integral.
fn inclusive_int_bounds(range: &ValueRange) -> Option<(i64, i64)> {
    let lower = match &range.lower {
        Bound::Included(v) => as_i64(v).ok()?,
        Bound::Excluded(v) => as_i64(v).ok()?.checked_add(1)?,
        Bound::Unbounded => return None,
    };
    let upper = match &range.upper {
        Bound::Included(v) => as_i64(v).ok()?,
        Bound::Excluded(v) => as_i64(v).ok()?.checked_sub(1)?,
        Bound::Unbounded => return None,
    };
    Some((lower, upper))
}

/// `value % sharding_count`.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> ShardingResult<Self> {
        if sharding_count <= 0 {
            return Err(ShardingError::config(format!(
                "MOD sharding_count must be positive, got {}",
                sharding_count
            )));
        }
        Ok(Self { sharding_count })
    }

    pub fn from_props(props: &Props) -> ShardingResult<Self> {
        let count = prop_i64(props, "sharding_count")?
            .ok_or_else(|| ShardingError::config("MOD requires 'sharding_count'"))?;
        Self::new(count)
    }

    fn index_of(&self, value: &Value) -> ShardingResult<u64> {
        Ok(as_i64(value)?.rem_euclid(self.sharding_count) as u64)
    }
}

impl PreciseShardingAlgorithm for ModShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<String> {
        target_by_suffix(available_targets, self.index_of(sharding_value.value)?)
    }
}

impl RangeShardingAlgorithm for ModShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        match inclusive_int_bounds(sharding_value.range) {
            Some((lower, upper)) if upper < lower => Ok(Vec::new()),
            Some((lower, upper)) if (upper as i128 - lower as i128) < self.sharding_count as i128 => {
                let mut indexes: Vec<u64> = (lower..=upper)
                    .map(|v| v.rem_euclid(self.sharding_count) as u64)
                    .collect();
                indexes.sort_unstable();
                indexes.dedup();
                Ok(targets_by_suffixes(available_targets, &indexes))
            }
            _ => Ok(available_targets.to_vec()),
        }
    }
}

/// `seahash(value) % sharding_count`; spreads strings as well as numbers.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: u64,
}

impl HashModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> ShardingResult<Self> {
        if sharding_count <= 0 {
            return Err(ShardingError::config(format!(
                "HASH_MOD sharding_count must be positive, got {}",
                sharding_count
            )));
        }
        Ok(Self {
            sharding_count: sharding_count as u64,
        })
    }

    pub fn from_props(props: &Props) -> ShardingResult<Self> {
        let count = prop_i64(props, "sharding_count")?
            .ok_or_else(|| ShardingError::config("HASH_MOD requires 'sharding_count'"))?;
        Self::new(count)
    }

    /// Integral values hash by their integer text, so `1`, `1.0` and `"1"`
    /// share a shard as they do under `MOD`.
    pub fn index_of(&self, value: &Value) -> u64 {
        let key = match as_i64(value) {
            Ok(i) => i.to_string(),
            Err(_) => display_value(value),
        };
        seahash::hash(key.as_bytes()) % self.sharding_count
    }
}

impl PreciseShardingAlgorithm for HashModShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<String> {
        target_by_suffix(available_targets, self.index_of(sharding_value.value))
    }
}

/// Evaluates an inline expression such as `t_order_${order_id % 2}`.
#[derive(Debug, Clone)]
pub struct InlineShardingAlgorithm {
    expression: InlineExpression,
}

impl InlineShardingAlgorithm {
    pub fn new(expression: &str) -> ShardingResult<Self> {
        Ok(Self {
            expression: InlineExpression::parse(expression)?,
        })
    }

    pub fn from_props(props: &Props) -> ShardingResult<Self> {
        Self::new(prop_str(props, "algorithm_expression")?)
    }
}

impl PreciseShardingAlgorithm for InlineShardingAlgorithm {
    fn do_sharding(
        &self,
        _available_targets: &[String],
        sharding_value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<String> {
        self.expression
            .evaluate_with(sharding_value.column_name, sharding_value.value)
    }
}

/// Splits the number line at ascending boundaries.
///
/// With boundaries `10,20` a value below 10 is shard 0, `[10, 20)` is
/// shard 1 and 20 or above is shard 2.
#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    boundaries: Vec<f64>,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(boundaries: Vec<f64>) -> ShardingResult<Self> {
        if boundaries.is_empty() {
            return Err(ShardingError::config("BOUNDARY_RANGE needs at least one boundary"));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ShardingError::config(format!(
                "BOUNDARY_RANGE boundaries must be strictly ascending: {:?}",
                boundaries
            )));
        }
        Ok(Self { boundaries })
    }

    pub fn from_props(props: &Props) -> ShardingResult<Self> {
        let text = prop_str(props, "sharding_ranges")?;
        let boundaries = text
            .split(',')
            .map(|part| {
                part.trim().parse::<f64>().map_err(|_| {
                    ShardingError::config(format!("Invalid boundary '{}' in '{}'", part.trim(), text))
                })
            })
            .collect::<ShardingResult<Vec<_>>>()?;
        Self::new(boundaries)
    }

    fn index_of_number(&self, n: f64) -> u64 {
        self.boundaries.iter().filter(|b| n >= **b).count() as u64
    }

    fn index_of(&self, value: &Value) -> ShardingResult<u64> {
        let n = as_f64(value).ok_or_else(|| {
            ShardingError::Algorithm(format!("BOUNDARY_RANGE cannot shard non-numeric value {}", value))
        })?;
        Ok(self.index_of_number(n))
    }
}

impl PreciseShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<String> {
        target_by_suffix(available_targets, self.index_of(sharding_value.value)?)
    }
}

impl RangeShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        let range = sharding_value.range;
        let first = match &range.lower {
            Bound::Included(v) | Bound::Excluded(v) => self.index_of(v)?,
            Bound::Unbounded => 0,
        };
        let last = match &range.upper {
            Bound::Included(v) => self.index_of(v)?,
            // An exclusive upper bound sitting on a boundary does not reach that shard
            Bound::Excluded(v) => {
                let n = as_f64(v).ok_or_else(|| {
                    ShardingError::Algorithm(format!("BOUNDARY_RANGE cannot shard non-numeric value {}", v))
                })?;
                let index = self.index_of_number(n);
                if index > 0 && self.boundaries[index as usize - 1] == n {
                    index - 1
                } else {
                    index
                }
            }
            Bound::Unbounded => self.boundaries.len() as u64,
        };
        if last < first {
            return Ok(Vec::new());
        }
        let indexes: Vec<u64> = (first..=last).collect();
        Ok(targets_by_suffixes(available_targets, &indexes))
    }
}

/// An inline expression over several columns, e.g. `t_${user_id % 2}_${order_id % 2}`.
#[derive(Debug, Clone)]
pub struct ComplexInlineShardingAlgorithm {
    expression: InlineExpression,
}

impl ComplexInlineShardingAlgorithm {
    pub fn new(expression: &str) -> ShardingResult<Self> {
        Ok(Self {
            expression: InlineExpression::parse(expression)?,
        })
    }

    pub fn from_props(props: &Props) -> ShardingResult<Self> {
        Self::new(prop_str(props, "algorithm_expression")?)
    }
}

impl ComplexKeysShardingAlgorithm for ComplexInlineShardingAlgorithm {
    fn do_sharding(
        &self,
        available_targets: &[String],
        sharding_values: &ComplexShardingValues<'_>,
    ) -> ShardingResult<Vec<String>> {
        let variables = self.expression.variables();
        let mut bound: Vec<(&str, &[Value])> = Vec::with_capacity(variables.len());
        for variable in &variables {
            let values = sharding_values
                .column_values
                .iter()
                .find(|(column, _)| column.eq_ignore_ascii_case(variable))
                .map(|(_, values)| values.as_slice());
            match values {
                Some(values) => bound.push((variable.as_str(), values)),
                // A variable only constrained by a range (or not at all) cannot be evaluated
                None => return Ok(available_targets.to_vec()),
            }
        }

        let mut routed: Vec<String> = Vec::new();
        let mut combination: Vec<usize> = vec![0; bound.len()];
        if bound.iter().any(|(_, values)| values.is_empty()) {
            return Ok(routed);
        }
        loop {
            let mut vars: HashMap<&str, &Value> = HashMap::with_capacity(bound.len());
            for ((name, values), index) in bound.iter().zip(&combination) {
                vars.insert(*name, &values[*index]);
            }
            let target = self.expression.evaluate(&vars)?;
            if !routed.contains(&target) {
                routed.push(target);
            }

            // Odometer increment, rightmost variable fastest
            let mut position = bound.len();
            loop {
                if position == 0 {
                    return Ok(routed);
                }
                position -= 1;
                combination[position] += 1;
                if combination[position] < bound[position].1.len() {
                    break;
                }
                combination[position] = 0;
            }
        }
    }
}

/// Evaluates an inline expression over each hinted `value`.
#[derive(Debug, Clone)]
pub struct HintInlineShardingAlgorithm {
    expression: InlineExpression,
}

impl HintInlineShardingAlgorithm {
    pub fn new(expression: &str) -> ShardingResult<Self> {
        Ok(Self {
            expression: InlineExpression::parse(expression)?,
        })
    }

    pub fn from_props(props: &Props) -> ShardingResult<Self> {
        match props.get("algorithm_expression") {
            None => Self::new("${value}"),
            Some(_) => Self::new(prop_str(props, "algorithm_expression")?),
        }
    }
}

impl HintShardingAlgorithm for HintInlineShardingAlgorithm {
    fn do_sharding(
        &self,
        _available_targets: &[String],
        sharding_value: &HintShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        let mut routed = Vec::with_capacity(sharding_value.values.len());
        for value in sharding_value.values {
            let target = self.expression.evaluate_with("value", value)?;
            if !routed.contains(&target) {
                routed.push(target);
            }
        }
        Ok(routed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables() -> Vec<String> {
        (0..4).map(|i| format!("t_order_{}", i)).collect()
    }

    fn precise<'a>(value: &'a Value) -> PreciseShardingValue<'a> {
        PreciseShardingValue {
            logic_table: "t_order",
            column_name: "order_id",
            value,
        }
    }

    fn range(range: &ValueRange) -> RangeShardingValue<'_> {
        RangeShardingValue {
            logic_table: "t_order",
            column_name: "order_id",
            range,
        }
    }

    #[test]
    fn test_target_suffix() {
        assert_eq!(target_suffix("t_order_12"), Some(12));
        assert_eq!(target_suffix("ds0"), Some(0));
        assert_eq!(target_suffix("t_order"), None);
    }

    #[test]
    fn test_mod_precise() {
        let algorithm = ModShardingAlgorithm::new(4).unwrap();
        let value = json!(7);
        assert_eq!(PreciseShardingAlgorithm::do_sharding(&algorithm, &tables(), &precise(&value)).unwrap(), "t_order_3");
        let value = json!(-1);
        assert_eq!(PreciseShardingAlgorithm::do_sharding(&algorithm, &tables(), &precise(&value)).unwrap(), "t_order_3");
        let value = json!("12");
        assert_eq!(PreciseShardingAlgorithm::do_sharding(&algorithm, &tables(), &precise(&value)).unwrap(), "t_order_0");
        let value = json!("abc");
        assert!(PreciseShardingAlgorithm::do_sharding(&algorithm, &tables(), &precise(&value)).is_err());
    }

    #[test]
    fn test_mod_range() {
        let algorithm = ModShardingAlgorithm::new(4).unwrap();
        let narrow = ValueRange::closed(json!(5), json!(6));
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&algorithm, &tables(), &range(&narrow)).unwrap(),
            vec!["t_order_1", "t_order_2"]
        );
        let wide = ValueRange::closed(json!(0), json!(100));
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&algorithm, &tables(), &range(&wide)).unwrap(),
            tables()
        );
        let open = ValueRange::greater_than(json!(3));
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&algorithm, &tables(), &range(&open)).unwrap(),
            tables()
        );
    }

    #[test]
    fn test_mod_rejects_zero_count() {
        assert!(ModShardingAlgorithm::new(0).is_err());
        let props = Props::new();
        assert!(ModShardingAlgorithm::from_props(&props).is_err());
    }

    #[test]
    fn test_hash_mod_is_stable() {
        let algorithm = HashModShardingAlgorithm::new(4).unwrap();
        let value = json!("alice");
        let first = algorithm.do_sharding(&tables(), &precise(&value)).unwrap();
        let second = algorithm.do_sharding(&tables(), &precise(&value)).unwrap();
        assert_eq!(first, second);
        assert!(tables().contains(&first));
    }

    #[test]
    fn test_hash_mod_normalizes_integral_values() {
        let algorithm = HashModShardingAlgorithm::new(4).unwrap();
        let expected = algorithm.index_of(&json!(1));
        assert_eq!(algorithm.index_of(&json!(1.0)), expected);
        assert_eq!(algorithm.index_of(&json!("1")), expected);
        assert_eq!(
            algorithm.index_of(&json!(9_007_199_254_740_993_i64)),
            seahash::hash(b"9007199254740993") % 4
        );
    }

    #[test]
    fn test_inline_precise() {
        let algorithm = InlineShardingAlgorithm::new("t_order_${order_id % 2}").unwrap();
        let value = json!(11);
        assert_eq!(algorithm.do_sharding(&tables(), &precise(&value)).unwrap(), "t_order_1");
    }

    #[test]
    fn test_boundary_range() {
        let algorithm = BoundaryRangeShardingAlgorithm::new(vec![10.0, 20.0, 30.0]).unwrap();
        let value = json!(15);
        assert_eq!(PreciseShardingAlgorithm::do_sharding(&algorithm, &tables(), &precise(&value)).unwrap(), "t_order_1");
        let value = json!(30);
        assert_eq!(PreciseShardingAlgorithm::do_sharding(&algorithm, &tables(), &precise(&value)).unwrap(), "t_order_3");

        let between = ValueRange::closed(json!(5), json!(12));
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&algorithm, &tables(), &range(&between)).unwrap(),
            vec!["t_order_0", "t_order_1"]
        );
        let below = ValueRange::less_than(json!(20));
        assert_eq!(
            RangeShardingAlgorithm::do_sharding(&algorithm, &tables(), &range(&below)).unwrap(),
            vec!["t_order_0", "t_order_1"]
        );
    }

    #[test]
    fn test_boundary_range_from_props() {
        let mut props = Props::new();
        props.insert("sharding_ranges".to_string(), json!("10, 20"));
        assert!(BoundaryRangeShardingAlgorithm::from_props(&props).is_ok());
        props.insert("sharding_ranges".to_string(), json!("20,10"));
        assert!(BoundaryRangeShardingAlgorithm::from_props(&props).is_err());
    }

    #[test]
    fn test_complex_inline_cartesian() {
        let algorithm = ComplexInlineShardingAlgorithm::new("t_${user_id % 2}_${order_id % 2}").unwrap();
        let available: Vec<String> = ["t_0_0", "t_0_1", "t_1_0", "t_1_1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut values = ComplexShardingValues {
            logic_table: "t",
            ..Default::default()
        };
        values.column_values.insert("user_id".to_string(), vec![json!(1)]);
        values
            .column_values
            .insert("order_id".to_string(), vec![json!(2), json!(3)]);
        assert_eq!(
            algorithm.do_sharding(&available, &values).unwrap(),
            vec!["t_1_0", "t_1_1"]
        );

        values.column_values.remove("order_id");
        assert_eq!(algorithm.do_sharding(&available, &values).unwrap(), available);
    }

    #[test]
    fn test_hint_inline_default_expression() {
        let algorithm = HintInlineShardingAlgorithm::from_props(&Props::new()).unwrap();
        let hinted = [json!("ds_1"), json!("ds_1")];
        let value = HintShardingValue {
            logic_table: "t_order",
            values: &hinted,
        };
        assert_eq!(algorithm.do_sharding(&[], &value).unwrap(), vec!["ds_1"]);
    }
}
