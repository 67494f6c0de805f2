//! Sharding condition extraction
//!
//! The predicate tree is flattened into OR-of-AND groups. Each group becomes
//! one [`ShardingCondition`] holding, per (table, sharding column), the
//! intersection of everything the group says about that column.

use std::collections::HashMap;

use serde_json::Value;

use super::statement::{Column, CompareOperator, Predicate};
use crate::error::ShardingResult;
use crate::rule::ShardingRule;
use crate::strategy::{ListRouteValue, RangeRouteValue, RouteValue, ValueRange};
use crate::value::values_equal;

/// Route values of one AND-group (one OR branch, or one inserted row).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub route_values: Vec<RouteValue>,
}

impl ShardingCondition {
    pub fn new(route_values: Vec<RouteValue>) -> Self {
        Self { route_values }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    pub conditions: Vec<ShardingCondition>,
    /// Every branch holds provably disjoint literal constraints
    pub always_false: bool,
}

impl ShardingConditions {
    /// No constraints at all: one empty condition, routed everywhere.
    pub fn unconstrained() -> Self {
        Self {
            conditions: vec![ShardingCondition::default()],
            always_false: false,
        }
    }

    pub fn is_always_false(&self) -> bool {
        self.always_false
    }
}

/// What one group knows about one column.
#[derive(Debug, Clone)]
enum Constraint {
    Values(Vec<Value>),
    Range(ValueRange),
}

impl Constraint {
    fn is_empty(&self) -> bool {
        match self {
            Constraint::Values(values) => values.is_empty(),
            Constraint::Range(range) => range.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnConstraint {
    table: String,
    column: String,
    constraint: Constraint,
    /// Every contributing predicate was literal
    literal: bool,
    /// The intersection turned out empty
    empty: bool,
}

impl ColumnConstraint {
    fn intersect(&mut self, other: Constraint, literal: bool) {
        self.literal &= literal;
        if self.empty {
            return;
        }
        let merged = match (&self.constraint, other) {
            (Constraint::Values(left), Constraint::Values(right)) => Constraint::Values(
                left.iter()
                    .filter(|v| right.iter().any(|r| values_equal(v, r)))
                    .cloned()
                    .collect(),
            ),
            (Constraint::Values(values), Constraint::Range(range)) => {
                Constraint::Values(values.iter().filter(|v| range.contains(v)).cloned().collect())
            }
            (Constraint::Range(range), Constraint::Values(values)) => {
                Constraint::Values(values.into_iter().filter(|v| range.contains(v)).collect())
            }
            (Constraint::Range(left), Constraint::Range(right)) => match left.intersect(&right) {
                Some(range) => Constraint::Range(range),
                None => {
                    self.empty = true;
                    return;
                }
            },
        };
        self.empty = merged.is_empty();
        self.constraint = merged;
    }

    fn into_route_value(self) -> RouteValue {
        match self.constraint {
            Constraint::Values(values) => ListRouteValue::new(self.column, self.table, values).into(),
            Constraint::Range(range) => RangeRouteValue::new(self.column, self.table, range).into(),
        }
    }
}

/// Past this many OR-of-AND groups the predicate routes everywhere.
const MAX_CONDITION_GROUPS: usize = 1024;

/// Tables among `tables` that `column` may belong to.
fn owners<'t>(column: &Column, tables: &[&'t str]) -> Vec<&'t str> {
    match &column.table {
        Some(table) => tables
            .iter()
            .copied()
            .filter(|t| t.eq_ignore_ascii_case(table))
            .collect(),
        None => tables.to_vec(),
    }
}

fn leaf_column(predicate: &Predicate) -> Option<&Column> {
    match predicate {
        Predicate::Equal(column, _)
        | Predicate::In(column, _)
        | Predicate::Between(column, _, _)
        | Predicate::Compare(column, _, _) => Some(column),
        Predicate::And(_) | Predicate::Or(_) | Predicate::Opaque => None,
    }
}

/// Whether any leaf under `predicate` is on a sharding column of `tables`.
fn touches_sharding_column(rule: &ShardingRule, tables: &[&str], predicate: &Predicate) -> bool {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => children
            .iter()
            .any(|child| touches_sharding_column(rule, tables, child)),
        Predicate::Opaque => false,
        leaf => leaf_column(leaf).is_some_and(|column| {
            owners(column, tables)
                .iter()
                .any(|table| rule.is_sharding_column(&column.name, table))
        }),
    }
}

/// Walks the predicate tree, treating subtrees that never touch a sharding
/// column as `Opaque`.
struct DnfBuilder<'a> {
    rule: &'a ShardingRule,
    tables: &'a [&'a str],
}

impl DnfBuilder<'_> {
    fn relevant(&self, predicate: &Predicate) -> bool {
        touches_sharding_column(self.rule, self.tables, predicate)
    }

    /// Number of groups `expand` would produce, saturating.
    fn group_count(&self, predicate: &Predicate) -> usize {
        if !self.relevant(predicate) {
            return 1;
        }
        match predicate {
            Predicate::Or(children) => children
                .iter()
                .fold(0usize, |acc, child| acc.saturating_add(self.group_count(child))),
            Predicate::And(children) => children
                .iter()
                .fold(1usize, |acc, child| acc.saturating_mul(self.group_count(child))),
            _ => 1,
        }
    }

    /// Disjunctive normal form over leaf predicates. `Opaque` is an empty
    /// conjunction: it constrains nothing.
    fn expand<'p>(&self, predicate: &'p Predicate) -> Vec<Vec<&'p Predicate>> {
        if !self.relevant(predicate) {
            return vec![Vec::new()];
        }
        match predicate {
            Predicate::Or(children) => children.iter().flat_map(|child| self.expand(child)).collect(),
            Predicate::And(children) => {
                let mut groups: Vec<Vec<&Predicate>> = vec![Vec::new()];
                for child in children {
                    let child_groups = self.expand(child);
                    let mut next = Vec::with_capacity(groups.len() * child_groups.len());
                    for group in &groups {
                        for child_group in &child_groups {
                            let mut combined = group.clone();
                            combined.extend(child_group.iter().copied());
                            next.push(combined);
                        }
                    }
                    groups = next;
                }
                groups
            }
            leaf => vec![vec![leaf]],
        }
    }
}

/// Extract the sharding conditions `predicate` places on `tables`.
pub fn extract_conditions(
    rule: &ShardingRule,
    tables: &[&str],
    predicate: Option<&Predicate>,
    parameters: &[Value],
) -> ShardingResult<ShardingConditions> {
    let predicate = match predicate {
        Some(p) => p,
        None => return Ok(ShardingConditions::unconstrained()),
    };

    let builder = DnfBuilder { rule, tables };
    let count = builder.group_count(predicate);
    if count > MAX_CONDITION_GROUPS {
        tracing::debug!(
            "Predicate expands to {} condition groups (limit {}), routing to all targets",
            count,
            MAX_CONDITION_GROUPS
        );
        return Ok(ShardingConditions::unconstrained());
    }

    let groups = builder.expand(predicate);
    let mut conditions = Vec::with_capacity(groups.len());
    for group in &groups {
        if let Some(condition) = condition_of_group(rule, tables, group, parameters)? {
            conditions.push(condition);
        }
    }
    let always_false = conditions.is_empty();
    if always_false {
        tracing::debug!("All {} condition groups are always false", groups.len());
    }
    Ok(ShardingConditions {
        conditions,
        always_false,
    })
}

/// `None` when the group can never match.
fn condition_of_group(
    rule: &ShardingRule,
    tables: &[&str],
    group: &[&Predicate],
    parameters: &[Value],
) -> ShardingResult<Option<ShardingCondition>> {
    let mut constraints: Vec<ColumnConstraint> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for predicate in group {
        let (column, constraint, literal) = match leaf_constraint(predicate, parameters)? {
            Some(c) => c,
            None => continue,
        };
        for table in owners(column, tables) {
            if !rule.is_sharding_column(&column.name, table) {
                continue;
            }
            let key = (table.to_lowercase(), column.name.to_lowercase());
            match positions.get(&key) {
                Some(&i) => constraints[i].intersect(constraint.clone(), literal),
                None => {
                    positions.insert(key, constraints.len());
                    // `BETWEEN 5 AND 1` or `IN ()` is empty on its own
                    constraints.push(ColumnConstraint {
                        table: table.to_string(),
                        column: column.name.clone(),
                        empty: constraint.is_empty(),
                        constraint: constraint.clone(),
                        literal,
                    });
                }
            }
        }
    }

    let mut route_values = Vec::with_capacity(constraints.len());
    for constraint in constraints {
        if constraint.empty {
            if constraint.literal {
                return Ok(None);
            }
            // Disjointness that depends on bound parameters is not trusted
            tracing::debug!(
                "Parameterized constraints on {}.{} do not intersect, routing that column to all targets",
                constraint.table,
                constraint.column
            );
            continue;
        }
        route_values.push(constraint.into_route_value());
    }
    Ok(Some(ShardingCondition::new(route_values)))
}

type Leaf<'p> = (&'p Column, Constraint, bool);

fn leaf_constraint<'p>(predicate: &'p Predicate, parameters: &[Value]) -> ShardingResult<Option<Leaf<'p>>> {
    Ok(Some(match predicate {
        Predicate::Equal(column, value) => (
            column,
            Constraint::Values(vec![value.resolve(parameters)?]),
            !value.is_parameter(),
        ),
        Predicate::In(column, values) => {
            let mut resolved = Vec::with_capacity(values.len());
            for value in values {
                resolved.push(value.resolve(parameters)?);
            }
            (
                column,
                Constraint::Values(resolved),
                values.iter().all(|v| !v.is_parameter()),
            )
        }
        Predicate::Between(column, lower, upper) => (
            column,
            Constraint::Range(ValueRange::closed(
                lower.resolve(parameters)?,
                upper.resolve(parameters)?,
            )),
            !lower.is_parameter() && !upper.is_parameter(),
        ),
        Predicate::Compare(column, op, value) => {
            let v = value.resolve(parameters)?;
            let range = match op {
                CompareOperator::Lt => ValueRange::less_than(v),
                CompareOperator::Le => ValueRange::at_most(v),
                CompareOperator::Gt => ValueRange::greater_than(v),
                CompareOperator::Ge => ValueRange::at_least(v),
            };
            (column, Constraint::Range(range), !value.is_parameter())
        }
        Predicate::And(_) | Predicate::Or(_) | Predicate::Opaque => return Ok(None),
    }))
}
