use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dot-separated field path used to inspect attributes on an event snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|segment| !segment.is_empty())
    }

    /// Walks the snapshot following each path segment. Returns `None` as soon
    /// as a segment is missing; a lookup never fails with an error.
    pub fn locate<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in self.segments() {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(value) => current = value,
                    None => return None,
                },
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::new(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        FieldPath::new(value)
    }
}

/// Comparison operator applied to a resolved field value and a literal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

/// Single field/operator/value comparison evaluated against an event snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleCondition {
    pub field: FieldPath,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl RuleCondition {
    pub fn new(field: impl Into<FieldPath>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluates the condition. Total: a missing field, a type mismatch or a
    /// non-numeric operand makes the condition false, never an error, so one
    /// malformed rule cannot abort the matching pass for its siblings.
    pub fn evaluate(&self, snapshot: &Value) -> bool {
        let resolved = self.field.locate(snapshot);

        match self.operator {
            Operator::IsNull => resolved.map_or(true, Value::is_null),
            Operator::IsNotNull => resolved.map_or(false, |value| !value.is_null()),
            _ => match resolved {
                Some(actual) => self.compare(actual),
                None => false,
            },
        }
    }

    fn compare(&self, actual: &Value) -> bool {
        let expected = &self.value;
        match self.operator {
            Operator::Eq => loosely_equal(actual, expected),
            Operator::Neq => !loosely_equal(actual, expected),
            Operator::Gt => numeric_cmp(actual, expected).map_or(false, |ord| ord.is_gt()),
            Operator::Gte => numeric_cmp(actual, expected).map_or(false, |ord| ord.is_ge()),
            Operator::Lt => numeric_cmp(actual, expected).map_or(false, |ord| ord.is_lt()),
            Operator::Lte => numeric_cmp(actual, expected).map_or(false, |ord| ord.is_le()),
            Operator::Contains => contains(actual, expected),
            Operator::NotContains => !contains(actual, expected),
            Operator::StartsWith => actual
                .as_str()
                .map_or(false, |text| text.starts_with(&display_string(expected))),
            Operator::EndsWith => actual
                .as_str()
                .map_or(false, |text| text.ends_with(&display_string(expected))),
            Operator::In => membership(actual, expected),
            Operator::NotIn => !membership(actual, expected),
            Operator::IsNull | Operator::IsNotNull => unreachable!("handled in evaluate"),
        }
    }
}

/// Boolean connective applied uniformly to all conditions in a tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionLogic {
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

impl Default for ConditionLogic {
    fn default() -> Self {
        ConditionLogic::And
    }
}

/// Flat condition tree: one logic connective over a list of comparisons.
///
/// An empty list is vacuously true regardless of logic, so a rule with no
/// conditions matches every event of its trigger types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuleConditions {
    #[serde(default)]
    pub logic: ConditionLogic,
    #[serde(default)]
    pub rules: Vec<RuleCondition>,
}

impl RuleConditions {
    pub fn all_of(rules: Vec<RuleCondition>) -> Self {
        Self {
            logic: ConditionLogic::And,
            rules,
        }
    }

    pub fn any_of(rules: Vec<RuleCondition>) -> Self {
        Self {
            logic: ConditionLogic::Or,
            rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies the connective with short-circuit semantics: `And` stops at the
    /// first false condition, `Or` at the first true one.
    pub fn evaluate(&self, snapshot: &Value) -> bool {
        self.evaluate_with(|rule| rule.evaluate(snapshot))
    }

    fn evaluate_with(&self, mut check: impl FnMut(&RuleCondition) -> bool) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        match self.logic {
            ConditionLogic::And => self.rules.iter().all(|rule| check(rule)),
            ConditionLogic::Or => self.rules.iter().any(|rule| check(rule)),
        }
    }
}

/// A value is numeric if it is a number or a string that parses fully as one.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse::<f64>().ok(),
        _ => None,
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    let left = as_number(left)?;
    let right = as_number(right)?;
    left.partial_cmp(&right)
}

fn display_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return (l - r).abs() < f64::EPSILON;
    }
    if let (Value::Bool(l), Value::Bool(r)) = (left, right) {
        return l == r;
    }
    display_string(left) == display_string(right)
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(text) => text.contains(&display_string(expected)),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        _ => false,
    }
}

fn membership(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| loosely_equal(actual, item)),
        _ => false,
    }
}
