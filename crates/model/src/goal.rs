//! Goal evaluation over accumulated facts

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fact::Fact;

/// Sentinel count meaning "effectively unbounded"
pub const GOAL_COUNT_UNBOUNDED: usize = 1 << 20;

/// Closed set of goal comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GoalOperator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "*")]
    Always,
}

impl GoalOperator {
    /// Parse an operator string; unknown operators fall back to equality
    pub fn parse(s: &str) -> Self {
        match s {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "in" => Self::In,
            "*" => Self::Always,
            _ => Self::Eq,
        }
    }

    /// Apply the operator as `goal_value OP fact_value`
    pub fn apply(&self, goal_value: &Value, fact_value: &Value) -> bool {
        match self {
            Self::Always => true,
            Self::Eq => values_eq(goal_value, fact_value),
            Self::Ne => !values_eq(goal_value, fact_value),
            Self::Lt => matches!(values_cmp(goal_value, fact_value), Some(Ordering::Less)),
            Self::Le => matches!(
                values_cmp(goal_value, fact_value),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            Self::Gt => matches!(values_cmp(goal_value, fact_value), Some(Ordering::Greater)),
            Self::Ge => matches!(
                values_cmp(goal_value, fact_value),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Self::In => value_contains(fact_value, goal_value),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality with numeric coercion ("2" matches 2)
fn values_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Ordering: numeric when both sides parse as numbers, lexicographic otherwise
fn values_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(as_text(a).cmp(&as_text(b))),
    }
}

/// Does `container` hold `needle` (array element or substring)
fn value_contains(container: &Value, needle: &Value) -> bool {
    match container {
        Value::Array(items) => items.iter().any(|item| values_eq(needle, item)),
        Value::String(s) => s.contains(&as_text(needle)),
        _ => false,
    }
}

/// A satisfaction condition over facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    /// Target fact trait
    pub target: String,
    /// Comparison value
    pub value: Value,
    /// Number of satisfying facts required
    #[serde(default = "default_count")]
    pub count: usize,
    /// Comparison operator
    #[serde(default)]
    pub operator: GoalOperator,
    /// Sticky latch; once true, never reset by later evaluation
    #[serde(default)]
    pub achieved: bool,
}

fn default_count() -> usize {
    GOAL_COUNT_UNBOUNDED
}

impl Goal {
    /// Create a new goal with the unbounded count sentinel
    pub fn new(target: impl Into<String>, value: impl Into<Value>, operator: GoalOperator) -> Self {
        Self {
            target: target.into(),
            value: value.into(),
            count: GOAL_COUNT_UNBOUNDED,
            operator,
            achieved: false,
        }
    }

    /// Set the satisfying-fact count threshold
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// The default goal: a wildcard that is trivially satisfiable
    pub fn exhaustion() -> Self {
        Self::new("exhaustion", "complete", GoalOperator::Always).with_count(1)
    }

    /// Count facts matching this goal; latch `achieved` once the count
    /// threshold is reached, and return the latch. The wildcard operator
    /// latches unconditionally, with or without facts.
    pub fn satisfied(&mut self, facts: &[Fact]) -> bool {
        if self.operator == GoalOperator::Always {
            self.achieved = true;
            return true;
        }
        let mut matched = 0;
        for fact in facts {
            if self.target == fact.trait_name && self.operator.apply(&self.value, &fact.value) {
                matched += 1;
            }
        }
        if matched >= self.count {
            self.achieved = true;
        }
        self.achieved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fact(trait_name: &str, value: Value) -> Fact {
        Fact::new(trait_name, value)
    }

    #[test]
    fn test_satisfied_empty_then_match() {
        let mut goal = Goal::new("host.user.name", "snake", GoalOperator::Eq).with_count(1);
        assert!(!goal.satisfied(&[]));
        assert!(goal.satisfied(&[fact("host.user.name", json!("snake"))]));
    }

    #[test]
    fn test_satisfied_is_sticky() {
        let mut goal = Goal::new("host.user.name", "snake", GoalOperator::Eq).with_count(1);
        assert!(goal.satisfied(&[fact("host.user.name", json!("snake"))]));
        // Facts gone; the latch holds.
        assert!(goal.satisfied(&[]));
    }

    #[test]
    fn test_unbounded_count_never_satisfies() {
        let mut goal = Goal::new("t", "v", GoalOperator::Eq);
        assert_eq!(goal.count, GOAL_COUNT_UNBOUNDED);
        assert!(!goal.satisfied(&[fact("t", json!("v"))]));
    }

    #[test]
    fn test_operator_gt_applies_goal_value_first() {
        // goal.value OP fact.value: 2 > 1 is true
        let mut goal = Goal::new("t", 2, GoalOperator::Gt).with_count(1);
        assert!(goal.satisfied(&[fact("t", json!(1))]));

        let mut goal = Goal::new("t", 2, GoalOperator::Gt).with_count(1);
        assert!(!goal.satisfied(&[fact("t", json!(3))]));
    }

    #[test]
    fn test_operator_le_numeric_strings() {
        let mut goal = Goal::new("t", "2", GoalOperator::Le).with_count(1);
        assert!(goal.satisfied(&[fact("t", json!("10"))]));
    }

    #[test]
    fn test_operator_in_array_and_substring() {
        let mut goal = Goal::new("t", "jul", GoalOperator::In).with_count(1);
        assert!(goal.satisfied(&[fact("t", json!(["jun", "jul", "aug"]))]));

        let mut goal = Goal::new("t", "adm", GoalOperator::In).with_count(1);
        assert!(goal.satisfied(&[fact("t", json!("administrator"))]));
        let mut goal = Goal::new("t", "root", GoalOperator::In).with_count(1);
        assert!(!goal.satisfied(&[fact("t", json!("administrator"))]));
    }

    #[test]
    fn test_operator_wildcard_regardless_of_facts() {
        let mut goal = Goal::new("t", "anything", GoalOperator::Always).with_count(1);
        assert!(goal.satisfied(&[]));

        let mut goal = Goal::new("t", "anything", GoalOperator::Always);
        assert!(goal.satisfied(&[fact("u", json!("unrelated"))]));
    }

    #[test]
    fn test_unknown_operator_falls_back_to_eq() {
        assert_eq!(GoalOperator::parse("~="), GoalOperator::Eq);
        assert_eq!(GoalOperator::parse(">"), GoalOperator::Gt);
        assert_eq!(GoalOperator::parse("*"), GoalOperator::Always);
    }

    #[test]
    fn test_count_threshold() {
        let mut goal = Goal::new("t", "v", GoalOperator::Eq).with_count(2);
        assert!(!goal.satisfied(&[fact("t", json!("v"))]));
        assert!(goal.satisfied(&[fact("t", json!("v")), fact("t", json!("v"))]));
    }

    #[test]
    fn test_exhaustion_goal_is_trivially_satisfiable() {
        let mut goal = Goal::exhaustion();
        assert!(goal.satisfied(&[]));
        assert!(goal.achieved);
    }

    #[test]
    fn test_eq_numeric_coercion() {
        let mut goal = Goal::new("t", "2", GoalOperator::Eq).with_count(1);
        assert!(goal.satisfied(&[fact("t", json!(2))]));
    }
}
