//! Goal and objective satisfaction properties

use opforge_model::{Fact, Goal, GoalOperator, Objective};
use serde_json::json;

#[test]
fn test_count_one_goal_satisfaction() {
    let mut goal = Goal::new("domain.user.name", "vulcan", GoalOperator::Eq).with_count(1);
    assert!(!goal.satisfied(&[]));

    let matching = Fact::new("domain.user.name", "vulcan");
    assert!(goal.satisfied(&[matching]));
}

#[test]
fn test_satisfaction_survives_fact_withdrawal() {
    let mut goal = Goal::new("domain.user.name", "vulcan", GoalOperator::Eq).with_count(1);
    assert!(goal.satisfied(&[Fact::new("domain.user.name", "vulcan")]));

    // A later evaluation with no matching facts must still report true.
    assert!(goal.satisfied(&[]));
    assert!(goal.satisfied(&[Fact::new("domain.user.name", "other")]));
}

#[test]
fn test_objective_percentage_half_satisfied() {
    let goals = vec![
        Goal::new("a", "1", GoalOperator::Eq).with_count(1),
        Goal::new("b", "2", GoalOperator::Eq).with_count(1),
    ];
    let mut objective = Objective::new("obj", "split", goals);
    objective.completed(&[Fact::new("a", "1")]);
    assert_eq!(objective.percentage(), 50.0);
}

#[test]
fn test_objective_percentage_no_goals() {
    let objective = Objective::new("obj", "empty", vec![]);
    assert_eq!(objective.percentage(), 0.0);
}

#[test]
fn test_operator_table() {
    // value OP fact.value with goal value on the left: 2 > 1 holds.
    let mut gt = Goal::new("n", 2, GoalOperator::Gt).with_count(1);
    assert!(gt.satisfied(&[Fact::new("n", 1)]));

    let mut le = Goal::new("n", 2, GoalOperator::Le).with_count(1);
    assert!(le.satisfied(&[Fact::new("n", 2)]));
    let mut le = Goal::new("n", 2, GoalOperator::Le).with_count(1);
    assert!(!le.satisfied(&[Fact::new("n", 1)]));

    let mut within = Goal::new("m", "jul", GoalOperator::In).with_count(1);
    assert!(within.satisfied(&[Fact::new("m", json!(["jun", "jul", "aug"]))]));

    let mut wildcard = Goal::new("whatever", "whatever", GoalOperator::Always);
    assert!(wildcard.satisfied(&[]));
}

#[test]
fn test_percentage_is_cache_read_completed_is_fresh() {
    let goals = vec![Goal::new("a", "1", GoalOperator::Eq).with_count(1)];
    let mut objective = Objective::new("obj", "single", goals);

    // A matching fact exists, but nothing has evaluated yet: the cache is
    // cold and percentage reports 0.
    let facts = vec![Fact::new("a", "1")];
    assert_eq!(objective.percentage(), 0.0);

    // completed() performs the fresh evaluation.
    assert!(objective.completed(&facts));
    assert_eq!(objective.percentage(), 100.0);
}
