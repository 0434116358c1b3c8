//! Named collections of goals defining operation completion

use serde::{Deserialize, Serialize};

use crate::fact::Fact;
use crate::goal::Goal;

/// Id given to the implicit run-to-exhaustion objective
pub const DEFAULT_OBJECTIVE_ID: &str = "default";

/// A named, ordered collection of goals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl Objective {
    /// Create a new objective
    pub fn new(id: impl Into<String>, name: impl Into<String>, goals: Vec<Goal>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            goals,
        }
    }

    /// The implicit objective attached when an operation declares none:
    /// a single wildcard exhaustion goal.
    pub fn exhaustion() -> Self {
        Self::new(DEFAULT_OBJECTIVE_ID, "exhaustion", vec![Goal::exhaustion()])
    }

    /// Whether this is the implicit run-to-exhaustion objective
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_OBJECTIVE_ID
    }

    /// Re-evaluate every goal against the facts; true iff none evaluates
    /// false. Evaluation latches each goal's `achieved` flag as a side
    /// effect.
    pub fn completed(&mut self, facts: &[Fact]) -> bool {
        !self
            .goals
            .iter_mut()
            .any(|goal| !goal.satisfied(facts))
    }

    /// Percentage of goals satisfied, read from the cached `achieved`
    /// latches only, with no re-evaluation. Empty goal list yields 0.
    pub fn percentage(&self) -> f64 {
        if self.goals.is_empty() {
            return 0.0;
        }
        let achieved = self.goals.iter().filter(|goal| goal.achieved).count();
        100.0 * achieved as f64 / self.goals.len() as f64
    }
}
