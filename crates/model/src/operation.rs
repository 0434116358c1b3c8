//! Operations and adversary profiles

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Agent;
use crate::fact::Fact;
use crate::link::{Link, LinkResult};
use crate::objective::Objective;

/// Ordered phases of ability ids defining planning order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adversary {
    pub adversary_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Each inner vec is one phase/bucket, in profile order
    pub phases: Vec<Vec<String>>,
}

impl Adversary {
    /// Create a new profile
    pub fn new(adversary_id: impl Into<String>, name: impl Into<String>, phases: Vec<Vec<String>>) -> Self {
        Self {
            adversary_id: adversary_id.into(),
            name: name.into(),
            description: String::new(),
            phases,
        }
    }

    /// Ability ids flattened in profile order; the canonical tie-break
    /// for link ordering
    pub fn atomic_ordering(&self) -> Vec<&str> {
        self.phases
            .iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// A named run against a group of agents using an adversary profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub name: String,
    /// Host group the operation targets
    pub group: String,
    pub adversary: Adversary,
    /// Agents in the host group at start time
    pub agents: Vec<Agent>,
    /// Planner strategy selector
    #[serde(default)]
    pub planner: String,
    /// Accumulating fact collection, seed facts first
    #[serde(default)]
    pub facts: Vec<Fact>,
    /// Append-only link chain; the operation history
    #[serde(default)]
    pub chain: Vec<Link>,
    /// Raw results awaiting or past parsing
    #[serde(default)]
    pub results: Vec<LinkResult>,
    /// Completion condition
    pub objective: Objective,
    /// Display state; the run-state machine lives in the control store
    #[serde(default)]
    pub state: String,
    /// Obfuscator selector
    #[serde(default = "default_obfuscator")]
    pub obfuscator: String,
    /// Jitter bounds in seconds (min, max)
    #[serde(default = "default_jitter")]
    pub jitter: (u64, u64),
    #[serde(default)]
    pub allow_untrusted: bool,
    #[serde(default = "default_autonomous")]
    pub autonomous: bool,
    pub start: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<DateTime<Local>>,
}

fn default_obfuscator() -> String {
    "plain-text".to_string()
}

fn default_jitter() -> (u64, u64) {
    (2, 8)
}

fn default_autonomous() -> bool {
    true
}

impl Operation {
    /// Create a new operation with the implicit exhaustion objective
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        adversary: Adversary,
        agents: Vec<Agent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group: group.into(),
            adversary,
            agents,
            planner: "atomic".to_string(),
            facts: Vec::new(),
            chain: Vec::new(),
            results: Vec::new(),
            objective: Objective::exhaustion(),
            state: "running".to_string(),
            obfuscator: default_obfuscator(),
            jitter: default_jitter(),
            allow_untrusted: false,
            autonomous: true,
            start: Local::now(),
            finish: None,
        }
    }

    /// Attach a declared objective
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Select an obfuscator by name
    pub fn with_obfuscator(mut self, name: impl Into<String>) -> Self {
        self.obfuscator = name.into();
        self
    }

    /// Allow untrusted agents to receive links
    pub fn allowing_untrusted(mut self) -> Self {
        self.allow_untrusted = true;
        self
    }

    /// Seed facts known before the first link runs
    pub fn seed_facts(&mut self, facts: Vec<Fact>) {
        let source = self.id.to_string();
        self.facts
            .extend(facts.into_iter().map(|f| f.with_source(source.clone())));
    }

    /// Append a link to the chain
    pub fn add_link(&mut self, link: Link) {
        self.chain.push(link);
    }

    /// Record raw output for a link
    pub fn add_result(&mut self, result: LinkResult) {
        self.results.push(result);
    }

    /// Facts usable for planning and goal evaluation; blacklisted facts
    /// stay in the collection but are excluded here
    pub fn all_facts(&self) -> Vec<Fact> {
        self.facts
            .iter()
            .filter(|f| !f.blacklisted)
            .cloned()
            .collect()
    }

    /// Close the operation
    pub fn close(&mut self) {
        self.state = "finished".to_string();
        self.finish = Some(Local::now());
    }
}
