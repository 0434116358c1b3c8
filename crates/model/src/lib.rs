//! DOSSIER: Core data objects
//!
//! Operations, agents, abilities, links, facts and goals: everything the
//! planning engine reasons about.

pub mod ability;
pub mod agent;
pub mod fact;
pub mod goal;
pub mod link;
pub mod objective;
pub mod operation;

pub use ability::{Ability, ParserConfig, ParserType};
pub use agent::Agent;
pub use fact::Fact;
pub use goal::{Goal, GoalOperator, GOAL_COUNT_UNBOUNDED};
pub use link::{Link, LinkResult, LinkStatus};
pub use objective::{Objective, DEFAULT_OBJECTIVE_ID};
pub use operation::{Adversary, Operation};
