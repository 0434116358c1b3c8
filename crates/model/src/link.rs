//! Links: agent-bound instantiations of abilities

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ability::Ability;
use crate::fact::Fact;

/// Link lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Planned, not yet sent
    Queued,
    /// Sent to the agent
    Dispatched,
    /// Output received, not yet judged
    Collected,
    /// Completed with usable output
    Success,
    /// Dropped without execution
    Discarded,
    /// Transport or execution failure
    Error,
}

impl LinkStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Discarded | Self::Error)
    }
}

/// One concrete, agent-bound instantiation of an ability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    /// Owning operation
    pub operation: Uuid,
    /// Target agent paw
    pub paw: String,
    /// Ability this link instantiates
    pub ability: Ability,
    /// Rendered command, post fact-substitution (and post obfuscation
    /// once the transform pipeline has run)
    pub command: String,
    /// SHA-256 hex of the pre-obfuscation command, for audit/idempotence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_hash: Option<String>,
    pub status: LinkStatus,
    /// Encoded agent output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Cleanup links run after cancellation or exhaustion
    #[serde(default)]
    pub cleanup: bool,
    /// Ordering score; higher runs first
    #[serde(default)]
    pub score: i64,
    /// Jitter applied before dispatch, seconds
    #[serde(default)]
    pub jitter: u64,
    /// Facts substituted into the command
    #[serde(default)]
    pub used: Vec<Fact>,
    pub decide: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish: Option<DateTime<Local>>,
}

impl Link {
    /// Create a queued link for an agent
    pub fn new(operation: Uuid, paw: impl Into<String>, ability: Ability, command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            paw: paw.into(),
            ability,
            command: command.into(),
            command_hash: None,
            status: LinkStatus::Queued,
            output: None,
            cleanup: false,
            score: 0,
            jitter: 0,
            used: Vec::new(),
            decide: Local::now(),
            finish: None,
        }
    }

    /// Mark as a cleanup link
    pub fn as_cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }

    /// Set the ordering score
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    /// Record the facts substituted into the command
    pub fn with_used(mut self, used: Vec<Fact>) -> Self {
        self.used = used;
        self
    }

    /// Stamp a terminal status and the finish time
    pub fn complete(&mut self, status: LinkStatus) {
        self.status = status;
        self.finish = Some(Local::now());
    }
}

/// Raw, encoder-wrapped agent output tied to a link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResult {
    pub link_id: Uuid,
    /// Transform-encoded output blob
    pub output: String,
    /// Stamped exactly once when the result has been parsed for facts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<DateTime<Local>>,
}

impl LinkResult {
    /// Create an unparsed result
    pub fn new(link_id: Uuid, output: impl Into<String>) -> Self {
        Self {
            link_id,
            output: output.into(),
            parsed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ability() -> Ability {
        Ability::new("ab-1", "whoami", "linux", "sh", "whoami")
    }

    #[test]
    fn test_link_lifecycle() {
        let mut link = Link::new(Uuid::new_v4(), "paw-1", ability(), "whoami");
        assert_eq!(link.status, LinkStatus::Queued);
        assert!(link.finish.is_none());

        link.status = LinkStatus::Dispatched;
        link.complete(LinkStatus::Success);
        assert!(link.status.is_terminal());
        assert!(link.finish.is_some());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!LinkStatus::Queued.is_terminal());
        assert!(!LinkStatus::Dispatched.is_terminal());
        assert!(!LinkStatus::Collected.is_terminal());
        assert!(LinkStatus::Success.is_terminal());
        assert!(LinkStatus::Discarded.is_terminal());
        assert!(LinkStatus::Error.is_terminal());
    }

    #[test]
    fn test_result_starts_unparsed() {
        let result = LinkResult::new(Uuid::new_v4(), "b64blob");
        assert!(result.parsed.is_none());
    }
}
