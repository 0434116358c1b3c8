//! Remote execution endpoints

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::ability::Ability;

/// A remote execution endpoint identified by a stable paw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier
    pub paw: String,
    /// Hostname the agent reported
    #[serde(default)]
    pub host: String,
    /// Platform: linux, darwin, windows
    pub platform: String,
    /// Executors the agent supports, e.g. sh, psh, cmd
    pub executors: Vec<String>,
    /// Host group membership
    #[serde(default)]
    pub group: String,
    /// Untrusted agents are skipped unless the operation allows them
    #[serde(default = "default_trusted")]
    pub trusted: bool,
    /// Last beacon timestamp
    pub last_seen: DateTime<Local>,
    /// Sleep interval bounds in seconds
    #[serde(default)]
    pub sleep_min: u64,
    #[serde(default)]
    pub sleep_max: u64,
}

fn default_trusted() -> bool {
    true
}

impl Agent {
    /// Create a new agent record
    pub fn new(
        paw: impl Into<String>,
        platform: impl Into<String>,
        executors: Vec<String>,
    ) -> Self {
        Self {
            paw: paw.into(),
            host: String::new(),
            platform: platform.into(),
            executors,
            group: String::new(),
            trusted: true,
            last_seen: Local::now(),
            sleep_min: 2,
            sleep_max: 8,
        }
    }

    /// Set group membership
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Mark the agent untrusted
    pub fn untrusted(mut self) -> Self {
        self.trusted = false;
        self
    }

    /// Whether the agent supports an executor
    pub fn supports(&self, executor: &str) -> bool {
        self.executors.iter().any(|e| e == executor)
    }

    /// Whether the agent can run an ability (platform + executor match)
    pub fn capable(&self, ability: &Ability) -> bool {
        self.platform == ability.platform && self.supports(&ability.executor)
    }

    /// Refresh the beacon timestamp
    pub fn beacon(&mut self) {
        self.last_seen = Local::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::Ability;

    #[test]
    fn test_agent_supports() {
        let agent = Agent::new("paw-1", "linux", vec!["sh".into(), "proc".into()]);
        assert!(agent.supports("sh"));
        assert!(!agent.supports("psh"));
    }

    #[test]
    fn test_agent_capable() {
        let agent = Agent::new("paw-1", "linux", vec!["sh".into()]);
        let ability = Ability::new("ab-1", "whoami", "linux", "sh", "whoami");
        assert!(agent.capable(&ability));

        let windows = Ability::new("ab-2", "whoami", "windows", "psh", "whoami");
        assert!(!agent.capable(&windows));
    }

    #[test]
    fn test_agent_trust_default() {
        let agent = Agent::new("paw-1", "linux", vec!["sh".into()]);
        assert!(agent.trusted);
        assert!(!agent.untrusted().trusted);
    }
}
