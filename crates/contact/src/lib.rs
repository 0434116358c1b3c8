//! UPLINK: Transport Seam
//!
//! The engine's entire transport contract: deliver an encoded command to
//! an agent and get encoded output back. Beacon bookkeeping lives here
//! too; the wire protocol itself belongs to the excluded contact layer.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use opforge_model::{Agent, LinkStatus, Operation};

/// Uplink errors
#[derive(Error, Debug)]
pub enum ContactError {
    #[error("◆ SIGNAL LOST: {0}")]
    Unreachable(String),

    #[error("◆ AGENT UNKNOWN: {0}")]
    UnknownAgent(String),
}

pub type Result<T> = std::result::Result<T, ContactError>;

/// Delivers commands to agents and returns their output
#[async_trait]
pub trait Contact: Send + Sync {
    /// Deliver an encoded command, await the encoded output
    async fn deliver(&self, agent: &Agent, encoded_command: &str) -> Result<String>;
}

/// What a beaconing agent reports about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub paw: String,
    pub host: String,
    pub platform: String,
    pub executors: Vec<String>,
    #[serde(default)]
    pub group: String,
}

/// A pending command for a beaconing agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub link_id: Uuid,
    pub command: String,
}

/// Tracks known agents across beacons
#[derive(Default)]
pub struct ContactService {
    agents: Mutex<HashMap<String, Agent>>,
}

impl ContactService {
    /// Create an empty roster
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh an agent from a beacon and collect the
    /// operation's queued instructions for it. New paws are added to the
    /// roster; known paws keep their trust flag and refresh last_seen.
    pub async fn handle_heartbeat(
        &self,
        descriptor: AgentDescriptor,
        operation: &Operation,
    ) -> (Agent, Vec<Instruction>) {
        let mut agents = self.agents.lock().await;
        let agent = agents
            .entry(descriptor.paw.clone())
            .and_modify(|existing| {
                existing.host = descriptor.host.clone();
                existing.executors = descriptor.executors.clone();
                existing.beacon();
            })
            .or_insert_with(|| {
                info!("◆ UPLINK: new agent {}", descriptor.paw);
                let mut agent = Agent::new(
                    descriptor.paw.clone(),
                    descriptor.platform.clone(),
                    descriptor.executors.clone(),
                )
                .with_group(descriptor.group.clone());
                agent.host = descriptor.host.clone();
                agent
            })
            .clone();

        let pending = pending_instructions(operation, &agent.paw);
        debug!(
            "◆ UPLINK: {} instructions pending for {}",
            pending.len(),
            agent.paw
        );
        (agent, pending)
    }

    /// Known agent by paw
    pub async fn agent(&self, paw: &str) -> Option<Agent> {
        self.agents.lock().await.get(paw).cloned()
    }
}

/// Queued links for a paw, in chain order
pub fn pending_instructions(operation: &Operation, paw: &str) -> Vec<Instruction> {
    operation
        .chain
        .iter()
        .filter(|link| link.paw == paw && link.status == LinkStatus::Queued)
        .map(|link| Instruction {
            link_id: link.id,
            command: link.command.clone(),
        })
        .collect()
}
