//! SORTIE: Operation Execution Engine
//!
//! Drives an operation to completion: one task per agent plans, encodes
//! and delivers links, feeds output back through the result parser, and
//! stops on objective completion, exhaustion or cancellation. Cleanup
//! links run for every agent afterwards regardless of how the run
//! ended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use opforge_bus::{topics, EventBus};
use opforge_config::DeployConfig;
use opforge_contact::Contact;
use opforge_control::{OpControl, Status};
use opforge_model::{Agent, Link, LinkResult, LinkStatus, Operation};
use opforge_parser::ResultParser;
use opforge_planner::Planner;
use opforge_transform::{Encoder, EncoderRegistry};

/// Executes operations against a group of agents
pub struct Engine {
    planner: Arc<Planner>,
    contact: Arc<dyn Contact>,
    encoder: Arc<dyn Encoder>,
    bus: EventBus,
}

impl Engine {
    /// Create an engine over a planner, a transport and a data encoder
    pub fn new(
        planner: Arc<Planner>,
        contact: Arc<dyn Contact>,
        encoder: Arc<dyn Encoder>,
        bus: EventBus,
    ) -> Self {
        Self {
            planner,
            contact,
            encoder,
            bus,
        }
    }

    /// Create an engine using the deployment's configured encoder
    pub fn from_config(
        planner: Arc<Planner>,
        contact: Arc<dyn Contact>,
        config: &DeployConfig,
        bus: EventBus,
    ) -> Self {
        let encoder = EncoderRegistry::new().get(&config.encoder);
        Self::new(planner, contact, encoder, bus)
    }

    /// Run the operation to completion and return it closed. Each agent
    /// gets its own loop; the loops end on exhaustion, cancellation or a
    /// declared objective completing, after which cleanup links run for
    /// every agent and the operation is closed.
    pub async fn run(&self, operation: Operation, control: Arc<OpControl>) -> Operation {
        let op_id = operation.id.to_string();
        info!("◆ SORTIE: operation {} engaged", operation.name);
        self.bus.emit(
            topics::OPERATION_STARTED,
            json!({"id": op_id, "name": operation.name, "group": operation.group}),
        );

        let agents = operation.agents.clone();
        let operation = Arc::new(Mutex::new(operation));
        let objective_met = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(agents.len());
        for agent in &agents {
            let runner = AgentRunner {
                planner: self.planner.clone(),
                contact: self.contact.clone(),
                encoder: self.encoder.clone(),
                parser: Arc::new(ResultParser::new(self.encoder.clone())),
                bus: self.bus.clone(),
                operation: operation.clone(),
                control: control.clone(),
                objective_met: objective_met.clone(),
            };
            let agent = agent.clone();
            handles.push(tokio::spawn(async move { runner.run(agent).await }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        if control.is_cancelled(&op_id).await {
            self.bus.emit(
                topics::OPERATION_STATE,
                json!({"id": op_id, "state": "CANCELLED"}),
            );
        }

        // Cleanup runs for every agent no matter how the loops ended.
        self.run_cleanup(&operation, &agents).await;

        {
            let mut op = operation.lock().await;
            op.close();
            info!("◆ SORTIE: operation {} closed", op.name);
        }
        control.cleanup_operation(&op_id).await;
        self.bus
            .emit(topics::OPERATION_COMPLETED, json!({"id": op_id}));

        match Arc::try_unwrap(operation) {
            Ok(mutex) => mutex.into_inner(),
            Err(arc) => arc.lock().await.clone(),
        }
    }

    /// Dispatch the cleanup set, newest work first, skipping nothing for
    /// cancellation
    async fn run_cleanup(&self, operation: &Arc<Mutex<Operation>>, agents: &[Agent]) {
        let cleanup_links = {
            let op = operation.lock().await;
            self.planner.get_cleanup_links(&op, None)
        };
        if cleanup_links.is_empty() {
            return;
        }
        debug!("◆ SORTIE: {} cleanup links to run", cleanup_links.len());

        for mut link in cleanup_links {
            let Some(agent) = agents.iter().find(|a| a.paw == link.paw) else {
                continue;
            };
            link.status = LinkStatus::Dispatched;
            {
                let mut op = operation.lock().await;
                op.add_link(link.clone());
            }

            let payload = self.encode_command(&link.command);
            let status = match self.contact.deliver(agent, &payload).await {
                Ok(_) => LinkStatus::Success,
                Err(e) => {
                    warn!("◆ SORTIE: cleanup failed on {}: {}", agent.paw, e);
                    LinkStatus::Error
                }
            };

            let mut op = operation.lock().await;
            if let Some(entry) = op.chain.iter_mut().find(|l| l.id == link.id) {
                entry.complete(status);
            }
            self.bus.emit(
                topics::LINK_COMPLETED,
                json!({"link": link.id, "paw": agent.paw, "cleanup": true}),
            );
        }
    }

    fn encode_command(&self, command: &str) -> String {
        String::from_utf8_lossy(&self.encoder.encode(command.as_bytes())).into_owned()
    }
}

/// One agent's execution loop, cloned per spawned task
struct AgentRunner {
    planner: Arc<Planner>,
    contact: Arc<dyn Contact>,
    encoder: Arc<dyn Encoder>,
    parser: Arc<ResultParser>,
    bus: EventBus,
    operation: Arc<Mutex<Operation>>,
    control: Arc<OpControl>,
    objective_met: Arc<AtomicBool>,
}

impl AgentRunner {
    /// Plan-dispatch-parse until this agent has nothing left to do
    async fn run(self, agent: Agent) {
        let (op_id, jitter) = {
            let op = self.operation.lock().await;
            (op.id.to_string(), op.jitter)
        };
        let token = self.control.cancellation_token(&op_id).await;

        loop {
            if self.objective_met.load(Ordering::SeqCst) {
                debug!("◆ SORTIE: {} standing down, objective met", agent.paw);
                break;
            }
            if self.control.check_status(&op_id).await == Status::Cancelled {
                debug!("◆ SORTIE: {} standing down, operation cancelled", agent.paw);
                break;
            }

            let Some(link) = self.next_link(&agent).await else {
                debug!("◆ SORTIE: {} exhausted", agent.paw);
                break;
            };

            let delay = jitter_delay(jitter);
            if !delay.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => continue,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.execute(&agent, link).await;
        }
    }

    /// Highest-priority untrimmed link for the agent, if any
    async fn next_link(&self, agent: &Agent) -> Option<Link> {
        let op = self.operation.lock().await;
        self.planner
            .get_links(&op, None, Some(agent), true)
            .into_iter()
            .next()
    }

    /// Deliver one link, record its result and feed the parser. Transport
    /// failures mark the link errored and the loop moves on.
    async fn execute(&self, agent: &Agent, mut link: Link) {
        link.status = LinkStatus::Dispatched;
        {
            let mut op = self.operation.lock().await;
            op.add_link(link.clone());
        }
        self.bus.emit(
            topics::LINK_DISPATCHED,
            json!({"link": link.id, "paw": agent.paw, "ability": link.ability.ability_id}),
        );

        let payload =
            String::from_utf8_lossy(&self.encoder.encode(link.command.as_bytes())).into_owned();
        match self.contact.deliver(agent, &payload).await {
            Ok(output) => {
                let mut op = self.operation.lock().await;
                if let Some(entry) = op.chain.iter_mut().find(|l| l.id == link.id) {
                    entry.output = Some(output.clone());
                    entry.complete(LinkStatus::Success);
                }
                op.add_result(LinkResult::new(link.id, output));

                let learned = self.parser.parse(&mut op);
                if learned > 0 {
                    self.bus.emit(
                        topics::FACT_LEARNED,
                        json!({"link": link.id, "count": learned}),
                    );
                }
                self.bus.emit(
                    topics::LINK_COMPLETED,
                    json!({"link": link.id, "paw": agent.paw, "status": "success"}),
                );

                self.check_objective(&mut op);
            }
            Err(e) => {
                warn!("◆ SORTIE: delivery to {} failed: {}", agent.paw, e);
                let mut op = self.operation.lock().await;
                if let Some(entry) = op.chain.iter_mut().find(|l| l.id == link.id) {
                    entry.complete(LinkStatus::Error);
                }
                self.bus.emit(
                    topics::LINK_COMPLETED,
                    json!({"link": link.id, "paw": agent.paw, "status": "error"}),
                );
            }
        }
    }

    /// Early-stop on declared objectives only. The implicit exhaustion
    /// objective latches immediately, so it never cuts a run short; those
    /// operations stop when the planner has nothing left.
    fn check_objective(&self, op: &mut Operation) {
        if op.objective.is_default() {
            return;
        }
        let facts = op.all_facts();
        if op.objective.completed(&facts) {
            info!("◆ SORTIE: objective '{}' complete", op.objective.name);
            self.objective_met.store(true, Ordering::SeqCst);
        }
    }
}

/// Random dispatch delay inside the operation's jitter bounds
fn jitter_delay(bounds: (u64, u64)) -> Duration {
    let (min, max) = bounds;
    if max == 0 {
        return Duration::ZERO;
    }
    let secs = if max <= min {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    Duration::from_secs(secs)
}
