//! DEBRIEF: Result Parser
//!
//! The feedback loop: raw agent output becomes facts, facts feed the
//! planner and the goal evaluator. Single-result failures are isolated
//! and logged; a parse pass never aborts the operation.

use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, warn};

use opforge_model::{Fact, Link, LinkStatus, Operation};
use opforge_transform::Encoder;

pub mod parsers;

/// Parser errors
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("BAD PATTERN '{0}': {1}")]
    Pattern(String, String),

    #[error("OUTPUT DECODE FAILED: {0}")]
    Decode(#[from] opforge_transform::TransformError),

    #[error("OUTPUT NOT UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, ParserError>;

/// Turns unparsed results into facts on the owning operation
pub struct ResultParser {
    encoder: Arc<dyn Encoder>,
}

impl ResultParser {
    /// Create a parser over the deployment's data encoder
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Parse every unparsed result belonging to the operation. Returns
    /// the number of facts learned. Already-parsed results are filtered
    /// out up front, so re-running this pass is a no-op.
    pub fn parse(&self, operation: &mut Operation) -> usize {
        let pending: Vec<usize> = operation
            .results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.parsed.is_none())
            .map(|(i, _)| i)
            .collect();

        let mut total = 0;
        for index in pending {
            total += self.parse_one(operation, index);
        }
        total
    }

    /// Parse a single result by index; returns facts learned
    fn parse_one(&self, operation: &mut Operation, index: usize) -> usize {
        let link_id = operation.results[index].link_id;
        let link = match operation.chain.iter().find(|l| l.id == link_id) {
            Some(link) => link.clone(),
            None => {
                warn!("result for unknown link {}, skipping", link_id);
                operation.results[index].parsed = Some(Local::now());
                return 0;
            }
        };
        if link.status != LinkStatus::Success {
            // A failed link's result will never become parseable; stamp it
            // out of the pending set. A link still in flight keeps its
            // result pending for a later pass.
            if link.status.is_terminal() {
                operation.results[index].parsed = Some(Local::now());
            }
            return 0;
        }

        let learned = match self.decode(&operation.results[index].output) {
            Ok(blob) => self.learn(operation, &link, &blob),
            Err(e) => {
                error!("could not decode output for link {}: {}", link.id, e);
                0
            }
        };

        if learned > 0 {
            self.reward_used_facts(operation, &link, learned as i64);
        }

        // Stamped exactly once; the pending filter upstream makes a second
        // pass a no-op.
        operation.results[index].parsed = Some(Local::now());
        learned
    }

    fn decode(&self, output: &str) -> Result<String> {
        let bytes = self.encoder.decode(output.as_bytes())?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Run every declared parser over the blob and store surviving facts
    fn learn(&self, operation: &mut Operation, link: &Link, blob: &str) -> usize {
        let mut learned = 0;
        for config in &link.ability.parsers {
            let extracted = match parsers::extract(config, blob) {
                Ok(facts) => facts,
                Err(e) => {
                    // Isolated: one bad parser never aborts the pass.
                    error!("parser failed for ability {}: {}", link.ability.ability_id, e);
                    continue;
                }
            };
            for fact in extracted {
                if self.store_fact(operation, link, fact) {
                    learned += 1;
                }
            }
        }
        debug!("link {} produced {} facts", link.id, learned);
        learned
    }

    /// Store a fact with provenance unless a blacklisted duplicate
    /// exists. A non-blacklisted duplicate is stored again; only the
    /// blacklist suppresses.
    fn store_fact(&self, operation: &mut Operation, link: &Link, fact: Fact) -> bool {
        let suppressed = operation
            .facts
            .iter()
            .any(|f| f.blacklisted && f.same_as(&fact.trait_name, &fact.value));
        if suppressed {
            debug!("fact {} suppressed by blacklist", fact.trait_name);
            return false;
        }

        let fact = fact
            .with_source(operation.id.to_string())
            .collected(link.id, link.paw.clone());
        operation.facts.push(fact);
        true
    }

    /// Facts that parameterized a productive link gain score
    fn reward_used_facts(&self, operation: &mut Operation, link: &Link, increment: i64) {
        for used in &link.used {
            if let Some(fact) = operation
                .facts
                .iter_mut()
                .find(|f| f.same_as(&used.trait_name, &used.value))
            {
                fact.score += increment;
            }
        }
    }
}
