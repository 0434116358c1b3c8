//! WARGAME: Link Planner
//!
//! Generates, scores, orders and trims candidate links for an
//! agent/operation/phase combination, and decides the cleanup set.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use opforge_model::{Ability, Agent, Fact, Link, LinkStatus, Operation};
use opforge_transform::{self as transform, ObfuscatorRegistry};

/// Generates executable links from abilities and facts
pub struct Planner {
    /// Ability id to platform/executor variants
    abilities: HashMap<String, Vec<Ability>>,
    obfuscators: ObfuscatorRegistry,
    variable: Regex,
}

impl Planner {
    /// Create a planner over a loaded ability index
    pub fn new(abilities: Vec<Ability>) -> Self {
        let mut index: HashMap<String, Vec<Ability>> = HashMap::new();
        for ability in abilities {
            index.entry(ability.ability_id.clone()).or_default().push(ability);
        }
        Self {
            abilities: index,
            obfuscators: ObfuscatorRegistry::new(),
            variable: Regex::new(r"#\{(.*?)\}").expect("static pattern"),
        }
    }

    /// Replace the obfuscator registry (plugin registration)
    pub fn with_obfuscators(mut self, obfuscators: ObfuscatorRegistry) -> Self {
        self.obfuscators = obfuscators;
        self
    }

    /// Executable links for the requested scope. `phase` limits abilities
    /// to phases up to and including that index; links are built for the
    /// one agent, or every agent in the group when omitted. With `trim`,
    /// completed duplicates are dropped and commands obfuscated.
    pub fn get_links(
        &self,
        operation: &Operation,
        phase: Option<usize>,
        agent: Option<&Agent>,
        trim: bool,
    ) -> Vec<Link> {
        let abilities = self.phase_abilities(operation, phase);

        let mut links = Vec::new();
        match agent {
            Some(agent) => {
                if self.link_allowed(agent, operation) {
                    links.extend(self.generate_links(operation, agent, &abilities));
                }
            }
            None => {
                for agent in &operation.agents {
                    if self.link_allowed(agent, operation) {
                        links.extend(self.generate_links(operation, agent, &abilities));
                    }
                }
            }
        }

        if trim {
            links = self.trim_links(operation, links);
        }
        self.sort_links(operation, links)
    }

    /// Reverse-order cleanup links for the operation, or one agent
    pub fn get_cleanup_links(&self, operation: &Operation, agent: Option<&Agent>) -> Vec<Link> {
        let mut links = Vec::new();
        match agent {
            Some(agent) => {
                if self.link_allowed(agent, operation) {
                    links.extend(self.cleanup_for_agent(operation, &agent.paw));
                }
            }
            None => {
                for agent in &operation.agents {
                    if self.link_allowed(agent, operation) {
                        links.extend(self.cleanup_for_agent(operation, &agent.paw));
                    }
                }
            }
        }
        links
    }

    /// Abilities in profile order up to the requested phase
    fn phase_abilities<'a>(&'a self, operation: &Operation, phase: Option<usize>) -> Vec<&'a Ability> {
        let last = phase.unwrap_or(operation.adversary.phases.len().saturating_sub(1));
        operation
            .adversary
            .phases
            .iter()
            .take(last + 1)
            .flatten()
            .filter_map(|id| self.abilities.get(id))
            .flatten()
            .collect()
    }

    /// Untrusted agents receive nothing unless the operation allows them
    fn link_allowed(&self, agent: &Agent, operation: &Operation) -> bool {
        if !agent.trusted && !operation.allow_untrusted {
            debug!("Agent {} untrusted: no link created", agent.paw);
            return false;
        }
        true
    }

    /// Render candidate links for every ability the agent can run whose
    /// fact requirements are currently satisfiable. An ability whose
    /// facts are missing yields nothing now and reappears once they
    /// exist.
    fn generate_links(&self, operation: &Operation, agent: &Agent, abilities: &[&Ability]) -> Vec<Link> {
        let facts = operation.all_facts();
        let mut links = Vec::new();

        for ability in abilities {
            if !agent.capable(ability) {
                continue;
            }
            if !ability
                .requirements
                .iter()
                .all(|t| facts.iter().any(|f| &f.trait_name == t))
            {
                continue;
            }

            let variables = self.variables(&ability.command);
            if variables.is_empty() {
                links.push(self.build_link(operation, agent, ability, ability.command.clone(), vec![]));
                continue;
            }

            // One link per combination of matching facts, one fact per
            // variable (cartesian expansion).
            let candidates: Vec<Vec<&Fact>> = variables
                .iter()
                .map(|v| facts.iter().filter(|f| &f.trait_name == v).collect())
                .collect();
            if candidates.iter().any(Vec::is_empty) {
                continue;
            }

            for combo in cartesian(&candidates) {
                let mut command = ability.command.clone();
                let mut score = 0;
                for (variable, fact) in variables.iter().zip(&combo) {
                    command = command.replace(&format!("#{{{}}}", variable), &fact.value_string());
                    score += fact.score;
                }
                let used = combo.into_iter().cloned().collect();
                links.push(
                    self.build_link(operation, agent, ability, command, used)
                        .with_score(score),
                );
            }
        }
        links
    }

    fn build_link(
        &self,
        operation: &Operation,
        agent: &Agent,
        ability: &Ability,
        command: String,
        used: Vec<Fact>,
    ) -> Link {
        let mut link =
            Link::new(operation.id, agent.paw.clone(), (*ability).clone(), command).with_used(used);
        link.jitter = operation.jitter.0;
        link
    }

    /// Drop links an agent already completed (unless repeatable), then
    /// run the obfuscation stage
    fn trim_links(&self, operation: &Operation, links: Vec<Link>) -> Vec<Link> {
        let obfuscator = self.obfuscators.get(&operation.obfuscator);
        let mut trimmed = Vec::new();

        for mut link in links {
            // Chain commands may have been obfuscated after planning, so
            // duplicates are matched on the pre-transform digest as well.
            let digest = transform::command_digest(&link.command);
            let completed = operation.chain.iter().any(|past| {
                past.paw == link.paw
                    && past.finish.is_some()
                    && (past.command == link.command
                        || past.command_hash.as_deref() == Some(digest.as_str()))
            });
            if completed && !link.ability.repeatable {
                continue;
            }
            if let Some(agent) = operation.agents.iter().find(|a| a.paw == link.paw) {
                transform::apply(&mut link, agent, obfuscator.as_ref());
            }
            trimmed.push(link);
        }
        trimmed
    }

    /// Score descending; ties broken by adversary profile order, never
    /// arbitrarily
    fn sort_links(&self, operation: &Operation, mut links: Vec<Link>) -> Vec<Link> {
        let ordering: HashMap<&str, usize> = operation
            .adversary
            .atomic_ordering()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        links.sort_by_key(|link| {
            let position = ordering
                .get(link.ability.ability_id.as_str())
                .copied()
                .unwrap_or(usize::MAX);
            (-link.score, position)
        });
        links
    }

    /// Cleanup links for one agent: reverse-chain walk over successful,
    /// non-cleanup links whose ability declares a cleanup command
    fn cleanup_for_agent(&self, operation: &Operation, paw: &str) -> Vec<Link> {
        let mut links: Vec<Link> = Vec::new();
        for past in operation.chain.iter().rev() {
            if past.paw != paw || past.cleanup || past.status != LinkStatus::Success {
                continue;
            }
            let Some(cleanup) = past.ability.cleanup.clone() else {
                continue;
            };
            if links.iter().any(|l| l.command == cleanup) {
                continue;
            }
            links.push(
                Link::new(operation.id, paw.to_string(), past.ability.clone(), cleanup).as_cleanup(),
            );
        }
        links
    }

    /// Fact placeholder names referenced by a command template
    fn variables(&self, command: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for capture in self.variable.captures_iter(command) {
            let name = capture[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

/// All combinations taking one element per inner slice
fn cartesian<'a>(candidates: &[Vec<&'a Fact>]) -> Vec<Vec<&'a Fact>> {
    let mut combos: Vec<Vec<&Fact>> = vec![Vec::new()];
    for options in candidates {
        let mut next = Vec::with_capacity(combos.len() * options.len());
        for combo in &combos {
            for option in options {
                let mut extended = combo.clone();
                extended.push(option);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use opforge_model::Fact;

    #[test]
    fn test_cartesian_two_by_two() {
        let a1 = Fact::new("a", "1");
        let a2 = Fact::new("a", "2");
        let b1 = Fact::new("b", "x");
        let b2 = Fact::new("b", "y");
        let candidates = vec![vec![&a1, &a2], vec![&b1, &b2]];

        let combos = cartesian(&candidates);
        assert_eq!(combos.len(), 4);
    }

    #[test]
    fn test_variable_extraction_dedups() {
        let planner = Planner::new(vec![]);
        let vars = planner.variables("ping #{host.ip} && ssh #{user}@#{host.ip}");
        assert_eq!(vars, vec!["host.ip".to_string(), "user".to_string()]);
    }
}
