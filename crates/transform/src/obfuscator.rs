//! Per-operation, platform-aware command wrappers

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use opforge_model::{Agent, Link};

use crate::{Result, TransformError};

/// A platform/executor-aware command wrapper
pub trait Obfuscator: Send + Sync {
    fn name(&self) -> &str;
    /// Whether this obfuscator handles the platform/executor combination
    fn supports(&self, platform: &str, executor: &str) -> bool;
    /// Wrap the command for the given executor
    fn obfuscate(&self, command: &str, executor: &str) -> Result<String>;
}

/// Identity wrapper, supports everything
pub struct PlainTextObfuscator;

impl Obfuscator for PlainTextObfuscator {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn supports(&self, _platform: &str, _executor: &str) -> bool {
        true
    }

    fn obfuscate(&self, command: &str, _executor: &str) -> Result<String> {
        Ok(command.to_string())
    }
}

/// Wraps commands in a base64 decode-and-eval envelope
pub struct Base64Envelope;

impl Obfuscator for Base64Envelope {
    fn name(&self) -> &str {
        "base64"
    }

    fn supports(&self, platform: &str, executor: &str) -> bool {
        matches!(
            (platform, executor),
            ("linux" | "darwin", "sh" | "bash") | ("windows", "psh")
        )
    }

    fn obfuscate(&self, command: &str, executor: &str) -> Result<String> {
        match executor {
            "sh" | "bash" => Ok(format!(
                "eval \"$(echo {} | base64 --decode)\"",
                STANDARD.encode(command)
            )),
            // Script hosts take a base64 UTF-16LE blob directly.
            "psh" => {
                let utf16: Vec<u8> = command
                    .encode_utf16()
                    .flat_map(|unit| unit.to_le_bytes())
                    .collect();
                Ok(format!("powershell -Enc {}", STANDARD.encode(utf16)))
            }
            other => Err(TransformError::Unsupported {
                platform: String::new(),
                executor: other.to_string(),
            }),
        }
    }
}

/// Name-keyed obfuscator registry, populated at startup
pub struct ObfuscatorRegistry {
    obfuscators: HashMap<String, Arc<dyn Obfuscator>>,
}

impl ObfuscatorRegistry {
    /// Registry with the built-in obfuscators
    pub fn new() -> Self {
        let mut registry = Self {
            obfuscators: HashMap::new(),
        };
        registry.register(Arc::new(PlainTextObfuscator));
        registry.register(Arc::new(Base64Envelope));
        registry
    }

    /// Register an obfuscator under its own name
    pub fn register(&mut self, obfuscator: Arc<dyn Obfuscator>) {
        self.obfuscators
            .insert(obfuscator.name().to_string(), obfuscator);
    }

    /// Look up by name; unknown names fall back to plain-text
    pub fn get(&self, name: &str) -> Arc<dyn Obfuscator> {
        match self.obfuscators.get(name) {
            Some(obfuscator) => obfuscator.clone(),
            None => {
                warn!("◆ CAMO: unknown obfuscator '{}', using plain-text", name);
                Arc::new(PlainTextObfuscator)
            }
        }
    }
}

impl Default for ObfuscatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 hex digest of a command
pub fn command_digest(command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Run the obfuscation stage over a link. Records the digest of the
/// pre-transform command on the link, then rewrites the command when the
/// agent's platform and the link's executor are supported. Unsupported
/// combinations and internal failures fall back to the plain command;
/// this function never fails.
pub fn apply(link: &mut Link, agent: &Agent, obfuscator: &dyn Obfuscator) {
    link.command_hash = Some(command_digest(&link.command));

    let executor = link.ability.executor.clone();
    if !obfuscator.supports(&agent.platform, &executor) || !agent.supports(&executor) {
        debug!(
            "◆ CAMO: {} does not cover {}/{}, command left plain",
            obfuscator.name(),
            agent.platform,
            executor
        );
        return;
    }

    match obfuscator.obfuscate(&link.command, &executor) {
        Ok(wrapped) => link.command = wrapped,
        Err(e) => {
            warn!("◆ CAMO: obfuscation failed, command left plain: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opforge_model::Ability;
    use uuid::Uuid;

    fn link(platform: &str, executor: &str, command: &str) -> Link {
        let ability = Ability::new("ab-1", "test", platform, executor, command);
        Link::new(Uuid::new_v4(), "paw-1", ability, command)
    }

    #[test]
    fn test_bash_envelope() {
        let wrapped = Base64Envelope.obfuscate("whoami", "sh").unwrap();
        assert_eq!(wrapped, "eval \"$(echo d2hvYW1p | base64 --decode)\"");
    }

    #[test]
    fn test_psh_envelope_is_utf16le() {
        let wrapped = Base64Envelope.obfuscate("whoami", "psh").unwrap();
        // "whoami" as UTF-16LE: each char followed by a zero byte.
        let expected = STANDARD.encode(b"w\0h\0o\0a\0m\0i\0");
        assert_eq!(wrapped, format!("powershell -Enc {}", expected));
    }

    #[test]
    fn test_apply_records_pre_transform_hash() {
        let agent = Agent::new("paw-1", "linux", vec!["sh".into()]);
        let mut link = link("linux", "sh", "whoami");
        apply(&mut link, &agent, &Base64Envelope);

        assert_eq!(link.command_hash.as_deref(), Some(command_digest("whoami").as_str()));
        assert_ne!(link.command, "whoami");
        assert!(link.command.contains("base64 --decode"));
    }

    #[test]
    fn test_apply_unsupported_platform_falls_back() {
        let agent = Agent::new("paw-1", "freebsd", vec!["sh".into()]);
        let mut link = link("freebsd", "sh", "whoami");
        apply(&mut link, &agent, &Base64Envelope);

        // Hash still recorded, command untouched.
        assert!(link.command_hash.is_some());
        assert_eq!(link.command, "whoami");
    }

    #[test]
    fn test_apply_executor_not_supported_by_agent() {
        let agent = Agent::new("paw-1", "windows", vec!["cmd".into()]);
        let mut link = link("windows", "psh", "whoami");
        apply(&mut link, &agent, &Base64Envelope);

        assert_eq!(link.command, "whoami");
    }

    #[test]
    fn test_registry_fallback() {
        let registry = ObfuscatorRegistry::new();
        assert_eq!(registry.get("nonexistent").name(), "plain-text");
        assert_eq!(registry.get("base64").name(), "base64");
    }
}
