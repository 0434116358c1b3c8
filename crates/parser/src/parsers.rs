//! Parser-type dispatch: raw output blobs to facts

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use opforge_model::{Fact, ParserConfig, ParserType};

use crate::{ParserError, Result};

/// Dispatch a blob through the configured parser type. Unrecognized
/// types have already collapsed to regex at config load.
pub fn extract(config: &ParserConfig, blob: &str) -> Result<Vec<Fact>> {
    match config.parser_type {
        ParserType::Json => Ok(json(config, blob)),
        ParserType::Line => Ok(line(config, blob)),
        ParserType::Regex => regex(config, blob),
        ParserType::Mimikatz => Ok(mimikatz(blob)),
    }
}

/// Navigate a "."-joined path into parsed JSON. Malformed input is
/// logged and yields no facts.
fn json(config: &ParserConfig, blob: &str) -> Vec<Fact> {
    let root: Value = match serde_json::from_str(blob) {
        Ok(value) => value,
        Err(_) => {
            warn!("Malformed json returned. Unable to retrieve any facts.");
            return Vec::new();
        }
    };

    // A top-level list yields one fact per element, keyed by index.
    if let Value::Array(items) = root {
        return items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let value = match &item {
                    Value::Object(map) if !config.script.is_empty() => {
                        map.get(&config.script).cloned().unwrap_or(item.clone())
                    }
                    _ => item,
                };
                Fact::new(config.property.clone(), value).with_set_id(i as i64)
            })
            .collect();
    }

    let mut cursor = &root;
    for segment in config.script.split('.').filter(|s| !s.is_empty()) {
        match cursor.get(segment) {
            Some(next) => cursor = next,
            None => {
                warn!("json path '{}' not present in output", config.script);
                return Vec::new();
            }
        }
    }
    vec![Fact::new(config.property.clone(), cursor.clone())]
}

/// One fact per non-blank line, all sharing set_id 0
fn line(config: &ParserConfig, blob: &str) -> Vec<Fact> {
    blob.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Fact::new(config.property.clone(), l))
        .collect()
}

/// One fact per regex match, set_id = match index
fn regex(config: &ParserConfig, blob: &str) -> Result<Vec<Fact>> {
    let pattern = Regex::new(&config.script)
        .map_err(|e| ParserError::Pattern(config.script.clone(), e.to_string()))?;

    Ok(pattern
        .find_iter(blob.trim())
        .enumerate()
        .map(|(i, m)| Fact::new(config.property.clone(), m.as_str()).with_set_id(i as i64))
        .collect())
}

/// Correlated multi-line extraction from credential-dump output. A
/// `Username` line whose line two below is a non-null `Password` line
/// emits a username/password pair sharing an incrementing set_id.
fn mimikatz(blob: &str) -> Vec<Fact> {
    let lines: Vec<&str> = blob.lines().collect();
    let mut facts = Vec::new();
    let mut set_id = 0;

    for (i, current) in lines.iter().enumerate() {
        if !current.contains("Username") || current.contains("(null)") {
            continue;
        }
        let username = match current.split_once(':') {
            Some((_, v)) => v.trim(),
            None => continue,
        };
        // Machine accounts end in '$' and are never useful credentials.
        if username.is_empty() || username.ends_with('$') {
            continue;
        }
        let password_line = match lines.get(i + 2) {
            Some(l) if l.contains("Password") && !l.contains("(null)") => l,
            _ => continue,
        };
        let password = match password_line.split_once(':') {
            Some((_, v)) => v.trim(),
            None => continue,
        };

        facts.push(Fact::new("host.user.name", username).with_set_id(set_id));
        facts.push(Fact::new("host.user.password", password).with_set_id(set_id));
        set_id += 1;
    }
    facts
}
