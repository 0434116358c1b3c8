//! Discovered facts with provenance

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A discovered (trait, value) pair with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Fact trait, e.g. "host.user.name"
    #[serde(rename = "trait")]
    pub trait_name: String,
    /// Discovered value
    pub value: Value,
    /// Confidence score; grows when the fact leads to new facts
    #[serde(default = "default_score")]
    pub score: i64,
    /// Correlation key grouping facts extracted together
    #[serde(default)]
    pub set_id: i64,
    /// Originating source id (operation or seed source)
    #[serde(default)]
    pub source: String,
    /// Link that produced this fact, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<Uuid>,
    /// Paw of the agent that collected it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<String>,
    /// Excluded from future planning without being deleted
    #[serde(default)]
    pub blacklisted: bool,
}

fn default_score() -> i64 {
    1
}

impl Fact {
    /// Create a new fact with default provenance
    pub fn new(trait_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            trait_name: trait_name.into(),
            value: value.into(),
            score: 1,
            set_id: 0,
            source: String::new(),
            link_id: None,
            collected_by: None,
            blacklisted: false,
        }
    }

    /// Set the correlation key
    pub fn with_set_id(mut self, set_id: i64) -> Self {
        self.set_id = set_id;
        self
    }

    /// Set the originating source id
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the producing link and collecting agent
    pub fn collected(mut self, link_id: Uuid, paw: impl Into<String>) -> Self {
        self.link_id = Some(link_id);
        self.collected_by = Some(paw.into());
        self
    }

    /// The fact's value rendered as a command substitution string
    pub fn value_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Same trait and value as another fact
    pub fn same_as(&self, trait_name: &str, value: &Value) -> bool {
        self.trait_name == trait_name && &self.value == value
    }
}
