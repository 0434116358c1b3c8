//! Declared units of work and their parser specifications

use serde::{Deserialize, Serialize};

/// Parser dispatch type; unknown strings fall back to regex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserType {
    Json,
    Line,
    #[default]
    Regex,
    Mimikatz,
}

impl ParserType {
    /// Parse a type string; unrecognized types dispatch as regex
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "line" => Self::Line,
            "regex" => Self::Regex,
            "mimikatz" => Self::Mimikatz,
            other => {
                tracing::debug!("unrecognized parser type '{}', using regex", other);
                Self::Regex
            }
        }
    }
}

/// How to turn an ability's output into facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Dispatch type
    #[serde(rename = "type", default)]
    pub parser_type: ParserType,
    /// Fact trait the parser emits
    pub property: String,
    /// Path or pattern, meaning depends on the type
    #[serde(default)]
    pub script: String,
}

impl ParserConfig {
    /// Create a new parser configuration
    pub fn new(
        parser_type: ParserType,
        property: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            parser_type,
            property: property.into(),
            script: script.into(),
        }
    }
}

/// A declared unit of work executable by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ability {
    /// Stable ability identifier; abilities sharing an id are platform
    /// variants of the same step
    pub ability_id: String,
    pub name: String,
    /// ATT&CK technique id
    #[serde(default)]
    pub technique_id: String,
    /// Target platform for this variant
    pub platform: String,
    /// Executor this variant requires
    pub executor: String,
    /// Command template; may reference facts as `#{trait}`
    pub command: String,
    /// Cleanup command run in reverse order at operation end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,
    /// Fact traits that must exist before a link is generated
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Parser specifications for this ability's output
    #[serde(default)]
    pub parsers: Vec<ParserConfig>,
    /// Repeatable abilities may run the same command more than once
    #[serde(default)]
    pub repeatable: bool,
}

impl Ability {
    /// Create a new ability variant
    pub fn new(
        ability_id: impl Into<String>,
        name: impl Into<String>,
        platform: impl Into<String>,
        executor: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            ability_id: ability_id.into(),
            name: name.into(),
            technique_id: String::new(),
            platform: platform.into(),
            executor: executor.into(),
            command: command.into(),
            cleanup: None,
            requirements: Vec::new(),
            parsers: Vec::new(),
            repeatable: false,
        }
    }

    /// Set the cleanup command
    pub fn with_cleanup(mut self, cleanup: impl Into<String>) -> Self {
        self.cleanup = Some(cleanup.into());
        self
    }

    /// Add a fact requirement
    pub fn with_requirement(mut self, trait_name: impl Into<String>) -> Self {
        self.requirements.push(trait_name.into());
        self
    }

    /// Attach a parser specification
    pub fn with_parser(mut self, parser: ParserConfig) -> Self {
        self.parsers.push(parser);
        self
    }

    /// Mark the ability repeatable
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }
}
