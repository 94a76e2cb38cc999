use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Interactions,
    Metadata,
    Pages,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Interactions => write!(f, "interactions"),
            SourceKind::Metadata => write!(f, "metadata"),
            SourceKind::Pages => write!(f, "pages"),
        }
    }
}

/// How raw identifiers from the entity list are normalized before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierPolicy {
    #[default]
    Uppercase,
    Preserve,
}

/// Canonical entity key. Used verbatim in artifact file names, so only
/// characters that are safe in a path component are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn normalize(value: &str, policy: IdentifierPolicy) -> Result<Self, HarvestError> {
        let trimmed = value.trim();
        let normalized = match policy {
            IdentifierPolicy::Uppercase => trimmed.to_uppercase(),
            IdentifierPolicy::Preserve => trimmed.to_string(),
        };
        let mut chars = normalized.chars();
        let is_valid = chars
            .next()
            .map(|first| first.is_ascii_alphanumeric())
            .unwrap_or(false)
            && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
        if !is_valid {
            return Err(HarvestError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identifier {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::normalize(value, IdentifierPolicy::Uppercase)
    }
}

/// Raw content retrieved for one identifier (or the reason there is none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub identifier: Identifier,
    pub raw_content: Option<Vec<u8>>,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub attempts: u32,
}

impl FetchResult {
    pub fn success(identifier: Identifier, content: Vec<u8>, attempts: u32) -> Self {
        Self {
            identifier,
            raw_content: Some(content),
            succeeded: true,
            failure_reason: None,
            attempts,
        }
    }

    pub fn failure(identifier: Identifier, reason: String, attempts: u32) -> Self {
        Self {
            identifier,
            raw_content: None,
            succeeded: false,
            failure_reason: Some(reason),
            attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    /// Authoritative content that declares insufficient underlying data.
    Warning(String),
    Invalid(String),
}

impl ValidationOutcome {
    pub fn is_usable(&self) -> bool {
        !matches!(self, ValidationOutcome::Invalid(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Warning(reason) | ValidationOutcome::Invalid(reason) => {
                Some(reason)
            }
        }
    }
}

/// Partial structured record. Missing sections are simply absent from
/// `fields`; `error` may coexist with extracted fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    #[serde(skip)]
    pub identifier: Identifier,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedRecord {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            fields: Map::new(),
            error: None,
        }
    }

    pub fn from_fields(identifier: Identifier, fields: Map<String, Value>) -> Self {
        Self {
            identifier,
            fields,
            error: None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn append_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error = match self.error.take() {
            Some(existing) if existing != message => Some(format!("{existing}; {message}")),
            Some(existing) => Some(existing),
            None => Some(message),
        };
    }
}

/// One filtered interaction row, serialized with the published column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    #[serde(rename = "Official symbol for Interactor A")]
    pub symbol_a: String,
    #[serde(rename = "Official symbol for Interactor B")]
    pub symbol_b: String,
    #[serde(rename = "Synonyms/Aliases for Interactor A")]
    pub synonyms_a: String,
    #[serde(rename = "Synonyms/Aliases for Interactor B")]
    pub synonyms_b: String,
    #[serde(rename = "Quantitative Score")]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTable {
    pub identifier: Identifier,
    pub rows: Vec<InteractionRow>,
}

/// Final output of one identifier's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Record(ExtractedRecord),
    Table(InteractionTable),
}

impl Artifact {
    pub fn identifier(&self) -> &Identifier {
        match self {
            Artifact::Record(record) => &record.identifier,
            Artifact::Table(table) => &table.identifier,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Artifact::Record(record) => record.error.as_deref(),
            Artifact::Table(_) => None,
        }
    }

    /// Attaches a caveat to the artifact. Tables have no error column, so
    /// the caveat is only carried by records.
    pub fn note(&mut self, message: &str) {
        if let Artifact::Record(record) = self {
            record.append_error(message);
        }
    }
}
