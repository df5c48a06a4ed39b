//! Entity data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conversation::domain_key;

/// Kind of named entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Technology,
    Concept,
    Product,
    Event,
    Other,
}

impl EntityType {
    /// Map the loose labels models tend to produce onto a type
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "person" | "people" | "author" => EntityType::Person,
            "organization" | "organisation" | "org" | "company" => EntityType::Organization,
            "location" | "place" | "city" | "country" => EntityType::Location,
            "technology" | "tool" | "software" | "framework" | "library" | "language" => {
                EntityType::Technology
            },
            "concept" | "idea" | "topic" => EntityType::Concept,
            "product" => EntityType::Product,
            "event" => EntityType::Event,
            _ => EntityType::Other,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Technology => "technology",
            EntityType::Concept => "concept",
            EntityType::Product => "product",
            EntityType::Event => "event",
            EntityType::Other => "other",
        };
        f.write_str(label)
    }
}

/// Where a piece of text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySource {
    pub url: String,
    pub domain: String,
}

impl EntitySource {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let domain = domain_key(&url);
        Self { url, domain }
    }
}

/// Occurrences of an entity on one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityContext {
    pub url: String,
    pub domain: String,
    pub occurrences: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl EntityContext {
    pub fn new(source: &EntitySource, occurrences: u32) -> Self {
        let now = Utc::now();
        Self {
            url: source.url.clone(),
            domain: source.domain.clone(),
            occurrences,
            first_seen: now,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f32,
    #[serde(default)]
    pub importance: f32,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub contexts: Vec<EntityContext>,
}

impl EntityInfo {
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f32) -> Self {
        Self {
            name: name.into(),
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            importance: 0.0,
            aliases: Vec::new(),
            contexts: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_context(mut self, source: &EntitySource, occurrences: u32) -> Self {
        self.contexts.push(EntityContext::new(source, occurrences));
        self
    }

    pub fn total_occurrences(&self) -> u32 {
        self.contexts.iter().map(|c| c.occurrences).sum()
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.contexts.iter().map(|c| c.last_seen).max()
    }

    pub fn seen_on_domain(&self, domain: &str) -> bool {
        self.contexts.iter().any(|c| c.domain == domain)
    }
}

/// Directed relation between two extracted entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub confidence: f32,
}

/// Which strategy produced an [`ExtractionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    Llm,
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<EntityInfo>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub strategy: ExtractionStrategy,
    /// Set when the LLM path failed and the pattern path answered instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}
