//! Entity extraction strategies
//!
//! - [`PatternEntityExtractor`]: regex matching against known entity classes
//! - [`LlmEntityExtractor`]: asks a model for structured JSON, falling back to
//!   the pattern extractor when the model fails or answers with garbage

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{ContextError, Result};
use crate::llm::{CompletionRequest, LanguageModel, PromptMessage};

use super::dedup::{deduplicate, normalize_name};
use super::types::{
    EntityContext, EntityInfo, EntitySource, EntityType, ExtractionResult, ExtractionStrategy,
    Relationship,
};

/// Configuration for entity extraction and tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub enabled: bool,
    /// Prefer the LLM strategy when the model supports structured output
    pub use_llm: bool,
    /// LLM results below this confidence are discarded
    pub confidence_threshold: f32,
    /// Pattern results below this confidence are discarded
    pub pattern_min_confidence: f32,
    /// Characters of input sent to the model
    pub max_input_chars: usize,
    /// Entities kept in the persistent index
    pub max_tracked: usize,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_llm: true,
            confidence_threshold: 0.6,
            pattern_min_confidence: 0.5,
            max_input_chars: 4000,
            max_tracked: 500,
        }
    }
}

/// Trait for entity extraction strategies
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract deduplicated entities from `text`
    async fn extract(&self, text: &str, source: &EntitySource) -> Result<ExtractionResult>;
}

// ============================================================================
// PatternEntityExtractor
// ============================================================================

/// Names distinctive enough to match in any case
const KNOWN_TECHNOLOGIES: &[&str] = &[
    "Python", "JavaScript", "TypeScript", "Kotlin", "Golang", "PHP", "Haskell", "Node.js",
    "Django", "Kubernetes", "Terraform", "PostgreSQL", "MySQL", "SQLite", "MongoDB", "Redis",
    "Kafka", "GraphQL", "WebAssembly", "Linux", "GitHub", "Tokio", "TensorFlow", "PyTorch",
    "OpenAI", "ChatGPT", "LLaMA",
];

/// Names that are also ordinary words; only the canonical spelling counts
const CASED_TECHNOLOGIES: &[&str] = &[
    "Rust", "Java", "Swift", "Ruby", "Elixir", "React", "Vue", "Angular", "Svelte", "Deno",
    "Flask", "Rails", "Docker", "Git", "Gemini", "Claude",
];

static KNOWN_TECH_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = |names: &[&str]| {
        names
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|")
    };
    Regex::new(&format!(
        r"\b(?:(?i:{})|{})\b",
        alternatives(KNOWN_TECHNOLOGIES),
        alternatives(CASED_TECHNOLOGIES)
    ))
    .expect("valid regex")
});

static PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Dr|Mr|Mrs|Ms|Prof)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})")
        .expect("valid regex")
});

static ORGANIZATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z&]+\s+){0,3}[A-Z][A-Za-z&]+\s+(?:Inc|Corp|Corporation|Ltd|LLC|GmbH|Foundation|University|Institute|Labs))\b",
    )
    .expect("valid regex")
});

static CAMEL_CASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b").expect("valid regex"));

static ACRONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,6}\b").expect("valid regex"));

const ACRONYM_STOPWORDS: &[&str] = &["OK", "AM", "PM", "TV", "ID", "FAQ", "TODO", "NOTE"];

/// Regex-based extractor; needs no model
#[derive(Debug, Clone)]
pub struct PatternEntityExtractor {
    min_confidence: f32,
}

impl PatternEntityExtractor {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    fn canonical_technology(matched: &str) -> String {
        KNOWN_TECHNOLOGIES
            .iter()
            .chain(CASED_TECHNOLOGIES)
            .find(|t| t.eq_ignore_ascii_case(matched))
            .map(|t| t.to_string())
            .unwrap_or_else(|| matched.to_string())
    }

    /// Run every pattern; returns `(name, type, confidence, alias)` hits
    ///
    /// CamelCase and acronym hits inside a span already claimed by a
    /// stronger pattern are skipped so one mention is counted once.
    fn scan(text: &str) -> Vec<(String, EntityType, f32, Option<String>)> {
        let mut hits = Vec::new();
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let overlaps = |claimed: &[(usize, usize)], start: usize, end: usize| {
            claimed.iter().any(|&(s, e)| start < e && s < end)
        };

        for m in KNOWN_TECH_RE.find_iter(text) {
            claimed.push((m.start(), m.end()));
            hits.push((
                Self::canonical_technology(m.as_str()),
                EntityType::Technology,
                0.8,
                None,
            ));
        }

        for caps in PERSON_RE.captures_iter(text) {
            let full = &caps[0];
            if let Some(m) = caps.get(0) {
                claimed.push((m.start(), m.end()));
            }
            hits.push((
                caps[2].to_string(),
                EntityType::Person,
                0.75,
                Some(full.trim().to_string()),
            ));
        }

        for caps in ORGANIZATION_RE.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                claimed.push((m.start(), m.end()));
            }
            hits.push((caps[1].to_string(), EntityType::Organization, 0.7, None));
        }

        for m in CAMEL_CASE_RE.find_iter(text) {
            if overlaps(&claimed, m.start(), m.end()) {
                continue;
            }
            hits.push((m.as_str().to_string(), EntityType::Technology, 0.6, None));
        }

        for m in ACRONYM_RE.find_iter(text) {
            if overlaps(&claimed, m.start(), m.end()) || ACRONYM_STOPWORDS.contains(&m.as_str()) {
                continue;
            }
            hits.push((m.as_str().to_string(), EntityType::Concept, 0.5, None));
        }

        hits
    }

    /// Synchronous core, shared with the LLM fallback path
    pub fn extract_sync(&self, text: &str, source: &EntitySource) -> ExtractionResult {
        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut entities = Vec::new();

        for (name, entity_type, confidence, alias) in Self::scan(text) {
            if confidence < self.min_confidence {
                continue;
            }
            *counts.entry(normalize_name(&name)).or_insert(0) += 1;
            let mut entity = EntityInfo::new(name, entity_type, confidence);
            if let Some(alias) = alias {
                entity = entity.with_alias(alias);
            }
            entities.push(entity);
        }

        let mut entities = deduplicate(entities);
        for entity in &mut entities {
            let occurrences = counts
                .get(&normalize_name(&entity.name))
                .copied()
                .unwrap_or(1);
            entity.contexts.push(EntityContext::new(source, occurrences));
        }

        debug!(
            "Pattern extraction found {} entities on {}",
            entities.len(),
            source.domain
        );

        ExtractionResult {
            entities,
            relationships: Vec::new(),
            strategy: ExtractionStrategy::Pattern,
            fallback_reason: None,
        }
    }
}

impl Default for PatternEntityExtractor {
    fn default() -> Self {
        Self::new(EntityConfig::default().pattern_min_confidence)
    }
}

#[async_trait]
impl EntityExtractor for PatternEntityExtractor {
    async fn extract(&self, text: &str, source: &EntitySource) -> Result<ExtractionResult> {
        Ok(self.extract_sync(text, source))
    }
}

// ============================================================================
// LlmEntityExtractor
// ============================================================================

const EXTRACTION_PROMPT: &str = r#"Extract the named entities from the user's text.
Answer with JSON only, in this shape:
{"entities":[{"name":"...","type":"person|organization|location|technology|concept|product|event|other","confidence":0.0,"aliases":["..."]}],
 "relationships":[{"source":"...","target":"...","relation":"...","confidence":0.0}]}
Confidence is between 0 and 1. Do not invent entities that are not in the text."#;

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Pull the JSON object out of a model answer (code fences, chatter)
fn extract_json_object(answer: &str) -> Option<&str> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    (end > start).then(|| &answer[start..=end])
}

/// Extractor that asks a [`LanguageModel`] for structured entities
pub struct LlmEntityExtractor {
    model: Arc<dyn LanguageModel>,
    fallback: PatternEntityExtractor,
    confidence_threshold: f32,
    max_input_chars: usize,
}

impl LlmEntityExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, config: &EntityConfig) -> Self {
        Self {
            model,
            fallback: PatternEntityExtractor::new(config.pattern_min_confidence),
            confidence_threshold: config.confidence_threshold,
            max_input_chars: config.max_input_chars,
        }
    }

    fn parse(&self, answer: &str, text: &str, source: &EntitySource) -> Result<ExtractionResult> {
        let json = extract_json_object(answer).ok_or_else(|| {
            ContextError::Validation("model answer contains no JSON object".to_string())
        })?;
        let raw: RawExtraction = serde_json::from_str(json)?;

        let haystack = text.to_lowercase();
        let entities: Vec<EntityInfo> = raw
            .entities
            .into_iter()
            .filter(|e| e.confidence >= self.confidence_threshold && !e.name.trim().is_empty())
            .map(|e| {
                let occurrences = haystack.matches(&e.name.trim().to_lowercase()).count().max(1);
                let mut entity = EntityInfo::new(
                    e.name,
                    EntityType::parse_lenient(&e.entity_type),
                    e.confidence,
                )
                .with_context(source, occurrences as u32);
                entity.aliases = e.aliases;
                entity
            })
            .collect();
        let entities = deduplicate(entities);

        let known = |name: &str| {
            let name = normalize_name(name);
            entities.iter().any(|e| normalize_name(&e.name) == name)
        };
        let relationships = raw
            .relationships
            .into_iter()
            .filter(|r| {
                r.confidence >= self.confidence_threshold && known(&r.source) && known(&r.target)
            })
            .collect();

        Ok(ExtractionResult {
            entities,
            relationships,
            strategy: ExtractionStrategy::Llm,
            fallback_reason: None,
        })
    }

    fn fall_back(&self, text: &str, source: &EntitySource, reason: String) -> ExtractionResult {
        warn!("LLM entity extraction failed, using patterns: {}", reason);
        let mut result = self.fallback.extract_sync(text, source);
        result.fallback_reason = Some(reason);
        result
    }
}

#[async_trait]
impl EntityExtractor for LlmEntityExtractor {
    async fn extract(&self, text: &str, source: &EntitySource) -> Result<ExtractionResult> {
        let input: String = text.chars().take(self.max_input_chars).collect();
        let request = CompletionRequest::new(vec![
            PromptMessage::system(EXTRACTION_PROMPT),
            PromptMessage::user(input),
        ])
        .with_temperature(0.0);

        let answer = match self.model.complete(request).await {
            Ok(answer) => answer,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Ok(self.fall_back(text, source, e.to_string())),
        };

        match self.parse(&answer, text, source) {
            Ok(result) => {
                debug!(
                    "LLM extraction found {} entities and {} relationships",
                    result.entities.len(),
                    result.relationships.len()
                );
                Ok(result)
            },
            Err(e) => Ok(self.fall_back(text, source, e.to_string())),
        }
    }
}

/// Pick the extraction strategy the available model supports
pub fn select_extractor(
    model: Option<Arc<dyn LanguageModel>>,
    config: &EntityConfig,
) -> Arc<dyn EntityExtractor> {
    match model {
        Some(model) if config.use_llm && model.capabilities().structured_output => {
            info!("Using LLM entity extraction");
            Arc::new(LlmEntityExtractor::new(model, config))
        },
        _ => {
            info!("Using pattern entity extraction");
            Arc::new(PatternEntityExtractor::new(config.pattern_min_confidence))
        },
    }
}
