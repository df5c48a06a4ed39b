//! Entity deduplication
//!
//! Entities are merged by normalized name (case-insensitive, whitespace
//! collapsed). The output is canonical: aliases sorted and unique, contexts
//! merged per URL and sorted, so running it twice changes nothing.

use std::collections::HashMap;

use super::types::{EntityContext, EntityInfo};

/// Lowercased, trimmed name with inner whitespace collapsed
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Merge entities sharing a normalized name
///
/// Keeps first-seen order and display name. Confidence and importance take
/// the maximum, aliases and contexts are unioned, and the type comes from the
/// most confident duplicate.
pub fn deduplicate(entities: Vec<EntityInfo>) -> Vec<EntityInfo> {
    let mut order: Vec<EntityInfo> = Vec::with_capacity(entities.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for entity in entities {
        let key = normalize_name(&entity.name);
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(&pos) => merge_into(&mut order[pos], entity),
            None => {
                index.insert(key, order.len());
                order.push(entity);
            },
        }
    }

    order.into_iter().map(canonicalize).collect()
}

fn merge_into(target: &mut EntityInfo, other: EntityInfo) {
    if other.confidence > target.confidence {
        target.entity_type = other.entity_type;
        target.confidence = other.confidence;
    }
    target.importance = target.importance.max(other.importance);

    // A differently spelled duplicate becomes an alias
    if other.name.trim() != target.name.trim() {
        target.aliases.push(other.name);
    }
    target.aliases.extend(other.aliases);
    target.contexts.extend(other.contexts);
}

fn canonicalize(mut entity: EntityInfo) -> EntityInfo {
    entity.name = entity.name.trim().to_string();
    let own = normalize_name(&entity.name);

    let mut aliases: Vec<String> = Vec::new();
    for alias in entity.aliases.drain(..) {
        let alias = alias.trim().to_string();
        let normalized = normalize_name(&alias);
        if normalized.is_empty() || normalized == own {
            continue;
        }
        if !aliases.iter().any(|a| normalize_name(a) == normalized) {
            aliases.push(alias);
        }
    }
    aliases.sort_by_key(|a| normalize_name(a));
    entity.aliases = aliases;

    let mut contexts: Vec<EntityContext> = Vec::new();
    for ctx in entity.contexts.drain(..) {
        match contexts.iter_mut().find(|c| c.url == ctx.url) {
            Some(existing) => {
                existing.occurrences += ctx.occurrences;
                existing.first_seen = existing.first_seen.min(ctx.first_seen);
                existing.last_seen = existing.last_seen.max(ctx.last_seen);
            },
            None => contexts.push(ctx),
        }
    }
    contexts.sort_by(|a, b| a.url.cmp(&b.url));
    entity.contexts = contexts;

    entity
}
