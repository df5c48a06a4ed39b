//! Persistent entity index
//!
//! Observations are merged into one deduplicated list stored under
//! `entities:index`. Merging sums per-page occurrence counts, and importance
//! never decreases for an entity that stays in the index.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::Result;
use crate::storage::{KeyValueStore, get_json, set_json};

use super::dedup::{deduplicate, normalize_name};
use super::types::EntityInfo;

const INDEX_KEY: &str = "entities:index";

/// Occurrence count at which the occurrence factor reaches ~63%
const OCCURRENCE_SCALE: f32 = 5.0;
/// Number of distinct pages that saturates the spread factor
const SPREAD_SATURATION: usize = 5;

/// Importance derived from confidence, frequency and spread across pages
pub fn compute_importance(entity: &EntityInfo) -> f32 {
    let occurrences = entity.total_occurrences() as f32;
    let frequency = 1.0 - (-occurrences / OCCURRENCE_SCALE).exp();
    let spread = entity.contexts.len().min(SPREAD_SATURATION) as f32 / SPREAD_SATURATION as f32;
    (entity.confidence * 0.5 + frequency * 0.3 + spread * 0.2).clamp(0.0, 1.0)
}

/// Tracks entities across browsing contexts
pub struct EntityTracker {
    kv: Arc<dyn KeyValueStore>,
    max_tracked: usize,
    write_lock: Mutex<()>,
}

impl EntityTracker {
    pub fn new(kv: Arc<dyn KeyValueStore>, max_tracked: usize) -> Self {
        Self {
            kv,
            max_tracked: max_tracked.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Every tracked entity, most important first
    pub async fn all(&self) -> Result<Vec<EntityInfo>> {
        Ok(get_json::<Vec<EntityInfo>>(self.kv.as_ref(), INDEX_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Merge new observations into the index, returning the updated entries
    pub async fn observe(&self, observed: Vec<EntityInfo>) -> Result<Vec<EntityInfo>> {
        if observed.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let observed_names: Vec<String> = observed.iter().map(|e| normalize_name(&e.name)).collect();

        let mut merged = self.all().await?;
        merged.extend(observed);
        let mut merged = deduplicate(merged);

        for entity in &mut merged {
            entity.importance = entity.importance.max(compute_importance(entity));
        }
        sort_by_importance(&mut merged);

        if merged.len() > self.max_tracked {
            let evicted = merged.len() - self.max_tracked;
            merged.truncate(self.max_tracked);
            info!("Evicted {} least important entities", evicted);
        }

        set_json(self.kv.as_ref(), INDEX_KEY, &merged).await?;
        debug!("Entity index now holds {} entities", merged.len());

        Ok(merged
            .into_iter()
            .filter(|e| observed_names.contains(&normalize_name(&e.name)))
            .collect())
    }

    /// Look an entity up by name or alias
    pub async fn get(&self, name: &str) -> Result<Option<EntityInfo>> {
        let wanted = normalize_name(name);
        Ok(self.all().await?.into_iter().find(|e| {
            normalize_name(&e.name) == wanted || e.aliases.iter().any(|a| normalize_name(a) == wanted)
        }))
    }

    /// Most important entities, optionally restricted to one domain
    pub async fn top(&self, domain: Option<&str>, limit: usize) -> Result<Vec<EntityInfo>> {
        let mut entities: Vec<EntityInfo> = self
            .all()
            .await?
            .into_iter()
            .filter(|e| domain.is_none_or(|d| e.seen_on_domain(d)))
            .collect();
        sort_by_importance(&mut entities);
        entities.truncate(limit);
        Ok(entities)
    }

    pub async fn remove(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let wanted = normalize_name(name);
        let mut entities = self.all().await?;
        let before = entities.len();
        entities.retain(|e| normalize_name(&e.name) != wanted);
        if entities.len() == before {
            return Ok(false);
        }
        set_json(self.kv.as_ref(), INDEX_KEY, &entities).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(INDEX_KEY).await?;
        Ok(())
    }
}

fn sort_by_importance(entities: &mut [EntityInfo]) {
    entities.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.last_seen().cmp(&a.last_seen()))
    });
}
