use anyhow::Result;
use chrono::{DateTime, Utc};
use pagewise_core::{
    ContextService, ContextWindowManager, ConversationStore, EntityExtractor, EntityTracker,
    EventBus, ExtractiveSummarizer, InMemoryKeyValueStore, JsonFileStore, KeyValueStore,
    NotificationManager, SaveManager, select_extractor,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use super::config::{Settings, StorageBackend};

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ContextService>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub tracker: Arc<EntityTracker>,
    pub save: Arc<SaveManager>,
    pub notifications: NotificationManager,
    pub events: EventBus,
    pub backend: StorageBackend,
    pub started_at: DateTime<Utc>,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub async fn build(settings: &Settings) -> Result<Self> {
        let kv = open_storage(settings).await?;

        let notifications = NotificationManager::new(settings.notifications.clone());
        let events = EventBus::default();

        let store = Arc::new(ConversationStore::new(
            kv.clone(),
            settings.conversation.clone(),
        ));
        store.clone().spawn_cleanup();

        let tracker = Arc::new(EntityTracker::new(
            kv.clone(),
            settings.entities.max_tracked,
        ));
        // Provider clients live in the extension; the service runs model-free
        let extractor = select_extractor(None, &settings.entities);

        let mut window = ContextWindowManager::new(
            store,
            Arc::new(ExtractiveSummarizer::new()),
            settings.context.clone(),
        );
        if settings.entities.enabled {
            window = window.with_entities(extractor.clone(), tracker.clone());
        }

        let service = Arc::new(ContextService::new(
            Arc::new(window),
            notifications.clone(),
            events.clone(),
        ));
        let save = Arc::new(
            SaveManager::new(kv, settings.save.clone())
                .with_notifications(notifications.clone())
                .with_events(events.clone()),
        );

        Ok(Self {
            service,
            extractor,
            tracker,
            save,
            notifications,
            events,
            backend: settings.storage.backend,
            started_at: Utc::now(),
            shutdown: Arc::new(watch::channel(false).0),
        })
    }
}

async fn open_storage(settings: &Settings) -> Result<Arc<dyn KeyValueStore>> {
    let storage = &settings.storage;
    let kv: Arc<dyn KeyValueStore> = match storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            let store = InMemoryKeyValueStore::new();
            Arc::new(match storage.quota_bytes {
                Some(quota) => store.with_quota(quota),
                None => store,
            })
        },
        StorageBackend::File => {
            info!("Using JSON file storage at {}", storage.path);
            let store = JsonFileStore::open(&storage.path).await?;
            Arc::new(match storage.quota_bytes {
                Some(quota) => store.with_quota(quota),
                None => store,
            })
        },
    };
    Ok(kv)
}
