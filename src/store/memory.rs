use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EventStore, StoreError};
use crate::models::{Event, EventPatch, NewEvent};

/// In-process store with the same contract as the PostgreSQL backend.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    events: HashMap<Uuid, Event>,
    retired: HashSet<Uuid>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by_key(|e| e.start_time);
    events
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, event: NewEvent) -> Result<Event, StoreError> {
        event.validate().map_err(StoreError::Validation)?;

        let mut inner = self.inner.write().await;
        if inner.events.contains_key(&event.id) || inner.retired.contains(&event.id) {
            return Err(StoreError::Conflict { id: event.id });
        }

        let now = Utc::now();
        let stored = Event {
            id: event.id,
            title: event.title,
            description: event.description,
            start_time: event.start_time,
            end_time: event.end_time,
            owner_id: event.owner_id,
            created_at: now,
            updated_at: now,
        };
        inner.events.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, patch: EventPatch) -> Result<Event, StoreError> {
        let mut inner = self.inner.write().await;
        let current = inner
            .events
            .get_mut(&patch.id)
            .ok_or(StoreError::NotFound { id: patch.id })?;

        patch.apply(current, Utc::now());
        Ok(current.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.events.remove(&id).is_none() {
            return Err(StoreError::NotFound { id });
        }
        inner.retired.insert(id);
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read().await;
        let owned = inner
            .events
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(sorted(owned))
    }

    async fn list_all(&self) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.read().await;
        Ok(sorted(inner.events.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn new_event(title: &str, owner: &str, start_hour: u32) -> NewEvent {
        NewEvent::new(title, "", at(start_hour, 0), at(start_hour, 30), owner)
    }

    #[tokio::test]
    async fn test_create_sets_matching_timestamps() {
        let store = InMemoryEventStore::new();
        let draft = new_event("Standup", "u1", 9);
        let id = draft.id;

        let created = store.create(draft).await.unwrap();

        assert_eq!(created.id, id);
        assert!(!created.id.is_nil());
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_title_and_owner() {
        let store = InMemoryEventStore::new();

        let err = store.create(new_event("", "u1", 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = store.create(new_event("Standup", "", 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_duplicate_id_conflicts() {
        let store = InMemoryEventStore::new();
        let draft = new_event("Standup", "u1", 9);

        store.create(draft.clone()).await.unwrap();
        let err = store.create(draft).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_deleted_id_is_never_reused() {
        let store = InMemoryEventStore::new();
        let draft = new_event("Standup", "u1", 9);

        store.create(draft.clone()).await.unwrap();
        store.delete(draft.id).await.unwrap();

        let err = store.create(draft).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_omitted_fields() {
        let store = InMemoryEventStore::new();
        let created = store
            .create(NewEvent::new("Standup", "daily sync", at(9, 0), at(9, 15), "u1"))
            .await
            .unwrap();

        let patch = EventPatch::new(created.id)
            .title(Some("Standup v2".to_string()))
            .description(Some(String::new()));
        let updated = store.update(patch).await.unwrap();

        assert_eq!(updated.title, "Standup v2");
        assert_eq!(updated.description, "daily sync");
        assert_eq!(updated.start_time, created.start_time);
        assert_eq!(updated.end_time, created.end_time);
        assert_eq!(updated.owner_id, created.owner_id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn test_repeated_updates_strictly_increase_updated_at() {
        let store = InMemoryEventStore::new();
        let created = store.create(new_event("Standup", "u1", 9)).await.unwrap();

        let mut last = created.updated_at;
        for _ in 0..5 {
            let updated = store.update(EventPatch::new(created.id)).await.unwrap();
            assert!(updated.updated_at > last);
            last = updated.updated_at;
        }
    }

    #[tokio::test]
    async fn test_update_missing_event_is_not_found() {
        let store = InMemoryEventStore::new();
        let err = store.update(EventPatch::new(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let store = InMemoryEventStore::new();
        let created = store.create(new_event("Standup", "u1", 9)).await.unwrap();

        store.delete(created.id).await.unwrap();
        let err = store.delete(created.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id } if id == created.id));

        let err = store.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_by_owner_filters_and_orders() {
        let store = InMemoryEventStore::new();
        store.create(new_event("Retro", "u1", 15)).await.unwrap();
        store.create(new_event("Standup", "u1", 9)).await.unwrap();
        store.create(new_event("Planning", "u2", 10)).await.unwrap();
        store.create(new_event("Lunch", "u1", 12)).await.unwrap();

        let events = store.list_by_owner("u1").await.unwrap();

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.owner_id == "u1"));
        assert!(events.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        assert_eq!(events[0].title, "Standup");

        assert!(store.list_by_owner("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_orders_across_owners() {
        let store = InMemoryEventStore::new();
        store.create(new_event("Retro", "u1", 15)).await.unwrap();
        store.create(new_event("Planning", "u2", 10)).await.unwrap();

        let events = store.list_all().await.unwrap();
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Planning", "Retro"]);
    }
}
