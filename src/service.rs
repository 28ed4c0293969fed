use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Event, EventPatch, NewEvent};
use crate::store::{EventStore, StoreError};

// ============================================================================
// Event Service
// ============================================================================
//
// Orchestrates: API → Service → Store
//
// Pass-through today; business rules that span more than one store call
// belong here rather than in the handlers.
//
// ============================================================================

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        self.store.create(event).await
    }

    pub async fn update_event(&self, patch: EventPatch) -> Result<Event, StoreError> {
        self.store.update(patch).await
    }

    pub async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete(id).await
    }

    pub async fn list_events(&self, owner_id: &str) -> Result<Vec<Event>, StoreError> {
        self.store.list_by_owner(owner_id).await
    }
}
