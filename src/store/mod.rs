// ============================================================================
// Event Store - Durable event records
// ============================================================================
//
// The store is the single source of truth. HTTP handlers write through it
// (via EventService) and the replication producer reads full snapshots from
// it. No application-level locking is added on top of the backend.
//
// ============================================================================

mod error;
#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Event, EventPatch, NewEvent};

pub use error::StoreError;
pub use postgres::PgEventStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event. The id is assigned by the caller.
    async fn create(&self, event: NewEvent) -> Result<Event, StoreError>;

    /// Merge the supplied fields of `patch` into the stored record.
    async fn update(&self, patch: EventPatch) -> Result<Event, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Events of one owner, ascending by start time.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Event>, StoreError>;

    /// Every event, ascending by start time.
    async fn list_all(&self) -> Result<Vec<Event>, StoreError>;
}
