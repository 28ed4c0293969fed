use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use super::{EventStore, StoreError};
use crate::models::{Event, EventPatch, NewEvent};

// ============================================================================
// PostgreSQL Event Store
// ============================================================================
//
// Timestamps come from the database clock: `created_at`/`updated_at` default
// to NOW() on insert, and every update moves `updated_at` strictly forward.
//
// Deleted ids are recorded in `retired_event_ids` so they are never handed
// out again.
//
// ============================================================================

static MIGRATIONS: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const EVENT_COLUMNS: &str =
    "id, title, description, start_time, end_time, owner_id, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Open a connection pool and verify the database is reachable.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(dsn)
            .await
            .map_err(|e| StoreError::database("failed to connect to postgres", e))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATIONS
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::database("failed to apply migrations", e))?;

        tracing::info!("✅ Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }

    async fn find(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");

        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database("failed to load event", e))
    }
}

fn map_insert_error(id: Uuid, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict { id },
        sqlx::Error::Database(db) if db.is_check_violation() => {
            StoreError::Validation(db.message().to_string())
        }
        _ => StoreError::database("failed to insert event", err),
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn create(&self, event: NewEvent) -> Result<Event, StoreError> {
        event.validate().map_err(StoreError::Validation)?;

        // The NOT EXISTS guard turns a retired id into "no row inserted"
        let query = format!(
            "INSERT INTO events (id, title, description, start_time, end_time, owner_id)
             SELECT $1, $2, $3, $4, $5, $6
             WHERE NOT EXISTS (SELECT 1 FROM retired_event_ids WHERE id = $1)
             RETURNING {EVENT_COLUMNS}"
        );

        let created = sqlx::query_as::<_, Event>(&query)
            .bind(event.id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.start_time)
            .bind(event.end_time)
            .bind(&event.owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_insert_error(event.id, e))?
            .ok_or(StoreError::Conflict { id: event.id })?;

        tracing::debug!(event_id = %created.id, owner_id = %created.owner_id, "Inserted event");
        Ok(created)
    }

    async fn update(&self, patch: EventPatch) -> Result<Event, StoreError> {
        let mut merged = self
            .find(patch.id)
            .await?
            .ok_or(StoreError::NotFound { id: patch.id })?;

        patch.merge_into(&mut merged);

        let query = format!(
            "UPDATE events
             SET title       = $1,
                 description = $2,
                 start_time  = $3,
                 end_time    = $4,
                 owner_id    = $5,
                 updated_at  = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
             WHERE id = $6
             RETURNING {EVENT_COLUMNS}"
        );

        let updated = sqlx::query_as::<_, Event>(&query)
            .bind(&merged.title)
            .bind(&merged.description)
            .bind(merged.start_time)
            .bind(merged.end_time)
            .bind(&merged.owner_id)
            .bind(patch.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database("failed to update event", e))?
            // Deleted between the read and the write
            .ok_or(StoreError::NotFound { id: patch.id })?;

        tracing::debug!(event_id = %updated.id, "Updated event");
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("failed to begin transaction", e))?;

        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("failed to delete event", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id });
        }

        sqlx::query("INSERT INTO retired_event_ids (id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("failed to retire event id", e))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::database("failed to commit delete", e))?;

        tracing::debug!(event_id = %id, "Deleted event");
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Event>, StoreError> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE owner_id = $1 ORDER BY start_time"
        );

        sqlx::query_as::<_, Event>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("failed to list events by owner", e))
    }

    async fn list_all(&self) -> Result<Vec<Event>, StoreError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY start_time");

        sqlx::query_as::<_, Event>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("failed to list events", e))
    }
}

// Run with `cargo test -- --ignored`; each test starts its own PostgreSQL
// container through testcontainers, so Docker must be running.
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, ImageExt};
    use testcontainers_modules::postgres::Postgres;

    async fn create_store() -> (PgEventStore, ContainerAsync<Postgres>) {
        let container = Postgres::default()
            .with_tag("17-alpine")
            .start()
            .await
            .expect("failed to start PostgreSQL container");

        let host = container.get_host().await.expect("failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("failed to get port");

        // Default user/password/db from testcontainers-modules
        let dsn = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let store = PgEventStore::connect(&dsn, 2).await.expect("failed to connect");
        store.migrate().await.expect("failed to migrate");

        // Container must outlive the store
        (store, container)
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn meeting(title: &str, owner: &str, h: u32) -> NewEvent {
        NewEvent::new(title, "notes", at(h), at(h + 1), owner)
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_create_sets_matching_timestamps() {
        let (store, _container) = create_store().await;

        let created = store.create(meeting("Standup", "u1", 9)).await.unwrap();

        assert_eq!(created.title, "Standup");
        assert_eq!(created.description, "notes");
        assert_eq!(created.start_time, at(9));
        assert_eq!(created.end_time, at(10));
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_create_rejects_empty_title() {
        let (store, _container) = create_store().await;

        let err = store.create(meeting("", "u1", 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_partial_update_keeps_omitted_fields() {
        let (store, _container) = create_store().await;
        let created = store.create(meeting("Standup", "u1", 9)).await.unwrap();

        let patch = EventPatch::new(created.id).title(Some("Retro".to_string()));
        let first = store.update(patch).await.unwrap();

        assert_eq!(first.title, "Retro");
        assert_eq!(first.description, created.description);
        assert_eq!(first.start_time, created.start_time);
        assert_eq!(first.end_time, created.end_time);
        assert_eq!(first.owner_id, created.owner_id);
        assert_eq!(first.created_at, created.created_at);
        assert!(first.updated_at > created.updated_at);

        // An empty patch still moves updated_at forward
        let second = store.update(EventPatch::new(created.id)).await.unwrap();
        assert_eq!(second.title, "Retro");
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_update_missing_event_is_not_found() {
        let (store, _container) = create_store().await;
        let id = Uuid::new_v4();

        let err = store.update(EventPatch::new(id)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: missing } if missing == id));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_delete_twice_is_not_found_and_id_is_retired() {
        let (store, _container) = create_store().await;
        let event = meeting("Standup", "u1", 9);
        let id = event.id;
        store.create(event.clone()).await.unwrap();

        store.delete(id).await.unwrap();
        let err = store.delete(id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        // Recreating a deleted id is refused
        let err = store.create(event).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id: retired } if retired == id));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_duplicate_id_is_conflict() {
        let (store, _container) = create_store().await;
        let event = meeting("Standup", "u1", 9);
        store.create(event.clone()).await.unwrap();

        let err = store.create(event).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_listings_are_ordered_by_start_time() {
        let (store, _container) = create_store().await;
        store.create(meeting("Late", "u1", 15)).await.unwrap();
        store.create(meeting("Other", "u2", 11)).await.unwrap();
        store.create(meeting("Early", "u1", 8)).await.unwrap();

        let titles = |events: Vec<Event>| events.into_iter().map(|e| e.title).collect::<Vec<_>>();

        assert_eq!(
            titles(store.list_by_owner("u1").await.unwrap()),
            vec!["Early", "Late"]
        );
        assert_eq!(
            titles(store.list_all().await.unwrap()),
            vec!["Early", "Other", "Late"]
        );
        assert!(store.list_by_owner("nobody").await.unwrap().is_empty());
    }
}
