use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================

/// A persisted calendar event
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event that has not been stored yet.
///
/// The id is assigned here, before the store sees it.
#[derive(Clone, Debug)]
pub struct NewEvent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub owner_id: String,
}

impl NewEvent {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            start_time,
            end_time,
            owner_id: owner_id.into(),
        }
    }

    /// Title and owner must be non-empty. Time ordering is not checked.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("title is required".to_string());
        }
        if self.owner_id.is_empty() {
            return Err("owner_id is required".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Partial Update
// ============================================================================
//
// A field is "supplied" when it is present AND non-empty. Empty strings are
// folded into `None` when the patch is built, so callers cannot clear a
// field back to "" once it has a value.
//
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct EventPatch {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub owner_id: Option<String>,
}

impl EventPatch {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = supplied(title);
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = supplied(description);
        self
    }

    pub fn start_time(mut self, start_time: Option<DateTime<Utc>>) -> Self {
        self.start_time = start_time.filter(|t| !is_zero_time(t));
        self
    }

    pub fn end_time(mut self, end_time: Option<DateTime<Utc>>) -> Self {
        self.end_time = end_time.filter(|t| !is_zero_time(t));
        self
    }

    pub fn owner_id(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = supplied(owner_id);
        self
    }

    /// Overwrite the supplied fields of `current`, leaving the rest as they are.
    ///
    /// `updated_at` is bumped to `now`, or one microsecond past the previous
    /// value if the clock has not moved forward.
    #[cfg(test)]
    pub fn apply(&self, current: &mut Event, now: DateTime<Utc>) {
        self.merge_into(current);

        let floor = current.updated_at + chrono::Duration::microseconds(1);
        current.updated_at = now.max(floor);
    }

    /// Field merge without touching the timestamps.
    pub fn merge_into(&self, current: &mut Event) {
        if let Some(title) = self.title.as_ref().filter(|v| !v.is_empty()) {
            current.title = title.clone();
        }
        if let Some(description) = self.description.as_ref().filter(|v| !v.is_empty()) {
            current.description = description.clone();
        }
        if let Some(start_time) = self.start_time {
            current.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            current.end_time = end_time;
        }
        if let Some(owner_id) = self.owner_id.as_ref().filter(|v| !v.is_empty()) {
            current.owner_id = owner_id.clone();
        }
    }
}

fn supplied(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Zero timestamp as emitted by clients that serialize an unset time
/// (`0001-01-01T00:00:00Z`).
pub fn is_zero_time(t: &DateTime<Utc>) -> bool {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).single() == Some(*t)
}

// ============================================================================
// Replication Message
// ============================================================================
//
// Point-in-time snapshot of an Event as it travels over the topic. Several
// snapshots of the same event id appear over time, one per producer tick.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventMessage {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl EventMessage {
    pub fn snapshot(event: &Event, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            description: event.description.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            owner_id: event.owner_id.clone(),
            created_at: event.created_at,
            updated_at: event.updated_at,
            sent_at: Some(sent_at),
        }
    }

    /// Fill in `sent_at` when the producer left it absent or zero.
    pub fn stamp_if_unsent(&mut self, now: DateTime<Utc>) {
        if self.sent_at.map_or(true, |t| is_zero_time(&t)) {
            self.sent_at = Some(now);
        }
    }
}
