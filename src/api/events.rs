use actix_web::{web, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::models::{Event, EventPatch, NewEvent};
use crate::service::EventService;

// ============================================================================
// DTOs
// ============================================================================

/// POST body. Timestamps are RFC3339 strings.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub owner_id: String,
}

/// PUT/PATCH body. Absent and empty fields leave the stored value alone.
#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub owner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Event> for EventResponse {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            description: event.description.clone(),
            start_time: rfc3339(&event.start_time),
            end_time: rfc3339(&event.end_time),
            owner_id: event.owner_id.clone(),
            created_at: rfc3339(&event.created_at),
            updated_at: rfc3339(&event.updated_at),
        }
    }
}

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(value: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("invalid {}", field)))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    let raw = raw.trim_matches('/');
    if raw.is_empty() {
        return Err(ApiError::BadRequest("id is required in path".to_string()));
    }
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("invalid id".to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/events
pub async fn create_event(
    service: web::Data<EventService>,
    body: web::Json<CreateEventRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = body.into_inner();

    if req.title.is_empty() || req.owner_id.is_empty() {
        return Err(ApiError::BadRequest(
            "title and owner_id are required".to_string(),
        ));
    }
    let start_time = parse_time(&req.start_time, "start_time")?;
    let end_time = parse_time(&req.end_time, "end_time")?;

    let new_event = NewEvent::new(req.title, req.description, start_time, end_time, req.owner_id);
    let event_id = new_event.id;

    let event = service.create_event(new_event).await.map_err(|e| {
        tracing::error!(event_id = %event_id, error = %e, "Create event failed");
        ApiError::from(e)
    })?;

    tracing::info!(event_id = %event.id, owner_id = %event.owner_id, "✅ Event created");
    Ok(HttpResponse::Created().json(EventResponse::from(&event)))
}

/// GET /api/events?owner_id=...
pub async fn list_events(
    service: web::Data<EventService>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    if query.owner_id.is_empty() {
        return Err(ApiError::BadRequest("owner_id is required".to_string()));
    }

    let events = service.list_events(&query.owner_id).await.map_err(|e| {
        tracing::error!(owner_id = %query.owner_id, error = %e, "List events failed");
        ApiError::from(e)
    })?;

    let body: Vec<EventResponse> = events.iter().map(EventResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// PUT|PATCH /api/events/{id}
pub async fn update_event(
    service: web::Data<EventService>,
    path: web::Path<String>,
    body: web::Json<UpdateEventRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&path)?;
    let req = body.into_inner();

    let start_time = req
        .start_time
        .as_deref()
        .map(|v| parse_time(v, "start_time"))
        .transpose()?;
    let end_time = req
        .end_time
        .as_deref()
        .map(|v| parse_time(v, "end_time"))
        .transpose()?;

    let patch = EventPatch::new(id)
        .title(req.title)
        .description(req.description)
        .start_time(start_time)
        .end_time(end_time)
        .owner_id(req.owner_id);

    service.update_event(patch).await.map_err(|e| {
        tracing::error!(event_id = %id, error = %e, "Update event failed");
        ApiError::from(e)
    })?;

    tracing::info!(event_id = %id, "✏️  Event updated");
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/events/{id}
pub async fn delete_event(
    service: web::Data<EventService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&path)?;

    service.delete_event(id).await.map_err(|e| {
        tracing::error!(event_id = %id, error = %e, "Delete event failed");
        ApiError::from(e)
    })?;

    tracing::info!(event_id = %id, "🗑️  Event deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// PUT|PATCH|DELETE /api/events/ with no id segment
pub async fn missing_id() -> Result<HttpResponse, ApiError> {
    Err(ApiError::BadRequest("id is required in path".to_string()))
}
