// ============================================================================
// HTTP API - /api/events
// ============================================================================
//
// Thin adapter over EventService: decode and validate the request, call the
// service, map the outcome to a status code. Errors always render as
// `{"error": "<message>"}`.
//
// Expects `web::Data<EventService>` in the app data.
//
// ============================================================================

mod events;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|_err, _req| ApiError::BadRequest("invalid json".to_string()).into()),
    )
    .service(
        web::resource("/api/events")
            .route(web::post().to(events::create_event))
            .route(web::get().to(events::list_events)),
    )
    .service(
        web::resource("/api/events/")
            .route(web::put().to(events::missing_id))
            .route(web::patch().to(events::missing_id))
            .route(web::delete().to(events::missing_id)),
    )
    .service(
        web::resource("/api/events/{id}")
            .route(web::put().to(events::update_event))
            .route(web::patch().to(events::update_event))
            .route(web::delete().to(events::delete_event)),
    );
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Store failures other than validation. NotFound lands here too and is
    /// reported as 500.
    #[error("internal error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => ApiError::BadRequest(message),
            other => ApiError::Store(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}
