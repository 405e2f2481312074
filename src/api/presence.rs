use std::time::Duration;

use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::AttendanceEngine;
use crate::auth::auth::AuthUser;
use crate::engine::presence::LocationError;
use crate::error::EngineError;
use crate::model::presence::PresenceStatus;

#[derive(Deserialize, ToSchema)]
pub struct SubmitSample {
    #[schema(example = 24.7149)]
    pub lat: f64,
    #[schema(example = 46.6753)]
    pub lng: f64,
    /// Device time of the fix; the server time is used when absent
    #[schema(value_type = Option<String>, format = "date-time", example = "2026-03-02T05:18:00Z")]
    pub sampled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

#[derive(Deserialize, ToSchema)]
pub struct ReportFailure {
    #[schema(example = "permission_denied")]
    pub kind: FailureKind,
    /// Free text from the device
    pub message: Option<String>,
    /// For timeouts, how long the device waited
    #[schema(example = 10000)]
    pub waited_ms: Option<u64>,
}

impl ReportFailure {
    fn into_error(self) -> LocationError {
        match self.kind {
            FailureKind::PermissionDenied => LocationError::PermissionDenied,
            FailureKind::Unavailable => {
                LocationError::Unavailable(self.message.unwrap_or_else(|| "unknown".to_string()))
            }
            FailureKind::Timeout => {
                LocationError::Timeout(Duration::from_millis(self.waited_ms.unwrap_or_default()))
            }
        }
    }
}

/// Submit the caller's current position
#[utoipa::path(
    post,
    path = "/api/presence",
    request_body = SubmitSample,
    responses(
        (status = 200, description = "Classified presence", body = Object, example = json!({
            "status": "INSIDE"
        })),
        (status = 400, description = "Coordinates out of range"),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Presence"
)]
pub async fn submit_sample(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<SubmitSample>,
) -> actix_web::Result<impl Responder> {
    let status = engine
        .submit_presence_sample(&auth.user_id, payload.lat, payload.lng, payload.sampled_at)?;
    Ok(HttpResponse::Ok().json(json!({ "status": status })))
}

/// Report that the device could not produce a fix
#[utoipa::path(
    post,
    path = "/api/presence/failure",
    request_body = ReportFailure,
    responses(
        (status = 200, description = "Presence after the failure", body = Object, example = json!({
            "status": "ERROR"
        })),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Presence"
)]
pub async fn report_failure(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<ReportFailure>,
) -> actix_web::Result<impl Responder> {
    let error = payload.into_inner().into_error();
    let status: PresenceStatus = engine.report_presence_failure(&auth.user_id, &error);
    Ok(HttpResponse::Ok().json(json!({ "status": status })))
}

/// End the caller's presence session
#[utoipa::path(
    delete,
    path = "/api/presence",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Presence"
)]
pub async fn stop_presence(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    engine.stop_presence(&auth.user_id);
    Ok(HttpResponse::NoContent().finish())
}

/// Latest presence of a user
#[utoipa::path(
    get,
    path = "/api/presence/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Latest classification", body = PresenceSnapshot),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No presence known for the user")
    ),
    tag = "Presence"
)]
pub async fn get_presence(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_self_or_supervisor(&path)?;

    let snapshot = engine
        .presence_of(&path)
        .ok_or_else(|| EngineError::not_found(format!("no presence known for {path}")))?;
    Ok(HttpResponse::Ok().json(snapshot))
}
