use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::AttendanceEngine;
use crate::auth::auth::AuthUser;
use crate::error::EngineError;
use crate::model::attendance::LocationStatus;
use crate::utils::time::DateRange;

#[derive(Deserialize, ToSchema, Default)]
#[serde(deny_unknown_fields)]
pub struct MarkAttendance {
    /// Explicit location tag. Derived from the caller's presence when absent.
    #[schema(example = "inside_zone")]
    pub location_status: Option<LocationStatus>,
    /// Must be true to record an outside-zone action
    #[serde(default)]
    #[schema(example = false)]
    pub confirmed: bool,
}

impl MarkAttendance {
    /// An empty body means "no tag, not confirmed". Anything else must parse.
    fn from_body(body: &[u8]) -> Result<Self, EngineError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| EngineError::validation(format!("invalid attendance body: {e}")))
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventQuery {
    /// Whose events; defaults to the caller
    pub user_id: Option<String>,
    /// First local day included
    pub from: Option<NaiveDate>,
    /// Last local day included
    pub to: Option<NaiveDate>,
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(content = Option<MarkAttendance>, description = "Optional location tag", content_type = "application/json"),
    responses(
        (status = 200, description = "Checked in successfully", body = AttendanceAction),
        (status = 400, description = "Malformed body, or outside-zone check-in was not confirmed", body = Object, example = json!({
            "error": "validation_error",
            "message": "outside-zone attendance requires explicit confirmation"
        })),
        (status = 401, description = "Missing caller identity"),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "error": "conflict_error",
            "message": "already checked in"
        })),
        (status = 502, description = "Record store failure")
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let payload = MarkAttendance::from_body(&body)?;

    let action = engine
        .check_in(&auth.user_id, payload.location_status, payload.confirmed)
        .await?;
    Ok(HttpResponse::Ok().json(action))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(content = Option<MarkAttendance>, description = "Optional location tag", content_type = "application/json"),
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceAction),
        (status = 400, description = "Malformed body, or outside-zone check-out was not confirmed"),
        (status = 401, description = "Missing caller identity"),
        (status = 409, description = "No active check-in, or already checked out", body = Object, example = json!({
            "error": "conflict_error",
            "message": "no active check-in"
        })),
        (status = 502, description = "Record store failure")
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let payload = MarkAttendance::from_body(&body)?;

    let action = engine
        .check_out(&auth.user_id, payload.location_status, payload.confirmed)
        .await?;
    Ok(HttpResponse::Ok().json(action))
}

/// The caller's state for the current local day
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's IN/OUT pair", body = AttendanceAction),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    Ok(HttpResponse::Ok().json(engine.today(&auth.user_id)))
}

/// Raw attendance events, oldest first
#[utoipa::path(
    get,
    path = "/api/attendance/events",
    params(EventQuery),
    responses(
        (status = 200, description = "Events in range", body = [AttendanceEvent]),
        (status = 403, description = "Forbidden")
    ),
    tag = "Attendance"
)]
pub async fn list_events(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<EventQuery>,
) -> actix_web::Result<impl Responder> {
    let user_id = query.user_id.as_deref().unwrap_or(&auth.user_id);
    auth.require_self_or_supervisor(user_id)?;

    let events = engine.events_for(user_id, DateRange::new(query.from, query.to));
    Ok(HttpResponse::Ok().json(events))
}
