use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveTime;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::AttendanceEngine;
use crate::auth::auth::AuthUser;
use crate::model::zone::{Coordinates, ZoneSpec};

#[derive(Deserialize, ToSchema)]
pub struct AssignMember {
    #[schema(example = "u-1001")]
    pub user_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateGeometry {
    #[schema(example = 24.7136)]
    pub center_lat: f64,
    #[schema(example = 46.6753)]
    pub center_lng: f64,
    #[schema(example = 250.0)]
    pub radius_meters: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSchedule {
    #[schema(value_type = String, example = "08:00:00")]
    pub shift_start: NaiveTime,
    #[schema(value_type = String, example = "16:00:00")]
    pub shift_end: NaiveTime,
}

/// Create a geofenced work zone
#[utoipa::path(
    post,
    path = "/api/zones",
    request_body(content = ZoneSpec, description = "Zone payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Zone created", body = Zone),
        (status = 400, description = "Invalid radius, center or shift window"),
        (status = 401, description = "Missing caller identity"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Zone"
)]
pub async fn create_zone(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<ZoneSpec>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    let zone = engine.create_zone(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(zone))
}

/// List all zones, by name
#[utoipa::path(
    get,
    path = "/api/zones",
    responses(
        (status = 200, description = "All zones", body = [Zone]),
        (status = 401, description = "Missing caller identity"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Zone"
)]
pub async fn list_zones(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    Ok(HttpResponse::Ok().json(engine.zones()))
}

/// Zone details
#[utoipa::path(
    get,
    path = "/api/zones/{zone_id}",
    params(("zone_id" = String, Path, description = "Zone id")),
    responses(
        (status = 200, description = "Zone found", body = Zone),
        (status = 404, description = "Zone not found", body = Object, example = json!({
            "error": "not_found_error",
            "message": "zone z-1 not found"
        }))
    ),
    tag = "Zone"
)]
pub async fn get_zone(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    Ok(HttpResponse::Ok().json(engine.zone(&path)?))
}

/// The caller's own zone
#[utoipa::path(
    get,
    path = "/api/zones/mine",
    responses(
        (status = 200, description = "Caller's zone", body = Zone),
        (status = 404, description = "Caller is not assigned to a zone")
    ),
    tag = "Zone"
)]
pub async fn my_zone(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    match engine.zone_of(&auth.user_id) {
        Some(zone) => Ok(HttpResponse::Ok().json(zone)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "not_found_error",
            "message": "no zone assigned"
        }))),
    }
}

/// Move the zone center and/or radius
#[utoipa::path(
    put,
    path = "/api/zones/{zone_id}/geometry",
    params(("zone_id" = String, Path, description = "Zone id")),
    request_body = UpdateGeometry,
    responses(
        (status = 200, description = "Zone updated", body = Zone),
        (status = 400, description = "Invalid center or radius"),
        (status = 404, description = "Zone not found")
    ),
    tag = "Zone"
)]
pub async fn update_geometry(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
    payload: web::Json<UpdateGeometry>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    let center = Coordinates::new(payload.center_lat, payload.center_lng);
    let zone = engine
        .update_zone_geometry(&path, center, payload.radius_meters)
        .await?;
    Ok(HttpResponse::Ok().json(zone))
}

/// Change the shift window
#[utoipa::path(
    put,
    path = "/api/zones/{zone_id}/schedule",
    params(("zone_id" = String, Path, description = "Zone id")),
    request_body = UpdateSchedule,
    responses(
        (status = 200, description = "Zone updated", body = Zone),
        (status = 400, description = "shift_start must be before shift_end"),
        (status = 404, description = "Zone not found")
    ),
    tag = "Zone"
)]
pub async fn update_schedule(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
    payload: web::Json<UpdateSchedule>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    let zone = engine
        .update_zone_schedule(&path, payload.shift_start, payload.shift_end)
        .await?;
    Ok(HttpResponse::Ok().json(zone))
}

/// Delete a zone; its members become unassigned
#[utoipa::path(
    delete,
    path = "/api/zones/{zone_id}",
    params(("zone_id" = String, Path, description = "Zone id")),
    responses(
        (status = 200, description = "Zone removed", body = Zone),
        (status = 404, description = "Zone not found")
    ),
    tag = "Zone"
)]
pub async fn remove_zone(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    Ok(HttpResponse::Ok().json(engine.remove_zone(&path).await?))
}

/// Assign a user to the zone
#[utoipa::path(
    post,
    path = "/api/zones/{zone_id}/members",
    params(("zone_id" = String, Path, description = "Zone id")),
    request_body = AssignMember,
    responses(
        (status = 200, description = "User assigned (no-op when already a member)", body = Zone),
        (status = 404, description = "Zone not found"),
        (status = 409, description = "User is assigned to another zone", body = Object, example = json!({
            "error": "conflict_error",
            "message": "already assigned elsewhere"
        }))
    ),
    tag = "Zone"
)]
pub async fn assign_member(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
    payload: web::Json<AssignMember>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    let zone = engine.assign_zone(payload.user_id.trim(), &path).await?;
    Ok(HttpResponse::Ok().json(zone))
}

/// Remove a user from the zone
#[utoipa::path(
    delete,
    path = "/api/zones/{zone_id}/members/{user_id}",
    params(
        ("zone_id" = String, Path, description = "Zone id"),
        ("user_id" = String, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "User unassigned", body = Zone),
        (status = 404, description = "Zone not found or user not a member")
    ),
    tag = "Zone"
)]
pub async fn unassign_member(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(String, String)>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    let (zone_id, user_id) = path.into_inner();
    let zone = engine.unassign_zone(&user_id, &zone_id).await?;
    Ok(HttpResponse::Ok().json(zone))
}
