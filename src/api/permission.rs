use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AttendanceEngine;
use crate::auth::auth::AuthUser;
use crate::engine::permissions::{PermissionFilter, PermissionPage};
use crate::model::permission::{Decision, PermissionRequest};

#[derive(Deserialize, ToSchema)]
pub struct CreatePermission {
    #[schema(example = "Hospital appointment")]
    pub reason: String,
    /// Day to excuse; today when absent
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "data": [
        {
            "id": "0f2d5a3c-7b1e-4c8a-9e2d-3b4c5d6e7f80",
            "user_id": "u-1001",
            "user_name": "Sara",
            "reason": "Hospital appointment",
            "status": "pending",
            "requested_at": "2026-03-02T04:10:00Z",
            "date": "2026-03-02"
        }
    ],
    "page": 1,
    "per_page": 10,
    "total": 1
}))]
pub struct PermissionListResponse {
    pub data: Vec<PermissionRequest>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: u64,
}

impl From<PermissionPage> for PermissionListResponse {
    fn from(page: PermissionPage) -> Self {
        Self {
            data: page.data,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        }
    }
}

/* =========================
Request a permission
========================= */
/// Swagger doc for create_permission endpoint
#[utoipa::path(
    post,
    path = "/api/permissions",
    request_body(
        content = CreatePermission,
        description = "Permission request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Permission request submitted", body = PermissionRequest),
        (status = 400, description = "Empty reason", body = Object, example = json!({
            "error": "validation_error",
            "message": "reason must not be empty"
        })),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Permission"
)]
pub async fn create_permission(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    payload: web::Json<CreatePermission>,
) -> actix_web::Result<impl Responder> {
    let request = engine
        .request_permission(&auth.user_id, &auth.user_name, &payload.reason, payload.date)
        .await?;
    Ok(HttpResponse::Created().json(request))
}

async fn decide(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    request_id: String,
    decision: Decision,
) -> actix_web::Result<HttpResponse> {
    auth.require_supervisor()?;

    let decided = engine.decide_permission(&request_id, decision).await?;
    tracing::info!(request_id = %request_id, decided_by = %auth.user_id, %decision, "Permission request settled");
    Ok(HttpResponse::Ok().json(decided))
}

/* =========================
Approve (Supervisor/Admin)
========================= */
/// Swagger doc for approve_permission endpoint
#[utoipa::path(
    put,
    path = "/api/permissions/{request_id}/approve",
    params(
        ("request_id" = String, Path, description = "ID of the permission request to approve")
    ),
    responses(
        (status = 200, description = "Permission approved", body = PermissionRequest),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Permission request not found"),
        (status = 409, description = "Already decided", body = Object, example = json!({
            "error": "conflict_error",
            "message": "already decided"
        }))
    ),
    tag = "Permission"
)]
pub async fn approve_permission(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    decide(auth, engine, path.into_inner(), Decision::Approved).await
}

/* =========================
Reject (Supervisor/Admin)
========================= */
/// Swagger doc for reject_permission endpoint
#[utoipa::path(
    put,
    path = "/api/permissions/{request_id}/reject",
    params(
        ("request_id" = String, Path, description = "ID of the permission request to reject")
    ),
    responses(
        (status = 200, description = "Permission rejected", body = PermissionRequest),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Permission request not found"),
        (status = 409, description = "Already decided")
    ),
    tag = "Permission"
)]
pub async fn reject_permission(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    decide(auth, engine, path.into_inner(), Decision::Rejected).await
}

/// for getting a permission request's details endpoint
#[utoipa::path(
    get,
    path = "/api/permissions/{request_id}",
    params(
        ("request_id" = String, Path, description = "ID of the permission request to fetch")
    ),
    responses(
        (status = 200, description = "Permission request found", body = PermissionRequest),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Permission request not found")
    ),
    tag = "Permission"
)]
pub async fn get_permission(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let request = engine.permission(&path).await?;
    auth.require_self_or_supervisor(&request.user_id)?;

    Ok(HttpResponse::Ok().json(request))
}

/// Pending requests, oldest first
#[utoipa::path(
    get,
    path = "/api/permissions/pending",
    responses(
        (status = 200, description = "Requests awaiting a decision", body = [PermissionRequest]),
        (status = 403, description = "Forbidden")
    ),
    tag = "Permission"
)]
pub async fn pending_permissions(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    Ok(HttpResponse::Ok().json(engine.pending_permissions().await))
}

/// for getting permission requests endpoint
#[utoipa::path(
    get,
    path = "/api/permissions",
    params(PermissionFilter),
    responses(
        (status = 200, description = "Paginated permission list", body = PermissionListResponse),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Permission"
)]
pub async fn permission_list(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<PermissionFilter>,
) -> actix_web::Result<impl Responder> {
    let mut filter = query.into_inner();
    // employees only ever see their own requests
    if !auth.role.can_supervise() {
        filter.user_id = Some(auth.user_id.clone());
    }

    let page = engine.list_permissions(&filter).await;
    Ok(HttpResponse::Ok().json(PermissionListResponse::from(page)))
}
