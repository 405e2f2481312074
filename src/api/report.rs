use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::AttendanceEngine;
use crate::auth::auth::AuthUser;
use crate::utils::time::DateRange;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DailyQuery {
    /// Whose day; defaults to the caller
    pub user_id: Option<String>,
    /// Local calendar day; defaults to today
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// First local day included
    pub from: Option<NaiveDate>,
    /// Last local day included
    pub to: Option<NaiveDate>,
}

/// Compliance summary of one user's day
#[utoipa::path(
    get,
    path = "/api/reports/daily",
    params(DailyQuery),
    responses(
        (status = 200, description = "Recomputed daily summary", body = DailySummary),
        (status = 403, description = "Forbidden")
    ),
    tag = "Report"
)]
pub async fn daily_summary(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<DailyQuery>,
) -> actix_web::Result<impl Responder> {
    let user_id = query.user_id.as_deref().unwrap_or(&auth.user_id);
    auth.require_self_or_supervisor(user_id)?;

    let date = query.date.unwrap_or_else(|| engine.local_today());
    Ok(HttpResponse::Ok().json(engine.get_daily_summary(user_id, date).await))
}

/// Summaries of every (user, day) with attendance, newest day first
#[utoipa::path(
    get,
    path = "/api/reports/summaries",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Daily summaries in range", body = [DailySummary]),
        (status = 401, description = "Missing caller identity")
    ),
    tag = "Report"
)]
pub async fn list_summaries(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    // employees are always scoped to themselves
    let user_filter = if auth.role.can_supervise() {
        query.user_id.as_deref()
    } else {
        Some(auth.user_id.as_str())
    };

    let range = DateRange::new(query.from, query.to);
    Ok(HttpResponse::Ok().json(engine.list_summaries(range, user_filter).await))
}

/// Live board: last event and presence of every known user
#[utoipa::path(
    get,
    path = "/api/reports/live",
    responses(
        (status = 200, description = "One row per user", body = [LiveEntry]),
        (status = 403, description = "Forbidden")
    ),
    tag = "Report"
)]
pub async fn live_board(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor()?;

    Ok(HttpResponse::Ok().json(engine.live_board().await))
}
