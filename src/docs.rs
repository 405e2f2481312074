use crate::api::attendance::MarkAttendance;
use crate::api::permission::{CreatePermission, PermissionListResponse};
use crate::api::presence::{FailureKind, ReportFailure, SubmitSample};
use crate::api::zone::{AssignMember, UpdateGeometry, UpdateSchedule};
use crate::engine::AttendanceAction;
use crate::engine::report::LiveEntry;
use crate::model::attendance::{
    AttendanceEvent, DailyAttendanceState, DayAttendance, EventType, LocationStatus,
};
use crate::model::permission::{Decision, PermissionRequest, PermissionStatus};
use crate::model::presence::{PresenceSnapshot, PresenceStatus, PresenceTransition};
use crate::model::summary::{DailySummary, DeductionOutcome, DeductionTier, WorkedDuration};
use crate::model::zone::{Coordinates, Zone, ZoneSpec};
use utoipa::Modify;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Compliance API",
        version = "1.0.0",
        description = r#"
## Geofenced Attendance Compliance

Records employee check-in and check-out against circular work zones and turns
them into daily compliance figures.

### 🔹 Key Features
- **Zones**
  - Create zones with a center, radius and shift window; assign one zone per user
- **Presence**
  - Submit positions and see whether each user is inside their zone
- **Attendance**
  - One check-in and one check-out per local day, tagged inside/outside zone
- **Permissions**
  - Request an excuse for a day; supervisors approve or reject it once
- **Reports**
  - Late and early minutes, worked time, deduction tier, live board
- **Live**
  - Server-Sent Events for every collection and for presence changes

### 🔐 Identity
Requests carry the caller identity set by the gateway:
`X-User-Id`, `X-User-Name`, `X-User-Role` (`admin`, `supervisor`, `employee`).

### 📦 Response Format
- JSON everywhere; errors are `{"error": <kind>, "message": <text>}`
- Pagination supported for permission lists

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::zone::create_zone,
        crate::api::zone::list_zones,
        crate::api::zone::get_zone,
        crate::api::zone::my_zone,
        crate::api::zone::update_geometry,
        crate::api::zone::update_schedule,
        crate::api::zone::remove_zone,
        crate::api::zone::assign_member,
        crate::api::zone::unassign_member,

        crate::api::presence::submit_sample,
        crate::api::presence::report_failure,
        crate::api::presence::stop_presence,
        crate::api::presence::get_presence,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::list_events,

        crate::api::permission::create_permission,
        crate::api::permission::approve_permission,
        crate::api::permission::reject_permission,
        crate::api::permission::get_permission,
        crate::api::permission::pending_permissions,
        crate::api::permission::permission_list,

        crate::api::report::daily_summary,
        crate::api::report::list_summaries,
        crate::api::report::live_board,

        crate::api::live::collection_feed,
        crate::api::live::presence_feed
    ),
    components(
        schemas(
            Zone,
            ZoneSpec,
            Coordinates,
            AssignMember,
            UpdateGeometry,
            UpdateSchedule,
            SubmitSample,
            ReportFailure,
            FailureKind,
            PresenceStatus,
            PresenceSnapshot,
            PresenceTransition,
            MarkAttendance,
            AttendanceAction,
            AttendanceEvent,
            DayAttendance,
            DailyAttendanceState,
            EventType,
            LocationStatus,
            CreatePermission,
            PermissionRequest,
            PermissionListResponse,
            PermissionStatus,
            Decision,
            DailySummary,
            DeductionOutcome,
            DeductionTier,
            WorkedDuration,
            LiveEntry
        )
    ),
    modifiers(&GatewayIdentity),
    tags(
        (name = "Zone", description = "Work zone management APIs"),
        (name = "Presence", description = "Geofence presence APIs"),
        (name = "Attendance", description = "Check-in and check-out APIs"),
        (name = "Permission", description = "Exception request APIs"),
        (name = "Report", description = "Compliance reporting APIs"),
        (name = "Live", description = "Server-Sent Event feeds"),
    )
)]
pub struct ApiDoc;

/// Documents the gateway identity header in Swagger UI.
struct GatewayIdentity;

impl Modify for GatewayIdentity {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "gateway_user",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Id"))),
        );
    }
}
