use std::str::FromStr;

use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorForbidden,
    error::ErrorUnauthorized, http::header::HeaderMap,
};
use futures::future::{Ready, ready};

use crate::model::UserId;
use crate::model::role::Role;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_NAME_HEADER: &str = "X-User-Name";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Caller identity, already authenticated by the gateway in front of us.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub user_name: String,
    pub role: Role,
}

impl AuthUser {
    /// Reads the identity headers. The name falls back to the id.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, &'static str> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER).ok_or("Missing X-User-Id header")?;
        let role = header(USER_ROLE_HEADER).ok_or("Missing X-User-Role header")?;
        let role = Role::from_str(role).map_err(|_| "Invalid role")?;
        let user_name = header(USER_NAME_HEADER).unwrap_or(user_id);

        Ok(AuthUser {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            role,
        })
    }

    pub fn require_supervisor(&self) -> actix_web::Result<()> {
        if self.role.can_supervise() {
            Ok(())
        } else {
            Err(ErrorForbidden("Supervisor/Admin only"))
        }
    }

    /// Own records are always visible; others' only to supervisors.
    pub fn require_self_or_supervisor(&self, user_id: &str) -> actix_web::Result<()> {
        if self.user_id == user_id || self.role.can_supervise() {
            Ok(())
        } else {
            Err(ErrorForbidden("Not allowed to access another user's records"))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // the identity middleware has usually parsed it already
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }
        ready(AuthUser::from_headers(req.headers()).map_err(ErrorUnauthorized))
    }
}
