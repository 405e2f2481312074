use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
};
use serde_json::json;

use crate::auth::auth::AuthUser;

/// Rejects requests without a gateway identity and stashes the parsed
/// [`AuthUser`] in the request extensions for the handlers.
pub async fn identity_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let auth_user = match AuthUser::from_headers(req.headers()) {
        Ok(user) => user,
        Err(reason) => {
            tracing::warn!(path = req.path(), reason, "Request without caller identity");
            let resp = HttpResponse::Unauthorized().json(json!({ "error": reason }));
            return Ok(req.into_response(resp.map_into_boxed_body()));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
