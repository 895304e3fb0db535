use crate::{error::ApiError, AppState};
use api_shared::auth::validate_api_key;
use axum::{extract::FromRequestParts, http::request::Parts};
use molar_core::{ActorId, TenantId};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Caller identity resolved from request headers.
///
/// Extraction also enforces the API key when one is configured.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub tenant: TenantId,
    pub actor: ActorId,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        validate_api_key(state.api_key.as_deref(), header(parts, API_KEY_HEADER))?;

        let tenant = header(parts, TENANT_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("{TENANT_HEADER} header is required")))?;
        let tenant = TenantId::new(tenant)
            .map_err(|e| ApiError::BadRequest(format!("invalid {TENANT_HEADER}: {e}")))?;

        let actor = match header(parts, USER_HEADER) {
            Some(user) => ActorId::new(user)?,
            None => ActorId::system(),
        };

        Ok(Self { tenant, actor })
    }
}
