//! Bearer-token auth extractor: `Authorization: TOKEN <64-hex-char>`,
//! grounded in original_source's `auth_middleware.py` (header prefix,
//! length check, role gate on `/admin/*`). The original resolves the
//! token against a Redis-cached user blob; here the store's api-key
//! index (`Store::get_user_by_api_key`) is the equivalent lookup.
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
};

use crate::{
    errors::CoreError,
    state::AppState,
    user::{Role, User},
};

/// The authenticated caller, extracted from the `Authorization` header
/// for any handler that declares it as a parameter.
pub struct AuthUser(pub User);

fn unauthorized() -> CoreError {
    // Authentication failure does not correspond to a §7 taxonomy
    // variant (those describe *authorized* request failures); map it
    // to Forbidden rather than inventing an eighth variant.
    CoreError::Forbidden
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;

        let token = header.strip_prefix("TOKEN ").ok_or_else(unauthorized)?;
        if token.len() != 64 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(unauthorized());
        }

        let user = app
            .coordinator
            .store
            .get_user_by_api_key(token)
            .map_err(|_| unauthorized())?
            .ok_or_else(unauthorized)?;

        if !user.active {
            return Err(unauthorized());
        }

        Ok(AuthUser(user))
    }
}

/// An authenticated caller already known to hold the `ADMIN` role.
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, axum::Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state)
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({"error": "unauthorized"}))))?;
        if user.role != Role::Admin {
            return Err((StatusCode::FORBIDDEN, axum::Json(serde_json::json!({"error": "forbidden"}))));
        }
        Ok(AdminUser(user))
    }
}
