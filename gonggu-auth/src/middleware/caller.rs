use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::models::{satisfies, Role};
use crate::services::session::SESSION_COOKIE_NAME;
use crate::services::AuthError;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerSource {
    IdToken,
    OwnerSession,
}

/// Authenticated caller of an API route: a client ID token in
/// `Authorization: Bearer`, or the owner session cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub uid: String,
    pub source: CallerSource,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(parts) {
            let verified = state.backend.verify_id_token(token).await.map_err(|e| match e {
                AuthError::InvalidToken(reason) => AppError::Unauthorized(anyhow::anyhow!(reason)),
                other => AppError::from(other),
            })?;
            return Ok(Caller {
                uid: verified.uid,
                source: CallerSource::IdToken,
            });
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
            let session = state.sessions.verify(Some(cookie.value())).await?;
            return Ok(Caller {
                uid: session.uid,
                source: CallerSource::OwnerSession,
            });
        }

        Err(AppError::Unauthorized(anyhow::anyhow!(
            "Missing or invalid Authorization header"
        )))
    }
}

/// Effective role of `caller`. Owner sessions of allow-listed uids count as
/// `owner`; everyone else has the role stored on their profile.
pub async fn caller_role(state: &AppState, caller: &Caller) -> Result<Role, AppError> {
    if caller.source == CallerSource::OwnerSession && state.issuer.is_owner(&caller.uid) {
        return Ok(Role::Owner);
    }

    let profile = state
        .backend
        .get_profile(&caller.uid)
        .await?
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Profile not found")))?;
    Ok(profile.role)
}

pub async fn require_role(state: &AppState, caller: &Caller, allowed: &[Role]) -> Result<Role, AppError> {
    let role = caller_role(state, caller).await?;
    if !satisfies(role, allowed) {
        tracing::warn!(uid = %caller.uid, role = %role, "Insufficient role");
        return Err(AppError::Forbidden(anyhow::anyhow!("Insufficient role")));
    }
    Ok(role)
}
