//! Owner session cookie: issuing and verifying.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::services::backend::AuthBackend;
use crate::services::error::AuthError;

pub const SESSION_COOKIE_NAME: &str = "admin_session";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSession {
    pub uid: String,
    pub expires_at: i64,
}

/// Validates the `admin_session` artifact on every protected request.
#[derive(Clone)]
pub struct SessionVerifier {
    backend: Arc<dyn AuthBackend>,
}

impl SessionVerifier {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    /// Always checks revocation, so disabled accounts and revoked sessions
    /// are rejected even when the cookie itself is still within its lifetime.
    pub async fn verify(&self, cookie: Option<&str>) -> Result<VerifiedSession, AuthError> {
        let cookie = cookie
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::Unauthenticated("Missing session".to_string()))?;

        match self.backend.verify_session(cookie, true).await {
            Ok(token) => Ok(VerifiedSession {
                uid: token.uid,
                expires_at: token.expires_at,
            }),
            Err(AuthError::Unauthenticated(reason)) => Err(AuthError::Unauthenticated(reason)),
            Err(e) => {
                tracing::warn!(error = %e, "Session verification failed");
                Err(AuthError::Unauthenticated("Session could not be verified".to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedSession {
    pub uid: String,
    pub cookie_value: String,
    pub max_age_seconds: i64,
}

/// Exchanges a client ID token for a session cookie, for allow-listed
/// owners only.
#[derive(Clone)]
pub struct OwnerSessionIssuer {
    backend: Arc<dyn AuthBackend>,
    owner_uids: Arc<Vec<String>>,
    expires_days: i64,
}

impl OwnerSessionIssuer {
    pub fn new(backend: Arc<dyn AuthBackend>, config: &SessionConfig) -> Self {
        Self {
            backend,
            owner_uids: Arc::new(config.owner_uids.clone()),
            expires_days: config.expires_days,
        }
    }

    pub fn is_owner(&self, uid: &str) -> bool {
        self.owner_uids.iter().any(|owner| owner == uid)
    }

    pub async fn issue(&self, id_token: &str) -> Result<IssuedSession, AuthError> {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            return Err(AuthError::InvalidToken("Missing ID token".to_string()));
        }

        if self.owner_uids.is_empty() {
            return Err(AuthError::ServerMisconfigured(
                "OWNER_UIDS is not configured".to_string(),
            ));
        }

        let verified = self.backend.verify_id_token(id_token).await?;

        if !self.is_owner(&verified.uid) {
            tracing::warn!(uid = %verified.uid, "Owner session requested by non-owner");
            return Err(AuthError::Forbidden("Not an owner".to_string()));
        }

        let expires_in = chrono::Duration::days(self.expires_days);
        let cookie_value = self.backend.mint_session(id_token, expires_in).await?;

        tracing::info!(uid = %verified.uid, days = self.expires_days, "Owner session issued");

        Ok(IssuedSession {
            uid: verified.uid,
            cookie_value,
            max_age_seconds: expires_in.num_seconds(),
        })
    }
}

pub fn session_cookie(value: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

/// Overwrites the session cookie with an immediately expiring one.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    session_cookie(String::new(), 0, secure)
}
