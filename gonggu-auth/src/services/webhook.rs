//! Kakao security event tokens (RFC 8417 SETs delivered per RFC 8935).
//!
//! A token is fully verified before any of its events touch the profile
//! store. Verification failures map to the RFC 8935 error codes.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{kakao_uid, AccountStatus, ProfileUpdate};
use crate::services::backend::AuthBackend;
use crate::services::error::AuthError;
use crate::services::keys::{KeySetCache, KeySetFormat};

pub const KAKAO_ISSUER: &str = "https://kauth.kakao.com";
pub const KAKAO_JWKS_URL: &str = "https://kauth.kakao.com/.well-known/jwks.json";
pub const RISC_EVENT_PREFIX: &str = "https://schemas.openid.net/secevent/risc/event-type/";
const KAKAO_KEYS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound on loading signing keys while a delivery waits.
pub const KEY_FETCH_WAIT: Duration = Duration::from_secs(2);

#[derive(Error, Debug, PartialEq)]
pub enum WebhookError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidIssuer(String),

    #[error("{0}")]
    InvalidAudience(String),

    #[error("{0}")]
    InvalidKey(String),
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::InvalidRequest(_) => "invalid_request",
            WebhookError::InvalidIssuer(_) => "invalid_issuer",
            WebhookError::InvalidAudience(_) => "invalid_audience",
            WebhookError::InvalidKey(_) => "invalid_key",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct SetErrorBody {
            err: &'static str,
            description: String,
        }

        tracing::warn!(code = self.code(), reason = %self, "Security event token rejected");

        (
            StatusCode::BAD_REQUEST,
            Json(SetErrorBody {
                err: self.code(),
                description: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityEventToken {
    pub iss: String,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub events: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Deleted,
    Disabled,
    Enabled,
    IdentifierChanged,
    IdentifierRecycled,
}

impl EventKind {
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.strip_prefix(RISC_EVENT_PREFIX)? {
            "account-purged" => Some(EventKind::Deleted),
            "account-disabled" => Some(EventKind::Disabled),
            "account-enabled" => Some(EventKind::Enabled),
            "identifier-changed" => Some(EventKind::IdentifierChanged),
            "identifier-recycled" => Some(EventKind::IdentifierRecycled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityEvent {
    pub uri: String,
    pub kind: Option<EventKind>,
    pub subject: Option<String>,
    pub new_value: Option<String>,
}

impl SecurityEventToken {
    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.events
            .iter()
            .map(|(uri, body)| SecurityEvent {
                uri: uri.clone(),
                kind: EventKind::from_uri(uri),
                subject: subject_id(body),
                new_value: body
                    .get("new-value")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
            })
            .collect()
    }
}

/// Kakao user id from an event body. Subjects arrive either as a bare id or
/// as an `iss_sub` object.
fn subject_id(body: &Value) -> Option<String> {
    let subject = body.get("subject")?;
    let raw = match subject {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(fields) => ["sub", "id"].iter().find_map(|key| match fields.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }?;
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

pub struct WebhookVerifier {
    keys: KeySetCache,
    audience: Option<String>,
}

impl WebhookVerifier {
    pub fn new(http: reqwest::Client, jwks_url: impl Into<String>, audience: Option<String>) -> Self {
        if audience.is_none() {
            tracing::warn!("Webhook audience not configured; tokens for any audience will be accepted");
        }
        Self {
            keys: KeySetCache::new(http, jwks_url, KeySetFormat::Jwks, KAKAO_KEYS_TTL),
            audience,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<SecurityEventToken, WebhookError> {
        let token = token.trim();
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(WebhookError::InvalidRequest(
                "Token must have three segments".to_string(),
            ));
        }

        let header = decode_header(token)
            .map_err(|e| WebhookError::InvalidRequest(format!("Malformed token header: {}", e)))?;
        let payload = URL_SAFE_NO_PAD
            .decode(segments[1].trim_end_matches('='))
            .map_err(|e| WebhookError::InvalidRequest(format!("Malformed token payload: {}", e)))?;
        let unverified: SecurityEventToken = serde_json::from_slice(&payload)
            .map_err(|e| WebhookError::InvalidRequest(format!("Malformed token claims: {}", e)))?;

        if unverified.iss != KAKAO_ISSUER {
            return Err(WebhookError::InvalidIssuer(format!(
                "Unexpected issuer {}",
                unverified.iss
            )));
        }

        match &self.audience {
            Some(expected) => {
                if !unverified.aud.as_ref().is_some_and(|aud| aud.contains(expected)) {
                    return Err(WebhookError::InvalidAudience("Unexpected audience".to_string()));
                }
            }
            None => tracing::warn!("Skipping webhook audience check"),
        }

        let kid = header
            .kid
            .ok_or_else(|| WebhookError::InvalidKey("Token has no kid".to_string()))?;
        let key = tokio::time::timeout(KEY_FETCH_WAIT, self.keys.get(&kid))
            .await
            .map_err(|_| {
                tracing::error!(kid = %kid, "Timed out loading Kakao JWKS");
                WebhookError::InvalidKey("Signing keys unavailable".to_string())
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to load Kakao JWKS");
                WebhookError::InvalidKey("Signing keys unavailable".to_string())
            })?
            .ok_or_else(|| WebhookError::InvalidKey(format!("Unknown key {}", kid)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[KAKAO_ISSUER]);
        validation.set_required_spec_claims(&["iss"]);
        validation.validate_exp = false;
        match &self.audience {
            Some(expected) => validation.set_audience(&[expected]),
            None => validation.validate_aud = false,
        }

        let verified = decode::<SecurityEventToken>(token, &key, &validation)
            .map_err(|e| WebhookError::InvalidKey(format!("Signature verification failed: {}", e)))?;

        Ok(verified.claims)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    NoProfile,
    Skipped,
}

pub async fn apply_event(
    backend: &dyn AuthBackend,
    event: &SecurityEvent,
) -> Result<EventOutcome, AuthError> {
    let Some(kind) = event.kind else {
        tracing::info!(uri = %event.uri, "Ignoring unsupported security event");
        return Ok(EventOutcome::Skipped);
    };
    let Some(subject) = event.subject.as_deref() else {
        tracing::warn!(uri = %event.uri, "Security event without subject");
        return Ok(EventOutcome::Skipped);
    };

    let uid = kakao_uid(subject);
    let now = Utc::now();
    let status_update = |status: AccountStatus| ProfileUpdate {
        account_status: Some(status),
        account_status_updated_at: Some(now),
        ..Default::default()
    };
    let update = match kind {
        EventKind::Deleted => status_update(AccountStatus::Deleted),
        EventKind::Disabled => status_update(AccountStatus::Disabled),
        EventKind::Enabled => status_update(AccountStatus::Enabled),
        EventKind::IdentifierChanged => ProfileUpdate {
            email: event.new_value.clone(),
            identifier_changed_at: Some(now),
            ..Default::default()
        },
        // The old address now belongs to someone else.
        EventKind::IdentifierRecycled => ProfileUpdate {
            email: event.new_value.clone(),
            clear_email: true,
            identifier_changed_at: Some(now),
            ..Default::default()
        },
    };

    match backend.update_profile(&uid, &update).await? {
        Some(_) => {
            tracing::info!(uid = %uid, event = ?kind, "Security event applied");
            Ok(EventOutcome::Applied)
        }
        None => {
            tracing::info!(uid = %uid, event = ?kind, "Security event for unknown profile");
            Ok(EventOutcome::NoProfile)
        }
    }
}

/// Apply every event in a verified token. Failures are logged per event and
/// do not stop the remaining events.
pub async fn apply_events(backend: &dyn AuthBackend, token: &SecurityEventToken) -> Vec<EventOutcome> {
    let mut outcomes = Vec::new();
    for event in token.security_events() {
        match apply_event(backend, &event).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                tracing::error!(uri = %event.uri, error = %e, jti = ?token.jti, "Failed to apply security event");
            }
        }
    }
    outcomes
}
