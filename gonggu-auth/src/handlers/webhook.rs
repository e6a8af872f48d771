//! Kakao security event receiver.

use std::time::Duration;

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{
    services::webhook::{apply_events, WebhookError, KAKAO_ISSUER, RISC_EVENT_PREFIX},
    AppState,
};

/// How long the response waits for event application before answering.
const APPLY_WAIT: Duration = Duration::from_secs(2);

pub async fn receive_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let body = std::str::from_utf8(&body)
        .map_err(|_| WebhookError::InvalidRequest("Body is not valid UTF-8".to_string()))?;
    let token = state.webhook.verify(body).await?;

    tracing::info!(jti = ?token.jti, events = token.events.len(), "Security event token accepted");

    let backend = state.backend.clone();
    let task = tokio::spawn(async move { apply_events(backend.as_ref(), &token).await });

    match tokio::time::timeout(APPLY_WAIT, task).await {
        Ok(Ok(outcomes)) => tracing::debug!(?outcomes, "Security events applied"),
        Ok(Err(e)) => tracing::error!(error = %e, "Security event task failed"),
        Err(_) => tracing::warn!("Security events still applying, responding early"),
    }

    Ok(StatusCode::ACCEPTED)
}

pub async fn describe() -> impl IntoResponse {
    let events: Vec<String> = [
        "account-purged",
        "account-disabled",
        "account-enabled",
        "identifier-changed",
        "identifier-recycled",
    ]
    .iter()
    .map(|event| format!("{}{}", RISC_EVENT_PREFIX, event))
    .collect();

    Json(json!({
        "endpoint": "/api/auth/kakao/webhook",
        "method": "POST",
        "contentType": "application/secevent+jwt",
        "issuer": KAKAO_ISSUER,
        "supportedEvents": events,
    }))
}
