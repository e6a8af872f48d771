//! Owner console and session endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use service_core::error::AppError;

use crate::{
    dtos::admin::{
        AssignRoleRequest, CreateSessionRequest, CreateSessionResponse, LoginPageQuery,
        RoleAssignedResponse, SessionStatusResponse,
    },
    middleware::{admin_guard::is_admin_path, require_role, Caller},
    models::{ProfileUpdate, Role},
    services::session::{clear_session_cookie, session_cookie, VerifiedSession, SESSION_COOKIE_NAME},
    utils::ValidatedJson,
    AppState,
};

/// Always reachable, even without a session.
pub async fn login_page(Query(query): Query<LoginPageQuery>) -> Json<serde_json::Value> {
    // Only return into the admin area; anything else would be an open redirect.
    let redirect = query
        .redirect
        .filter(|r| is_admin_path(r))
        .unwrap_or_else(|| "/admin".to_string());

    Json(json!({
        "page": "admin-login",
        "sessionEndpoint": "/api/admin/session",
        "redirect": redirect,
    }))
}

pub async fn console(uri: Uri, Extension(session): Extension<VerifiedSession>) -> Json<serde_json::Value> {
    Json(json!({
        "uid": session.uid,
        "expiresAt": session.expires_at,
        "path": uri.path(),
    }))
}

pub async fn create_session(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<CreateSessionRequest>,
) -> Result<(CookieJar, Json<CreateSessionResponse>), AppError> {
    let issued = state.issuer.issue(&payload.id_token).await?;

    let jar = jar.add(session_cookie(
        issued.cookie_value,
        issued.max_age_seconds,
        state.config.is_production(),
    ));

    Ok((
        jar,
        Json(CreateSessionResponse {
            uid: issued.uid,
            expires_in: issued.max_age_seconds,
        }),
    ))
}

pub async fn check_session(State(state): State<AppState>, jar: CookieJar) -> Response {
    let cookie = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string());

    match state.sessions.verify(cookie.as_deref()).await {
        Ok(session) => Json(SessionStatusResponse {
            valid: true,
            uid: Some(session.uid),
            expires_at: Some(session.expires_at),
        })
        .into_response(),
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(SessionStatusResponse {
                valid: false,
                uid: None,
                expires_at: None,
            }),
        )
            .into_response(),
    }
}

pub async fn delete_session(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(clear_session_cookie(state.config.is_production()));
    (jar, Json(json!({ "success": true })))
}

/// Role changes by admins. `owner` is never assignable; granting `admin` or
/// changing an existing admin requires an owner.
pub async fn assign_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(uid): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<RoleAssignedResponse>, AppError> {
    if payload.role == Role::Owner {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Owner role is granted through OWNER_UIDS only"
        )));
    }

    require_role(&state, &caller, &[Role::Admin]).await?;

    let target = state
        .backend
        .get_profile(&uid)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    if payload.role == Role::Admin || matches!(target.role, Role::Admin | Role::Owner) {
        require_role(&state, &caller, &[Role::Owner]).await?;
    }

    let update = ProfileUpdate {
        role: Some(payload.role),
        ..Default::default()
    };
    let updated = state
        .backend
        .update_profile(&uid, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    tracing::info!(
        target_uid = %uid,
        by = %caller.uid,
        from = %target.role,
        to = %updated.role,
        "Role assigned"
    );

    Ok(Json(RoleAssignedResponse {
        uid,
        role: updated.role,
    }))
}
