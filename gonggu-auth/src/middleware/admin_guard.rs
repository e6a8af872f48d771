use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::services::session::{clear_session_cookie, SESSION_COOKIE_NAME};
use crate::AppState;

pub const ADMIN_PREFIX: &str = "/admin";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

/// `/admin` itself or anything below it; `/administrator` is not.
pub fn is_admin_path(path: &str) -> bool {
    path == ADMIN_PREFIX
        || path
            .strip_prefix(ADMIN_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Login page URL that returns to `path` afterwards.
pub fn login_redirect(path: &str) -> String {
    format!(
        "{}?redirect={}",
        ADMIN_LOGIN_PATH,
        urlencoding::encode(path).replace("%2F", "/")
    )
}

/// Gate for the admin area. Every other path passes untouched.
pub async fn admin_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if path == ADMIN_LOGIN_PATH || !is_admin_path(&path) {
        return next.run(request).await;
    }

    let Some(cookie) = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string()) else {
        tracing::debug!(path = %path, "No admin session, redirecting to login");
        return Redirect::to(&login_redirect(&path)).into_response();
    };

    match state.sessions.verify(Some(&cookie)).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => {
            tracing::info!(path = %path, reason = %e, "Admin session rejected");
            let jar = jar.add(clear_session_cookie(state.config.is_production()));
            (jar, Redirect::to(&login_redirect(&path))).into_response()
        }
    }
}
