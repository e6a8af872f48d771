//! Kakao login. Every outcome is a redirect back to the login page; the
//! page reads `token` on success or `error`/`desc` on failure.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    dtos::kakao::{KakaoCallbackQuery, KakaoStartQuery},
    models::kakao_uid,
    services::provisioning::{link_external_identity, ExternalIdentity, KAKAO_PROVIDER},
    AppState,
};

const STATE_COOKIE: &str = "kakao_oauth_state";

fn login_error(code: &str, desc: &str) -> Redirect {
    Redirect::to(&format!(
        "/login?error={}&desc={}",
        urlencoding::encode(code),
        urlencoding::encode(desc)
    ))
}

fn clear_state(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(STATE_COOKIE).path("/"))
}

pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<KakaoStartQuery>,
) -> (CookieJar, Redirect) {
    let state_val = uuid::Uuid::new_v4().to_string();
    let redirect_uri = state.kakao.redirect_uri(&headers);
    let url = state
        .kakao
        .authorize_url(&redirect_uri, &state_val, query.switch_account());

    let jar = jar.add(
        Cookie::build((STATE_COOKIE, state_val))
            .path("/")
            .http_only(true)
            .secure(state.config.is_production())
            .same_site(SameSite::Lax)
            .max_age(time::Duration::minutes(10))
            .build(),
    );

    (jar, Redirect::to(&url))
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<KakaoCallbackQuery>,
) -> Response {
    if let Some(error) = query.error.as_deref() {
        tracing::warn!(error = %error, "Kakao authorization denied");
        let desc = query.error_description.as_deref().unwrap_or_default();
        return (clear_state(jar), login_error(error, desc)).into_response();
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return (clear_state(jar), login_error("missing_code", "Authorization code missing"))
            .into_response();
    };

    let expected_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    if expected_state.is_none() || expected_state != query.state {
        tracing::warn!("Kakao callback with mismatched state");
        return (clear_state(jar), login_error("invalid_state", "Login session expired"))
            .into_response();
    }
    let jar = clear_state(jar);

    let redirect_uri = state.kakao.redirect_uri(&headers);
    let token = match state.kakao.exchange_code(code, &redirect_uri).await {
        Ok(token) => token,
        Err(e) => return (jar, login_error(e.code(), e.description())).into_response(),
    };

    let user = match state.kakao.fetch_user(&token.access_token).await {
        Ok(user) => user,
        Err(e) => return (jar, login_error(e.code(), e.description())).into_response(),
    };

    let identity = ExternalIdentity {
        uid: kakao_uid(&user.id.to_string()),
        email: user.email().map(str::to_string),
        display_name: user.display_name().map(str::to_string),
        photo_url: user.photo_url().map(str::to_string),
        provider: KAKAO_PROVIDER,
    };

    if let Err(e) = link_external_identity(state.backend.as_ref(), &identity).await {
        tracing::error!(uid = %identity.uid, error = %e, "Failed to link Kakao identity");
        return (jar, login_error("account_link_failed", "Could not prepare account")).into_response();
    }

    match state.backend.create_custom_token(&identity.uid).await {
        Ok(custom_token) => {
            tracing::info!(uid = %identity.uid, "Kakao login completed");
            let url = format!("/login?token={}", urlencoding::encode(&custom_token));
            (jar, Redirect::to(&url)).into_response()
        }
        Err(e) => {
            tracing::error!(uid = %identity.uid, error = %e, "Failed to create custom token");
            (jar, login_error("token_creation_failed", "Could not complete sign-in")).into_response()
        }
    }
}
