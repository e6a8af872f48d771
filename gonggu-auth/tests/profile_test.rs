mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{body_json, TestApp};
use gonggu_auth::models::{Profile, Role};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn authed(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn ensure_creates_profile_once() {
    let app = TestApp::spawn().await;
    app.add_account("u1");
    let token = app.id_token("u1");

    let first = app
        .router
        .clone()
        .oneshot(authed(Method::POST, "/api/profile/ensure", &token, None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = body_json(first).await;
    assert_eq!(body["uid"], "u1");
    assert_eq!(body["role"], "user");
    assert_eq!(body["email"], "u1@example.com");

    let second = app
        .router
        .oneshot(authed(Method::POST, "/api/profile/ensure", &token, None))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(app.backend.profile_writes(), 1);
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/profile/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_bearer_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .router
        .oneshot(authed(Method::GET, "/api/profile/me", "bogus", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_without_profile_is_not_found() {
    let app = TestApp::spawn().await;
    app.add_account("u1");
    let token = app.id_token("u1");

    let response = app
        .router
        .oneshot(authed(Method::GET, "/api/profile/me", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn nickname_can_be_claimed_once() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    app.add_user("u2", Role::User);
    let first = app.id_token("u1");
    let second = app.id_token("u2");

    let response = app
        .router
        .clone()
        .oneshot(authed(
            Method::PUT,
            "/api/profile/nickname",
            &first,
            Some(json!({ "nickname": "공구왕" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["nickname"], "공구왕");

    let response = app
        .router
        .clone()
        .oneshot(authed(
            Method::PUT,
            "/api/profile/nickname",
            &second,
            Some(json!({ "nickname": "공구왕" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "Nickname unavailable");
    assert!(app.backend.profile("u2").unwrap().nickname.is_none());

    let response = app
        .router
        .oneshot(authed(
            Method::GET,
            "/api/profile/nickname/check?nickname=%EA%B3%B5%EA%B5%AC%EC%99%95",
            &first,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["available"], true);
}

#[tokio::test]
async fn nickname_check_reports_taken_names() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    let mut holder = Profile::new("u2", None, None, None);
    holder.nickname = Some("minji".to_string());
    app.backend.insert_profile(holder).unwrap();
    let token = app.id_token("u1");

    let response = app
        .router
        .oneshot(authed(
            Method::GET,
            "/api/profile/nickname/check?nickname=minji",
            &token,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["available"], false);
}

#[tokio::test]
async fn changing_nickname_releases_the_old_one() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    app.add_user("u2", Role::User);
    let first = app.id_token("u1");
    let second = app.id_token("u2");

    for nickname in ["minji", "minji_kim"] {
        let response = app
            .router
            .clone()
            .oneshot(authed(
                Method::PUT,
                "/api/profile/nickname",
                &first,
                Some(json!({ "nickname": nickname })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .oneshot(authed(
            Method::PUT,
            "/api/profile/nickname",
            &second,
            Some(json!({ "nickname": "minji" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_nickname_is_rejected() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    let token = app.id_token("u1");

    let response = app
        .router
        .oneshot(authed(
            Method::PUT,
            "/api/profile/nickname",
            &token,
            Some(json!({ "nickname": "a" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.backend.profile("u1").unwrap().nickname.is_none());
}

#[tokio::test]
async fn reserved_nicknames_are_refused() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    let token = app.id_token("u1");

    for nickname in ["..", "__x__"] {
        let response = app
            .router
            .clone()
            .oneshot(authed(
                Method::PUT,
                "/api/profile/nickname",
                &token,
                Some(json!({ "nickname": nickname })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .router
        .oneshot(authed(
            Method::GET,
            "/api/profile/nickname/check?nickname=..",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.backend.profile("u1").unwrap().nickname.is_none());
}

#[tokio::test]
async fn organizer_application_requires_terms() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    let token = app.id_token("u1");

    let response = app
        .router
        .clone()
        .oneshot(authed(Method::POST, "/api/profile/organizer-application", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(authed(
            Method::POST,
            "/api/profile/terms",
            &token,
            Some(json!({ "userTerms": true, "organizerTerms": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["userTermsAgreed"], true);
    assert_eq!(body["organizerTermsAgreed"], true);

    let response = app
        .router
        .clone()
        .oneshot(authed(Method::POST, "/api/profile/organizer-application", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "organizer_pending");

    let response = app
        .router
        .oneshot(authed(Method::POST, "/api/profile/organizer-application", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn empty_terms_request_is_rejected() {
    let app = TestApp::spawn().await;
    app.add_user("u1", Role::User);
    let token = app.id_token("u1");

    let response = app
        .router
        .oneshot(authed(Method::POST, "/api/profile/terms", &token, Some(json!({}))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
