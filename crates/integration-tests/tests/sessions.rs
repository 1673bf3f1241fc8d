//! Session lifecycle over HTTP: sign-up, sign-in, expiry and sign-out.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::{Method, StatusCode};
use chrono::TimeDelta;
use serde_json::json;

use marketstall_integration_tests::TestApp;
use marketstall_storefront::session::{SESSION_COOKIE_NAME, SESSION_PATHS};

#[tokio::test]
async fn test_registered_user_can_read_their_profile() {
    let app = TestApp::new();
    let cookie = app.register("Ada@Example.com", "Ada").await;

    let me = app.send(Method::GET, "/auth/me", Some(&cookie), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["primary"], true);
    assert_eq!(me.body["data"]["email"], "ada@example.com");
    assert_eq!(me.body["data"]["role"], "user");
    assert!(me.body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.register("ada@example.com", "Ada").await;

    let again = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "email": " ADA@example.com ",
                "name": "Ada Again",
                "password": "another long password",
            })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_logout_clears_every_cookie_path() {
    let app = TestApp::new();
    let cookie = app.register("ada@example.com", "Ada").await;

    let out = app
        .send(Method::POST, "/auth/logout", Some(&cookie), None)
        .await;
    assert_eq!(out.status, StatusCode::NO_CONTENT);
    let cleared = out.set_cookies();
    assert_eq!(cleared.len(), SESSION_PATHS.len() * 3);
    assert!(
        cleared
            .iter()
            .all(|c| c.starts_with(&format!("{SESSION_COOKIE_NAME}=;")))
    );
    assert!(out.session_cookie().is_none());

    let me = app.send(Method::GET, "/auth/me", None, None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_expires_after_seven_days() {
    let app = TestApp::new();
    let cookie = app.register("ada@example.com", "Ada").await;

    app.clock.advance(TimeDelta::days(7) - TimeDelta::minutes(1));
    let me = app.send(Method::GET, "/auth/me", Some(&cookie), None).await;
    assert_eq!(me.status, StatusCode::OK);

    app.clock.advance(TimeDelta::minutes(1));
    let me = app.send(Method::GET, "/auth/me", Some(&cookie), None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_cookie_is_rejected() {
    let app = TestApp::new();
    let cookie = app.register("ada@example.com", "Ada").await;

    let prefix = format!("{SESSION_COOKIE_NAME}=");
    let token = cookie.strip_prefix(&prefix).unwrap();
    let replacement = if token.starts_with('A') { "B" } else { "A" };
    let tampered = format!("{prefix}{replacement}{}", &token[1..]);

    let me = app.send(Method::GET, "/auth/me", Some(&tampered), None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_merges_guest_cart() {
    let app = TestApp::new();
    let cookie = app.register("ada@example.com", "Ada").await;
    app.send(
        Method::POST,
        "/cart/items",
        Some(&cookie),
        Some(json!({ "items": [{ "id": "mug", "quantity": 1 }] })),
    )
    .await;

    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({
                "email": "ada@example.com",
                "password": "correct horse battery",
                "cart": [{ "id": "mug", "quantity": 2 }, { "id": "tote", "color": "red" }],
            })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
    let fresh = login.session_cookie().unwrap();

    let cart = app.send(Method::GET, "/cart", Some(&fresh), None).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(
        cart.body["data"]["items"],
        json!([{ "id": "mug", "quantity": 3 }, { "id": "tote", "color": "red" }])
    );
}

#[tokio::test]
async fn test_wrong_password_is_unauthenticated() {
    let app = TestApp::new();
    app.register("ada@example.com", "Ada").await;

    for (email, password) in [
        ("ada@example.com", "not the password"),
        ("nobody@example.com", "correct horse battery"),
    ] {
        let login = app
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(login.status, StatusCode::UNAUTHORIZED);
        assert!(login.session_cookie().is_none());
    }
}
