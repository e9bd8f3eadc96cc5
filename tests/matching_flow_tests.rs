// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Matching protocol flows over the HTTP surface.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use tribewell::config::EngineTuning;
use tribewell::models::SubscriptionStatus;
use tribewell::services::entitlements;

mod common;

async fn send(app: &Router, method: &str, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_mutual_like_forms_match() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Active).await;
    common::seed_user(&state, 2, SubscriptionStatus::Active).await;
    let alice = common::token_for(&state, 1);
    let bob = common::token_for(&state, 2);

    let (status, outcome) = send(
        &app,
        "POST",
        "/api/matches/2",
        &alice,
        json!({"decision": "like"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "pending");
    assert_eq!(outcome["is_match"], false);

    let (status, outcome) = send(
        &app,
        "POST",
        "/api/matches/1",
        &bob,
        json!({"decision": "like"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "accepted");
    assert_eq!(outcome["is_match"], true);

    // Both sides collected the match XP.
    let tuning = EngineTuning::default();
    for id in [1, 2] {
        let user = state.db.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.current_xp, tuning.match_formed_xp);
    }
}

#[tokio::test]
async fn test_repeat_decision_is_benign() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Active).await;
    common::seed_user(&state, 2, SubscriptionStatus::Active).await;
    let alice = common::token_for(&state, 1);

    let (status, first) = send(
        &app,
        "POST",
        "/api/matches/2",
        &alice,
        json!({"decision": "pass"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "rejected");
    assert_eq!(first["applied"], true);

    // Repeat on the decided pair: HTTP success, nothing applied.
    let (status, second) = send(
        &app,
        "POST",
        "/api/matches/2",
        &alice,
        json!({"decision": "like"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["applied"], false);
    assert_eq!(second["status"], "rejected");
}

#[tokio::test]
async fn test_self_target_conflicts() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Active).await;
    let alice = common::token_for(&state, 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/matches/1",
        &alice,
        json!({"decision": "like"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_grace_period_keeps_directory_but_blocks_decisions() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 2, SubscriptionStatus::Active).await;

    let now = chrono::Utc::now();
    let mut user = tribewell::models::User::new(1, "Fading", now);
    user.status = SubscriptionStatus::Active;
    entitlements::cancel_subscription(&mut user, now, &EngineTuning::default());
    state.db.upsert_user(&user).await.unwrap();
    let fading = common::token_for(&state, 1);

    let request = Request::builder()
        .method("GET")
        .uri("/api/matches/directory")
        .header(header::AUTHORIZATION, format!("Bearer {}", fading))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/matches/2",
        &fading,
        json!({"decision": "like"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["details"].as_str().unwrap().contains("read-only"));
}

#[tokio::test]
async fn test_expired_user_loses_directory() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Expired).await;
    let expired = common::token_for(&state, 1);

    let request = Request::builder()
        .method("GET")
        .uri("/api/matches/directory")
        .header(header::AUTHORIZATION, format!("Bearer {}", expired))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
