// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Billing webhook tests: provider events drive subscription transitions
//! and the entitlements that flow from them.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use tribewell::models::SubscriptionStatus;
use tribewell::services::entitlements;

mod common;

async fn post_event(app: &Router, token: Option<&str>, body: serde_json::Value) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/billing")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("x-billing-token", token);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_webhook_rejects_bad_token() {
    let (app, _) = common::create_test_app();

    let status = post_event(
        &app,
        Some("wrong"),
        json!({"event_type": "subscription.activated", "user_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let status = post_event(
        &app,
        None,
        json!({"event_type": "subscription.activated", "user_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_activation_grants_full_capabilities() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Guest).await;
    let token = state.config.billing_verify_token.clone();

    let status = post_event(
        &app,
        Some(&token),
        json!({"event_type": "subscription.activated", "user_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let user = state.db.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.status, SubscriptionStatus::Active);
    let ents = entitlements::resolve_for(&user, chrono::Utc::now());
    assert!(ents.capabilities.can_monetize_tribe);
}

#[tokio::test]
async fn test_cancellation_opens_grace_window() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Active).await;
    let token = state.config.billing_verify_token.clone();

    let status = post_event(
        &app,
        Some(&token),
        json!({"event_type": "subscription.cancelled", "user_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let user = state.db.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.status, SubscriptionStatus::Cancelled);
    let ents = entitlements::resolve_for(&user, chrono::Utc::now());
    assert!(ents.is_in_grace_period);
    assert!(ents.capabilities.can_access_matching_directory);
    assert!(!ents.capabilities.can_join_tribes);
}

#[tokio::test]
async fn test_payment_failure_degrades_to_grace() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Active).await;
    let token = state.config.billing_verify_token.clone();

    let status = post_event(
        &app,
        Some(&token),
        json!({"event_type": "payment.failed", "user_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let user = state.db.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.status, SubscriptionStatus::GracePeriod);
    assert!(user.grace_window.is_some());
}

#[tokio::test]
async fn test_unknown_event_and_malformed_payload_are_acknowledged() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 1, SubscriptionStatus::Active).await;
    let token = state.config.billing_verify_token.clone();

    // Unknown event types are acknowledged and ignored.
    let status = post_event(
        &app,
        Some(&token),
        json!({"event_type": "invoice.created", "user_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Malformed payloads are acknowledged to stop provider retries.
    let status = post_event(&app, Some(&token), json!({"unexpected": true})).await;
    assert_eq!(status, StatusCode::OK);

    let user = state.db.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_event_for_unknown_user_returns_error_for_retry() {
    let (app, state) = common::create_test_app();
    let token = state.config.billing_verify_token.clone();

    let status = post_event(
        &app,
        Some(&token),
        json!({"event_type": "subscription.activated", "user_id": 404}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
