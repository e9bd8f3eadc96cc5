// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Protected routes accept requests with valid tokens
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;
use tribewell::models::SubscriptionStatus;

mod common;

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Should return 401 Unauthorized without token
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::AUTHORIZATION, "Bearer invalid.token.here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_valid_token() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 42, SubscriptionStatus::Active).await;
    let token = common::token_for(&state, 42);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_valid_token_for_unknown_user_is_not_found() {
    let (app, state) = common::create_test_app();
    let token = common::token_for(&state, 999);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Auth passes; the user row simply does not exist.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let (app, state) = common::create_test_app();
    common::seed_user(&state, 7, SubscriptionStatus::Active).await;
    let token = common::token_for(&state, 7);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::COOKIE, format!("tribewell_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/me")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // OPTIONS should return 200 (CORS preflight success)
    assert_eq!(response.status(), StatusCode::OK);

    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Health should be accessible without auth
    assert_eq!(response.status(), StatusCode::OK);
}
