// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use tribewell::config::Config;
use tribewell::db::Store;
use tribewell::models::{ProfileTier, SubscriptionStatus, User};
use tribewell::routes::create_router;
use tribewell::services::BadgeCatalog;
use tribewell::AppState;

/// Create a test app over a fresh in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = Store::new();
    let state = Arc::new(AppState::build(config, db, BadgeCatalog::builtin()));
    (create_router(state.clone()), state)
}

/// Seed a user with the given subscription status.
#[allow(dead_code)]
pub async fn seed_user(state: &AppState, id: u64, status: SubscriptionStatus) -> User {
    let mut user = User::new(id, format!("user-{}", id), chrono::Utc::now());
    user.status = status;
    state.db.upsert_user(&user).await.expect("Failed to seed user");
    user
}

/// Seed a Creator-tier user (full capability set regardless of status).
#[allow(dead_code)]
pub async fn seed_creator(state: &AppState, id: u64) -> User {
    let mut user = User::new(id, format!("creator-{}", id), chrono::Utc::now());
    user.profile_tier = ProfileTier::Creator;
    state.db.upsert_user(&user).await.expect("Failed to seed user");
    user
}

/// Create a session JWT for a seeded user.
#[allow(dead_code)]
pub fn token_for(state: &AppState, user_id: u64) -> String {
    tribewell::middleware::auth::create_jwt(user_id, &state.config.jwt_signing_key)
        .expect("Failed to create test JWT")
}
