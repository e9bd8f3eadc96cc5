// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for billing provider events.
//!
//! Payment integration itself lives with the provider; only the
//! subscription transitions it triggers matter here.

use crate::services::entitlements;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Header carrying the provider's verification token.
const BILLING_TOKEN_HEADER: &str = "x-billing-token";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/billing", post(handle_event))
}

/// Billing webhook event payload.
#[derive(Deserialize, Debug)]
struct BillingEvent {
    /// "subscription.activated", "subscription.cancelled", "payment.failed"
    event_type: String,
    user_id: u64,
}

/// Handle incoming billing events (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    // Validate the provider token before trusting anything in the body.
    let token_ok = headers
        .get(BILLING_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|token| token == state.config.billing_verify_token)
        .unwrap_or(false);

    if !token_ok {
        tracing::warn!("Security Alert: Billing webhook token mismatch");
        return StatusCode::FORBIDDEN;
    }

    let event: BillingEvent = match serde_json::from_value(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse billing event");
            return StatusCode::OK; // Still return 200 to the provider to avoid retries
        }
    };

    tracing::info!(
        event_type = %event.event_type,
        user_id = event.user_id,
        "Billing event received"
    );

    let now = chrono::Utc::now();
    let tuning = state.config.tuning.clone();
    let result = match event.event_type.as_str() {
        "subscription.activated" => {
            state
                .db
                .update_user(event.user_id, |u| {
                    entitlements::activate_subscription(u);
                    Ok(())
                })
                .await
        }
        "subscription.cancelled" => {
            state
                .db
                .update_user(event.user_id, move |u| {
                    entitlements::cancel_subscription(u, now, &tuning);
                    Ok(())
                })
                .await
        }
        "payment.failed" => {
            state
                .db
                .update_user(event.user_id, move |u| {
                    entitlements::payment_failed(u, now, &tuning);
                    Ok(())
                })
                .await
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Ignoring unhandled billing event");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, user_id = event.user_id, "Failed to apply billing event");
        // 500 triggers a provider retry; the transitions are idempotent.
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    StatusCode::OK
}
