// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tribewell API Server
//!
//! Community goal tracking: subscription entitlements, the engagement
//! ledger, tribe admission control, and partner matching.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tribewell::{config::Config, db::Store, services::BadgeCatalog, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Tribewell API");

    // Load badge catalog
    let badge_path = "data/badges.json";
    tracing::info!(path = badge_path, "Loading badge catalog");
    let badges = BadgeCatalog::load_from_file(badge_path).expect("Failed to load badge catalog");
    tracing::info!(count = badges.badges().len(), "Badge catalog loaded");

    // Embedded store; persistence is delegated to the deployment
    let db = Store::new();

    // Build shared state
    let state = Arc::new(AppState::build(config, db, badges));

    // Build router
    let app = tribewell::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tribewell=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
