// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Tribewell: community goal tracking with tribes, rituals, and partner
//! matching.
//!
//! This crate provides the backend API for the engagement engine:
//! subscription-derived entitlements, the idempotent XP/reputation ledger
//! with achievement unlocking, capacity-bounded tribe admission control,
//! and the reciprocal two-party matching protocol.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{AdmissionService, BadgeCatalog, LedgerService, MatchService, SweepService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Store,
    pub badges: BadgeCatalog,
    pub ledger: LedgerService,
    pub admission: AdmissionService,
    pub matches: MatchService,
    pub sweep: SweepService,
}

impl AppState {
    /// Wire the service graph over one store.
    pub fn build(config: Config, db: Store, badges: BadgeCatalog) -> Self {
        let ledger = LedgerService::new(db.clone(), config.tuning.clone(), badges.clone());
        let admission = AdmissionService::new(db.clone(), ledger.clone());
        let matches = MatchService::new(db.clone(), ledger.clone());
        let sweep = SweepService::new(db.clone(), ledger.clone());
        Self {
            config,
            db,
            badges,
            ledger,
            admission,
            matches,
            sweep,
        }
    }
}
