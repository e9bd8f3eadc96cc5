// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod admission;
pub mod badges;
pub mod entitlements;
pub mod ledger;
pub mod matching;
pub mod sweep;

pub use admission::{AdmissionService, NewTribe};
pub use badges::BadgeCatalog;
pub use entitlements::{CapabilitySet, Entitlements};
pub use ledger::LedgerService;
pub use matching::MatchService;
pub use sweep::{SweepReport, SweepService};
