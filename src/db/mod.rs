// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (embedded transactional store).

pub mod memory;

pub use memory::{LedgerCtx, Store, SweepAction};
