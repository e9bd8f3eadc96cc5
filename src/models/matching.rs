// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reciprocal match models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one directed match record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Rejected,
    Accepted,
}

/// A user's decision toward a directory candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Like,
    Pass,
}

/// Directed match record, unique per ordered `(initiator_id, target_id)`
/// pair. A reciprocal pair of Accepted records is one mutual match and is
/// immutable from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub initiator_id: u64,
    pub target_id: u64,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome reported to the caller of a match decision.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    /// Status of the acting user's directed record after the call
    pub status: MatchStatus,
    /// True when both directions are Accepted
    pub is_match: bool,
    /// False when the ordered pair was already decided (benign no-op)
    pub applied: bool,
}

/// Order-independent key for a pair of users, used for match-formed XP
/// idempotency and per-pair serialization.
pub fn pair_key(a: u64, b: u64) -> (u64, u64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_symmetric() {
        assert_eq!(pair_key(3, 7), pair_key(7, 3));
        assert_eq!(pair_key(5, 5), (5, 5));
    }
}
