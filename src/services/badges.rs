// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Badge catalog loading and evaluation service.

use crate::models::{Badge, BadgeRule, UserAggregates};
use std::fs;
use std::path::Path;

/// Service holding the badge catalog.
#[derive(Debug, Default, Clone)]
pub struct BadgeCatalog {
    badges: Vec<Badge>,
}

impl BadgeCatalog {
    /// Load the catalog from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, BadgeCatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| BadgeCatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load the catalog from a JSON string.
    pub fn load_from_json(json_data: &str) -> Result<Self, BadgeCatalogError> {
        let badges: Vec<Badge> = serde_json::from_str(json_data)
            .map_err(|e| BadgeCatalogError::ParseError(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for badge in &badges {
            if !seen.insert(badge.id.clone()) {
                return Err(BadgeCatalogError::DuplicateId(badge.id.clone()));
            }
        }

        tracing::info!(count = badges.len(), "Loaded badge catalog");
        Ok(Self { badges })
    }

    /// Built-in catalog used when no file is supplied (and in tests).
    pub fn builtin() -> Self {
        Self {
            badges: vec![
                Badge {
                    id: "first-ritual".to_string(),
                    name: "First Ritual".to_string(),
                    rule: BadgeRule::MinCheckins { count: 1 },
                },
                Badge {
                    id: "month-of-momentum".to_string(),
                    name: "Month of Momentum".to_string(),
                    rule: BadgeRule::MinStreak { weeks: 4 },
                },
                Badge {
                    id: "level-five".to_string(),
                    name: "Seasoned".to_string(),
                    rule: BadgeRule::MinLevel { level: 5 },
                },
                Badge {
                    id: "helping-hand".to_string(),
                    name: "Helping Hand".to_string(),
                    rule: BadgeRule::MinFeedbackGiven { count: 5 },
                },
                Badge {
                    id: "well-regarded".to_string(),
                    name: "Well Regarded".to_string(),
                    rule: BadgeRule::MinReviewsReceived { count: 3 },
                },
                Badge {
                    id: "joiner".to_string(),
                    name: "Joiner".to_string(),
                    rule: BadgeRule::MinTribesJoined { count: 1 },
                },
                Badge {
                    id: "kindred-spirit".to_string(),
                    name: "Kindred Spirit".to_string(),
                    rule: BadgeRule::MinMatchesFormed { count: 1 },
                },
            ],
        }
    }

    /// Get the catalog entries.
    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    /// Badges whose predicates hold for the given aggregates.
    pub fn satisfied<'a>(&'a self, stats: &UserAggregates) -> Vec<&'a Badge> {
        self.badges.iter().filter(|b| b.rule.is_satisfied(stats)).collect()
    }
}

/// Errors from badge catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum BadgeCatalogError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse badge catalog: {0}")]
    ParseError(String),

    #[error("Duplicate badge id: {0}")]
    DuplicateId(String),
}
