//! Application configuration loaded from environment variables.
//!
//! Engine magnitudes (XP deltas, level thresholds, window lengths) are
//! configuration, not constants. They live in [`EngineTuning`] so deploys
//! can adjust reward/penalty economy without a code change.

use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Shared secret the external scheduler presents on /tasks/run-sweep
    pub sweep_auth_token: String,
    /// Verification token for billing webhook events
    pub billing_verify_token: String,
    /// Reward/penalty economy tuning
    pub tuning: EngineTuning,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            sweep_auth_token: env::var("SWEEP_AUTH_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SWEEP_AUTH_TOKEN"))?,
            billing_verify_token: env::var("BILLING_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("BILLING_VERIFY_TOKEN"))?,
            tuning: EngineTuning::default(),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            sweep_auth_token: "test_sweep_token".to_string(),
            billing_verify_token: "test_billing_token".to_string(),
            tuning: EngineTuning::default(),
        }
    }
}

/// XP and subscription-window tuning.
///
/// Level thresholds are a monotonic step function over lifetime XP: the
/// level is the number of thresholds at or below the lifetime total, so the
/// first threshold must be 0 and the list must be strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTuning {
    /// Lifetime-XP thresholds; index+1 is the level reached at that value
    pub level_thresholds: Vec<i64>,
    /// XP awarded for a completed weekly check-in
    pub checkin_completed_xp: i64,
    /// XP penalty (negative) for a missed weekly check-in
    pub checkin_missed_xp: i64,
    /// XP awarded for submitting feedback
    pub feedback_given_xp: i64,
    /// XP awarded for receiving a peer review
    pub peer_reviewed_xp: i64,
    /// XP awarded on joining a tribe
    pub tribe_joined_xp: i64,
    /// XP awarded to each side of a mutual match
    pub match_formed_xp: i64,
    /// Length of a new trial window in days
    pub trial_days: i64,
    /// Length of the grace window opened on cancellation/payment failure
    pub grace_days: i64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            level_thresholds: vec![0, 100, 250, 500, 1000, 2000, 4000, 8000],
            checkin_completed_xp: 10,
            checkin_missed_xp: -5,
            feedback_given_xp: 2,
            peer_reviewed_xp: 3,
            tribe_joined_xp: 5,
            match_formed_xp: 8,
            trial_days: 14,
            grace_days: 7,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
