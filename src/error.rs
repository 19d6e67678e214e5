// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Engine error types.
//!
//! The taxonomy drives retry behavior:
//! - `Transient` — retried with per-connection backoff, watermarks not advanced
//! - `AuthRevoked` — connection moves to `error` status, no auto-retry
//! - `DataIntegrity` — decryption authentication failure, fatal for that record
//! - `Validation` — malformed provider payload item, skipped and logged

/// Engine error type shared by all background services.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Network or provider outage; safe to retry later.
    #[error("Transient I/O error: {0}")]
    Transient(String),

    /// Refresh token invalid or revoked by the provider.
    #[error("Authorization revoked: {0}")]
    AuthRevoked(String),

    /// Decryption failed authentication; never return corrupted plaintext.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Malformed provider payload item; skip it, continue the batch.
    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// True for failures that should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// True when the provider rejected our credentials outright.
    pub fn is_auth_revoked(&self) -> bool {
        matches!(self, SyncError::AuthRevoked(_))
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
