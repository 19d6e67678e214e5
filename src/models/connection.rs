// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable connection model (one row per linked provider account).

use crate::services::crypto::EncryptedField;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported wearable providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Fitbit,
    Garmin,
    Oura,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Fitbit, Provider::Garmin, Provider::Oura];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Fitbit => "fitbit",
            Provider::Garmin => "garmin",
            Provider::Oura => "oura",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fitbit" => Ok(Provider::Fitbit),
            "garmin" => Ok(Provider::Garmin),
            "oura" => Ok(Provider::Oura),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Tokens valid (or refreshable); eligible for sync.
    Active,
    /// Refresh token rejected; user must re-authorize.
    Error,
    /// User disconnected; kept for audit, never synced.
    Revoked,
}

/// A user's link to one wearable provider account.
///
/// Tokens are stored encrypted; plaintext never touches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WearableConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: Provider,
    /// Account identifier on the provider's side.
    pub external_account_id: String,
    pub access_token: EncryptedField,
    pub refresh_token: EncryptedField,
    pub token_expires_at: DateTime<Utc>,
    pub status: ConnectionStatus,
    /// Last successful sync completion; None until first sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Opaque provider cursor for incremental fetches.
    pub sync_cursor: Option<String>,
    /// Earliest instant the next refresh attempt is allowed.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Consecutive transient refresh failures (backoff exponent).
    pub refresh_failures: u32,
    /// Soft-delete marker set on user disconnect.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WearableConnection {
    /// True when this connection should be considered by background jobs.
    pub fn is_live(&self) -> bool {
        self.status == ConnectionStatus::Active && self.deleted_at.is_none()
    }
}
