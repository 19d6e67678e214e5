// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle management.
//!
//! Handles:
//! - Proactive refresh of credentials inside the refresh-ahead window
//! - Per-connection exponential backoff on transient failures
//! - Auth revocation (connection parked in `error` until the user
//!   re-authorizes)
//! - OAuth callback handling and user disconnect
//!
//! Refreshes for different connections run in parallel, bounded by
//! the per-provider semaphore; refresh of a single connection is
//! single-flight via a per-connection lock.

use crate::db::Database;
use crate::error::{Result, SyncError};
use crate::models::{ConnectionStatus, Provider, WearableConnection};
use crate::providers::{ProviderRegistry, ProviderTokens};
use crate::scheduler::{Job, Shutdown};
use crate::services::crypto::FieldCodec;
use crate::time_utils::Clock;
use chrono::Duration;
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Upper bound on refresh tasks in flight across all providers.
const MAX_CONCURRENT_REFRESHES: usize = 32;

/// Base delay for per-connection refresh backoff.
const BACKOFF_BASE_SECS: i64 = 60;

/// Backoff ceiling; one provider outage never parks a connection
/// for more than an hour.
const BACKOFF_CAP_SECS: i64 = 3600;

/// Shared per-connection refresh locks.
pub type RefreshLocks = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

/// Manages OAuth credential lifecycles for all wearable connections.
#[derive(Clone)]
pub struct TokenService {
    db: Arc<dyn Database>,
    codec: FieldCodec,
    registry: Arc<ProviderRegistry>,
    clock: Arc<dyn Clock>,
    refresh_ahead: Duration,
    /// Per-connection mutex to serialize refresh operations.
    refresh_locks: RefreshLocks,
}

impl TokenService {
    pub fn new(
        db: Arc<dyn Database>,
        codec: FieldCodec,
        registry: Arc<ProviderRegistry>,
        clock: Arc<dyn Clock>,
        refresh_ahead: Duration,
    ) -> Self {
        Self {
            db,
            codec,
            registry,
            clock,
            refresh_ahead,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// One scheduler tick: refresh every connection whose token expires
    /// inside the refresh-ahead window.
    pub async fn tick(&self, shutdown: &Shutdown) -> Result<()> {
        let now = self.clock.now_utc();
        let due: Vec<WearableConnection> = self
            .db
            .list_connections()
            .await?
            .into_iter()
            .filter(|c| {
                c.is_live()
                    && c.token_expires_at <= now + self.refresh_ahead
                    && c.next_retry_at.is_none_or(|t| t <= now)
            })
            .collect();

        if due.is_empty() {
            return Ok(());
        }
        tracing::info!(count = due.len(), "Connections due for token refresh");

        stream::iter(due)
            .for_each_concurrent(MAX_CONCURRENT_REFRESHES, |conn| async move {
                if shutdown.is_cancelled() {
                    return;
                }
                let connection_id = conn.id;
                let provider = conn.provider;
                if let Err(e) = self.refresh_bounded(conn).await {
                    tracing::warn!(
                        %connection_id,
                        %provider,
                        error = %e,
                        "Token refresh attempt failed"
                    );
                }
            })
            .await;

        Ok(())
    }

    /// Refresh one connection under its provider's concurrency cap.
    async fn refresh_bounded(&self, conn: WearableConnection) -> Result<()> {
        let semaphore = self.registry.semaphore(conn.provider)?;
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Transient("provider semaphore closed".to_string()))?;
        self.refresh_connection(conn.id).await
    }

    /// Single-flight refresh of one connection.
    ///
    /// Re-reads the record after taking the lock: a concurrent caller
    /// may already have refreshed while we waited.
    pub async fn refresh_connection(&self, connection_id: Uuid) -> Result<()> {
        let lock = self
            .refresh_locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let Some(mut conn) = self.db.get_connection(connection_id).await? else {
            return Ok(());
        };
        let now = self.clock.now_utc();
        if !conn.is_live() || conn.token_expires_at > now + self.refresh_ahead {
            return Ok(());
        }

        let refresh_token = match self.codec.decrypt(&conn.refresh_token) {
            Ok(token) => token,
            Err(e) => {
                // Tampered or undecryptable record: park it rather than
                // hot-looping on every tick.
                conn.status = ConnectionStatus::Error;
                self.db.upsert_connection(&conn).await?;
                tracing::error!(
                    connection_id = %conn.id,
                    error = %e,
                    "Stored refresh token failed integrity check"
                );
                return Err(e);
            }
        };
        let client = self.registry.client(conn.provider)?;

        match client.refresh(&refresh_token).await {
            Ok(tokens) => {
                self.store_refreshed(&mut conn, &tokens).await?;
                tracing::info!(
                    connection_id = %conn.id,
                    provider = %conn.provider,
                    "Token refreshed"
                );
                Ok(())
            }
            Err(e) if e.is_auth_revoked() => {
                conn.status = ConnectionStatus::Error;
                conn.next_retry_at = None;
                self.db.upsert_connection(&conn).await?;
                tracing::warn!(
                    connection_id = %conn.id,
                    provider = %conn.provider,
                    "Refresh token revoked, reconnect required"
                );
                Ok(())
            }
            Err(e) => {
                // Transient (or unexpected) failure: tokens unchanged,
                // per-connection backoff schedules the retry.
                let delay = backoff_delay(conn.refresh_failures);
                conn.next_retry_at = Some(now + delay);
                conn.refresh_failures = conn.refresh_failures.saturating_add(1);
                self.db.upsert_connection(&conn).await?;
                tracing::warn!(
                    connection_id = %conn.id,
                    provider = %conn.provider,
                    retry_in_secs = delay.num_seconds(),
                    error = %e,
                    "Transient refresh failure, backing off"
                );
                Ok(())
            }
        }
    }

    /// A valid access token for this connection, refreshing first when
    /// the stored one is inside the refresh-ahead margin.
    pub async fn valid_access_token(&self, connection_id: Uuid) -> Result<String> {
        let conn = self
            .db
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("connection {}", connection_id)))?;

        if conn.status == ConnectionStatus::Error {
            return Err(SyncError::AuthRevoked("connection needs reconnect".to_string()));
        }
        if !conn.is_live() {
            return Err(SyncError::NotFound(format!(
                "connection {} is disconnected",
                connection_id
            )));
        }

        let now = self.clock.now_utc();
        if conn.token_expires_at > now + self.refresh_ahead {
            return self.codec.decrypt(&conn.access_token);
        }

        self.refresh_connection(connection_id).await?;

        let conn = self
            .db
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("connection {}", connection_id)))?;
        if conn.status == ConnectionStatus::Error {
            return Err(SyncError::AuthRevoked("connection needs reconnect".to_string()));
        }
        if conn.token_expires_at <= self.clock.now_utc() {
            return Err(SyncError::Transient("token refresh pending retry".to_string()));
        }
        self.codec.decrypt(&conn.access_token)
    }

    /// Handle OAuth callback: exchange the code and store a fresh
    /// active connection with encrypted tokens.
    pub async fn handle_oauth_callback(
        &self,
        user_id: Uuid,
        provider: Provider,
        code: &str,
    ) -> Result<WearableConnection> {
        let client = self.registry.client(provider)?;
        let tokens = client.exchange_code(code).await?;
        let external_account_id = tokens
            .account_id
            .clone()
            .ok_or_else(|| SyncError::Validation("exchange response missing account id".to_string()))?;

        let conn = WearableConnection {
            id: Uuid::new_v4(),
            user_id,
            provider,
            external_account_id,
            access_token: self.codec.encrypt(&tokens.access_token)?,
            refresh_token: self.codec.encrypt(&tokens.refresh_token)?,
            token_expires_at: tokens.expires_at,
            status: ConnectionStatus::Active,
            last_synced_at: None,
            sync_cursor: None,
            next_retry_at: None,
            refresh_failures: 0,
            deleted_at: None,
        };
        self.db.upsert_connection(&conn).await?;

        tracing::info!(
            connection_id = %conn.id,
            %user_id,
            %provider,
            "Connection created from OAuth callback"
        );
        Ok(conn)
    }

    /// Soft-delete a connection on user disconnect.
    pub async fn disconnect(&self, connection_id: Uuid) -> Result<()> {
        let Some(mut conn) = self.db.get_connection(connection_id).await? else {
            return Ok(());
        };
        conn.status = ConnectionStatus::Revoked;
        conn.deleted_at = Some(self.clock.now_utc());
        self.db.upsert_connection(&conn).await?;
        tracing::info!(connection_id = %conn.id, "Connection disconnected");
        Ok(())
    }

    async fn store_refreshed(
        &self,
        conn: &mut WearableConnection,
        tokens: &ProviderTokens,
    ) -> Result<()> {
        conn.access_token = self.codec.encrypt(&tokens.access_token)?;
        conn.refresh_token = self.codec.encrypt(&tokens.refresh_token)?;
        conn.token_expires_at = tokens.expires_at;
        conn.next_retry_at = None;
        conn.refresh_failures = 0;
        self.db.upsert_connection(conn).await
    }
}

#[async_trait::async_trait]
impl Job for TokenService {
    async fn run(&self, shutdown: Shutdown) -> Result<()> {
        self.tick(&shutdown).await
    }
}

/// Exponential per-connection backoff: 60s, 120s, 240s, capped at 1h.
fn backoff_delay(failures: u32) -> Duration {
    let secs = BACKOFF_BASE_SECS
        .saturating_mul(1i64 << failures.min(10))
        .min(BACKOFF_CAP_SECS);
    Duration::seconds(secs)
}
