// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable data synchronization.
//!
//! Per due connection: fetch raw readings from the provider (cursored,
//! token validity confirmed first), normalize into the canonical
//! metric vocabulary, persist the raw audit trail, then recompute the
//! merged per-day rows for every (user, local day, metric) touched.
//! Re-running over already-seen raw data reproduces the same merged
//! rows; nothing duplicates or inflates.

use crate::db::Database;
use crate::error::{Result, SyncError};
use crate::models::{
    BiometricReading, ConnectionStatus, MergedBiometricDay, MergedDayKey, MetricType, Provider,
    WearableConnection,
};
use crate::providers::{ProviderRegistry, RawReadingItem};
use crate::scheduler::{Job, Shutdown};
use crate::services::tokens::TokenService;
use crate::time_utils::{Clock, TimeContext};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use futures_util::{stream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on connections syncing in flight across all providers.
const MAX_CONCURRENT_SYNCS: usize = 16;

/// Pages pulled per connection per tick; the cursor carries the rest
/// to the next tick.
const MAX_PAGES_PER_TICK: usize = 10;

/// How one metric's per-day value is derived from multiple providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The highest-priority provider present is authoritative.
    PriorityOverride,
    /// Newest reading wins regardless of source.
    MostRecentWrite,
    /// Sum of each provider's latest reading. Only for metrics
    /// explicitly marked additive.
    Additive,
}

/// Per-metric merge configuration.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Provider priority, most authoritative first.
    pub provider_priority: Vec<Provider>,
    pub policies: HashMap<MetricType, MergePolicy>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        let mut policies = HashMap::new();
        // Continuous wearables are authoritative for accumulated
        // metrics; point-in-time vitals take the newest reading.
        policies.insert(MetricType::Steps, MergePolicy::PriorityOverride);
        policies.insert(MetricType::ActiveCalories, MergePolicy::PriorityOverride);
        policies.insert(MetricType::SleepMinutes, MergePolicy::PriorityOverride);
        policies.insert(MetricType::HeartRate, MergePolicy::MostRecentWrite);
        policies.insert(MetricType::Weight, MergePolicy::MostRecentWrite);
        Self {
            provider_priority: vec![Provider::Garmin, Provider::Fitbit, Provider::Oura],
            policies,
        }
    }
}

impl MergeConfig {
    pub fn policy(&self, metric: MetricType) -> MergePolicy {
        self.policies
            .get(&metric)
            .copied()
            .unwrap_or(MergePolicy::MostRecentWrite)
    }

    fn priority_rank(&self, provider: Provider) -> usize {
        self.provider_priority
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(self.provider_priority.len())
    }
}

/// Pulls, normalizes, and merges biometric data for due connections.
#[derive(Clone)]
pub struct SyncService {
    db: Arc<dyn Database>,
    tokens: TokenService,
    registry: Arc<ProviderRegistry>,
    time: TimeContext,
    clock: Arc<dyn Clock>,
    sync_interval: chrono::Duration,
    merge: MergeConfig,
}

impl SyncService {
    pub fn new(
        db: Arc<dyn Database>,
        tokens: TokenService,
        registry: Arc<ProviderRegistry>,
        time: TimeContext,
        clock: Arc<dyn Clock>,
        sync_interval: chrono::Duration,
        merge: MergeConfig,
    ) -> Self {
        Self {
            db,
            tokens,
            registry,
            time,
            clock,
            sync_interval,
            merge,
        }
    }

    /// One scheduler tick: sync every connection whose last successful
    /// sync is older than the configured interval.
    pub async fn tick(&self, shutdown: &Shutdown) -> Result<()> {
        let now = self.clock.now_utc();
        let due: Vec<WearableConnection> = self
            .db
            .list_connections()
            .await?
            .into_iter()
            .filter(|c| c.is_live() && c.last_synced_at.is_none_or(|t| t + self.sync_interval <= now))
            .collect();

        if due.is_empty() {
            return Ok(());
        }
        tracing::info!(count = due.len(), "Connections due for sync");

        stream::iter(due)
            .for_each_concurrent(MAX_CONCURRENT_SYNCS, |conn| async move {
                if shutdown.is_cancelled() {
                    return;
                }
                if let Err(e) = self.sync_bounded(&conn, shutdown).await {
                    // One connection's failure never affects the rest
                    // of the tick; its watermark stays put.
                    tracing::warn!(
                        connection_id = %conn.id,
                        provider = %conn.provider,
                        error = %e,
                        "Sync failed for connection"
                    );
                    if e.is_auth_revoked() {
                        if let Err(park) = self.park_connection(conn.id).await {
                            tracing::error!(
                                connection_id = %conn.id,
                                error = %park,
                                "Failed to park revoked connection"
                            );
                        }
                    }
                }
            })
            .await;

        Ok(())
    }

    async fn sync_bounded(&self, conn: &WearableConnection, shutdown: &Shutdown) -> Result<()> {
        let semaphore = self.registry.semaphore(conn.provider)?;
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Transient("provider semaphore closed".to_string()))?;
        self.sync_connection(conn, shutdown).await
    }

    /// Full pipeline for one connection. Causal order is scoped here:
    /// the token is confirmed valid before the fetch proceeds.
    async fn sync_connection(&self, conn: &WearableConnection, shutdown: &Shutdown) -> Result<()> {
        let access_token = self.tokens.valid_access_token(conn.id).await?;
        let client = self.registry.client(conn.provider)?;

        let user = self
            .db
            .get_user(conn.user_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("user {}", conn.user_id)))?;
        let tz = self.time.resolve(user.timezone.as_deref());

        let mut cursor = conn.sync_cursor.clone();
        let mut touched: BTreeSet<(NaiveDate, MetricType)> = BTreeSet::new();
        let mut stored = 0usize;
        let mut skipped = 0usize;

        for _ in 0..MAX_PAGES_PER_TICK {
            if shutdown.is_cancelled() {
                break;
            }
            let page = client.fetch_readings(&access_token, cursor.as_deref()).await?;
            for item in &page.items {
                match normalize_item(conn, item, self.clock.now_utc()) {
                    Ok(reading) => {
                        self.db.upsert_reading(&reading).await?;
                        touched.insert((self.time.local_date_for(reading.timestamp, tz), reading.metric));
                        stored += 1;
                    }
                    Err(e) => {
                        // Malformed item: skip it, keep the batch going.
                        skipped += 1;
                        tracing::warn!(
                            connection_id = %conn.id,
                            item_id = %item.id,
                            error = %e,
                            "Skipping malformed payload item"
                        );
                    }
                }
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            if page.items.is_empty() {
                break;
            }
        }

        for (date, metric) in &touched {
            self.recompute_merged_day(conn.user_id, *date, *metric, tz)
                .await?;
        }

        // Re-read before advancing the watermark; a refresh may have
        // rewritten the token fields while we were fetching.
        let mut latest = self
            .db
            .get_connection(conn.id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("connection {}", conn.id)))?;
        latest.last_synced_at = Some(self.clock.now_utc());
        latest.sync_cursor = cursor;
        self.db.upsert_connection(&latest).await?;

        tracing::info!(
            connection_id = %conn.id,
            provider = %conn.provider,
            readings = stored,
            skipped,
            days_touched = touched.len(),
            "Sync completed"
        );
        Ok(())
    }

    /// Recompute one merged per-day row from all stored raw readings.
    ///
    /// Deterministic in the stored readings, so replaying identical
    /// raw payloads leaves the row unchanged and the version number
    /// only moves when the aggregate does.
    pub async fn recompute_merged_day(
        &self,
        user_id: Uuid,
        date_local: NaiveDate,
        metric: MetricType,
        tz: Tz,
    ) -> Result<()> {
        let (start, end) = self.time.utc_day_bounds(date_local, tz);
        let readings = self
            .db
            .readings_in_range(user_id, metric, start, end)
            .await?;
        if readings.is_empty() {
            return Ok(());
        }

        let value = match self.merge.policy(metric) {
            MergePolicy::PriorityOverride => {
                let authoritative = readings
                    .iter()
                    .min_by_key(|r| self.merge.priority_rank(r.source_provider))
                    .map(|r| r.source_provider)
                    .ok_or_else(|| SyncError::Internal(anyhow::anyhow!("empty readings")))?;
                latest_value(readings.iter().filter(|r| r.source_provider == authoritative))
            }
            MergePolicy::MostRecentWrite => latest_value(readings.iter()),
            MergePolicy::Additive => {
                // One contribution per provider: its latest reading.
                let mut per_provider: HashMap<Provider, &BiometricReading> = HashMap::new();
                for r in &readings {
                    let slot = per_provider.entry(r.source_provider).or_insert(r);
                    if r.timestamp > slot.timestamp {
                        *slot = r;
                    }
                }
                per_provider.values().map(|r| r.value).sum()
            }
        };

        let mut sources: Vec<Provider> = readings
            .iter()
            .map(|r| r.source_provider)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sources.sort_by_key(|p| p.as_str());

        let key = MergedDayKey {
            user_id,
            date_local,
            metric,
        };
        let previous = self.db.get_merged_day(&key).await?;
        if let Some(prev) = &previous {
            if prev.value == value && prev.sources == sources {
                // Idempotent replay: leave the row untouched.
                return Ok(());
            }
        }

        let day = MergedBiometricDay {
            key,
            value,
            unit: metric.canonical_unit().to_string(),
            sources,
            merge_version: previous.map_or(1, |p| p.merge_version + 1),
            updated_at: self.clock.now_utc(),
        };
        self.db.upsert_merged_day(&day).await
    }

    async fn park_connection(&self, connection_id: Uuid) -> Result<()> {
        let Some(mut conn) = self.db.get_connection(connection_id).await? else {
            return Ok(());
        };
        conn.status = ConnectionStatus::Error;
        self.db.upsert_connection(&conn).await
    }
}

#[async_trait::async_trait]
impl Job for SyncService {
    async fn run(&self, shutdown: Shutdown) -> Result<()> {
        self.tick(&shutdown).await
    }
}

fn latest_value<'a>(readings: impl Iterator<Item = &'a BiometricReading>) -> f64 {
    readings
        .max_by_key(|r| r.timestamp)
        .map(|r| r.value)
        .unwrap_or_default()
}

/// Normalize one provider payload item into the canonical vocabulary.
pub fn normalize_item(
    conn: &WearableConnection,
    item: &RawReadingItem,
    ingested_at: DateTime<Utc>,
) -> Result<BiometricReading> {
    let metric = canonical_metric(&item.metric)
        .ok_or_else(|| SyncError::Validation(format!("unknown metric '{}'", item.metric)))?;
    let value = canonical_value(metric, item.value, &item.unit)?;
    if !value.is_finite() {
        return Err(SyncError::Validation(format!(
            "non-finite value for '{}'",
            item.metric
        )));
    }
    let timestamp = DateTime::parse_from_rfc3339(&item.timestamp)
        .map_err(|e| SyncError::Validation(format!("bad timestamp '{}': {}", item.timestamp, e)))?
        .with_timezone(&Utc);

    Ok(BiometricReading {
        id: format!("{}:{}", conn.provider, item.id),
        user_id: conn.user_id,
        metric,
        timestamp,
        value,
        unit: metric.canonical_unit().to_string(),
        source_provider: conn.provider,
        source_connection_id: conn.id,
        ingested_at,
    })
}

/// Map provider-native metric names onto the canonical vocabulary.
fn canonical_metric(name: &str) -> Option<MetricType> {
    match name {
        "steps" | "step_count" | "daily_steps" => Some(MetricType::Steps),
        "heart_rate" | "hr" | "resting_heart_rate" => Some(MetricType::HeartRate),
        "sleep" | "sleep_minutes" | "sleep_duration" => Some(MetricType::SleepMinutes),
        "weight" | "body_weight" => Some(MetricType::Weight),
        "active_calories" | "calories_active" => Some(MetricType::ActiveCalories),
        _ => None,
    }
}

/// Convert a provider-native unit into the metric's canonical unit.
fn canonical_value(metric: MetricType, value: f64, unit: &str) -> Result<f64> {
    let canonical = metric.canonical_unit();
    if unit == canonical {
        return Ok(value);
    }
    let converted = match (metric, unit) {
        (MetricType::Weight, "lbs") => value * 0.453_592_37,
        (MetricType::Weight, "g") => value / 1000.0,
        (MetricType::SleepMinutes, "h" | "hours") => value * 60.0,
        (MetricType::SleepMinutes, "s" | "seconds") => value / 60.0,
        (MetricType::SleepMinutes, "ms") => value / 60_000.0,
        (MetricType::Steps, "steps") => value,
        (MetricType::HeartRate, "beats_per_minute") => value,
        _ => {
            return Err(SyncError::Validation(format!(
                "unit '{}' not convertible to {} for {}",
                unit, canonical, metric
            )))
        }
    };
    Ok(converted)
}
