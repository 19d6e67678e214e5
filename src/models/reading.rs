// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Biometric reading models: raw per-provider readings and the merged
//! canonical per-day rows derived from them.

use crate::models::Provider;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical metric vocabulary.
///
/// Each metric has exactly one canonical unit; provider-native units
/// are converted during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Steps,
    HeartRate,
    SleepMinutes,
    Weight,
    ActiveCalories,
}

impl MetricType {
    pub const ALL: [MetricType; 5] = [
        MetricType::Steps,
        MetricType::HeartRate,
        MetricType::SleepMinutes,
        MetricType::Weight,
        MetricType::ActiveCalories,
    ];

    /// Canonical storage unit for this metric.
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            MetricType::Steps => "count",
            MetricType::HeartRate => "bpm",
            MetricType::SleepMinutes => "min",
            MetricType::Weight => "kg",
            MetricType::ActiveCalories => "kcal",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Steps => "steps",
            MetricType::HeartRate => "heart_rate",
            MetricType::SleepMinutes => "sleep_minutes",
            MetricType::Weight => "weight",
            MetricType::ActiveCalories => "active_calories",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized reading as reported by one provider.
///
/// Append-only from the engine's perspective; retained for audit. The
/// `id` is derived from the provider's own item identifier so that
/// replaying the same raw payload overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricReading {
    /// Provider-scoped natural id, e.g. `fitbit:abc123`.
    pub id: String,
    pub user_id: Uuid,
    pub metric: MetricType,
    /// Instant the reading was taken, in UTC.
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Canonical unit (see [`MetricType::canonical_unit`]).
    pub unit: String,
    pub source_provider: Provider,
    pub source_connection_id: Uuid,
    pub ingested_at: DateTime<Utc>,
}

/// Natural key of a merged per-day row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergedDayKey {
    pub user_id: Uuid,
    pub date_local: NaiveDate,
    pub metric: MetricType,
}

/// One canonical value per (user, local day, metric).
///
/// Exactly one row per key; recomputed from raw readings so replays
/// are idempotent. `merge_version` only advances when the aggregate
/// actually changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedBiometricDay {
    pub key: MergedDayKey,
    pub value: f64,
    pub unit: String,
    /// Providers that contributed readings, sorted by name.
    pub sources: Vec<Provider>,
    pub merge_version: u32,
    pub updated_at: DateTime<Utc>,
}
