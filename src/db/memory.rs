// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store backed by `DashMap`.
//!
//! Every operation is a single atomic upsert on the entity's natural
//! key; the reminder check-and-set uses the map's entry lock so two
//! concurrent evaluations of the same (user, date, slot) cannot both
//! win.

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    BiometricReading, MergedBiometricDay, MergedDayKey, MetricType, ReminderSlot, ReminderState,
    UserProfile, WearableConnection,
};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// In-process reference implementation of [`Database`].
#[derive(Default)]
pub struct MemoryDb {
    connections: DashMap<Uuid, WearableConnection>,
    users: DashMap<Uuid, UserProfile>,
    readings: DashMap<String, BiometricReading>,
    merged_days: DashMap<MergedDayKey, MergedBiometricDay>,
    reminder_states: DashMap<(Uuid, NaiveDate), ReminderState>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Database for MemoryDb {
    async fn get_connection(&self, id: Uuid) -> Result<Option<WearableConnection>> {
        Ok(self.connections.get(&id).map(|c| c.clone()))
    }

    async fn list_connections(&self) -> Result<Vec<WearableConnection>> {
        Ok(self.connections.iter().map(|c| c.clone()).collect())
    }

    async fn upsert_connection(&self, conn: &WearableConnection) -> Result<()> {
        self.connections.insert(conn.id, conn.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_reminder_users(&self) -> Result<Vec<UserProfile>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.reminders_enabled)
            .map(|u| u.clone())
            .collect())
    }

    async fn upsert_reading(&self, reading: &BiometricReading) -> Result<()> {
        self.readings.insert(reading.id.clone(), reading.clone());
        Ok(())
    }

    async fn readings_in_range(
        &self,
        user_id: Uuid,
        metric: MetricType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BiometricReading>> {
        let mut out: Vec<BiometricReading> = self
            .readings
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.metric == metric
                    && r.timestamp >= start
                    && r.timestamp < end
            })
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    async fn get_merged_day(&self, key: &MergedDayKey) -> Result<Option<MergedBiometricDay>> {
        Ok(self.merged_days.get(key).map(|d| d.clone()))
    }

    async fn upsert_merged_day(&self, day: &MergedBiometricDay) -> Result<()> {
        self.merged_days.insert(day.key.clone(), day.clone());
        Ok(())
    }

    async fn get_reminder_state(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
    ) -> Result<Option<ReminderState>> {
        Ok(self
            .reminder_states
            .get(&(user_id, local_date))
            .map(|s| s.clone()))
    }

    async fn try_mark_reminder_slot(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
        slot: ReminderSlot,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // The entry holds the shard lock for the whole check-and-set.
        let mut entry = self
            .reminder_states
            .entry((user_id, local_date))
            .or_insert_with(|| ReminderState {
                user_id,
                local_date,
                sent_mask: 0,
                last_evaluated_at: now,
            });
        let state = entry.value_mut();
        state.last_evaluated_at = now;
        if state.sent_mask & slot.bit() != 0 {
            return Ok(false);
        }
        state.sent_mask |= slot.bit();
        Ok(true)
    }
}
