//! Persistence layer.
//!
//! The engine only depends on the [`Database`] contract: typed find
//! and upsert per entity, every write a single atomic upsert keyed by
//! the entity's natural key. The storage technology behind it is
//! opaque; [`memory::MemoryDb`] is the in-process implementation used
//! by the daemon's default wiring and the test suite.

pub mod memory;

pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::{
    BiometricReading, MergedBiometricDay, MergedDayKey, MetricType, ReminderSlot, ReminderState,
    UserProfile, WearableConnection,
};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Typed store operations required by the background engines.
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    // ─── Connections ─────────────────────────────────────────────

    async fn get_connection(&self, id: Uuid) -> Result<Option<WearableConnection>>;

    /// All connections, including soft-deleted ones; callers filter.
    async fn list_connections(&self) -> Result<Vec<WearableConnection>>;

    async fn upsert_connection(&self, conn: &WearableConnection) -> Result<()>;

    // ─── Users ───────────────────────────────────────────────────

    async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>>;

    async fn upsert_user(&self, user: &UserProfile) -> Result<()>;

    /// Users with reminders enabled.
    async fn list_reminder_users(&self) -> Result<Vec<UserProfile>>;

    // ─── Raw readings (append-only audit) ────────────────────────

    /// Keyed on the reading's provider-scoped id, so replaying the
    /// same raw payload is a no-op overwrite.
    async fn upsert_reading(&self, reading: &BiometricReading) -> Result<()>;

    /// Readings for one user and metric inside a UTC instant range
    /// (half-open `[start, end)`).
    async fn readings_in_range(
        &self,
        user_id: Uuid,
        metric: MetricType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BiometricReading>>;

    // ─── Merged per-day rows ─────────────────────────────────────

    async fn get_merged_day(&self, key: &MergedDayKey) -> Result<Option<MergedBiometricDay>>;

    async fn upsert_merged_day(&self, day: &MergedBiometricDay) -> Result<()>;

    // ─── Reminder state ──────────────────────────────────────────

    async fn get_reminder_state(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
    ) -> Result<Option<ReminderState>>;

    /// Atomically set a slot bit if it is not already set.
    ///
    /// Returns true when this call set the bit (the caller owns the
    /// send); false when another evaluation already had.
    async fn try_mark_reminder_slot(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
        slot: ReminderSlot,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}
