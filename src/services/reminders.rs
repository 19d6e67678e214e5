// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Habit-completion reminder dispatch.
//!
//! Each tick re-evaluates every opted-in user against their *local*
//! calendar day and the configured slot windows. The slot bit in
//! [`crate::models::ReminderState`] is claimed with an atomic
//! check-and-set, so any number of concurrent or repeated evaluations
//! send at most one SMS per (user, local day, slot). Errors before the
//! claim leave the bit unset; a slot is never marked sent on error.

use crate::config::SlotWindows;
use crate::db::Database;
use crate::error::Result;
use crate::models::{ReminderSlot, UserProfile};
use crate::scheduler::{Job, Shutdown};
use crate::services::sms::SmsTransport;
use crate::time_utils::{Clock, TimeContext};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Extra delivery attempts after a transient send failure.
const SEND_RETRIES: u32 = 2;

/// Delay between delivery attempts.
const SEND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Read-only view of user-reported habit completion.
#[async_trait::async_trait]
pub trait DailyLog: Send + Sync {
    async fn completed(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
        slot: ReminderSlot,
    ) -> Result<bool>;
}

/// Decides and sends habit-completion SMS reminders.
#[derive(Clone)]
pub struct ReminderService {
    db: Arc<dyn Database>,
    daily_log: Arc<dyn DailyLog>,
    sms: Arc<dyn SmsTransport>,
    time: TimeContext,
    clock: Arc<dyn Clock>,
    windows: SlotWindows,
}

impl ReminderService {
    pub fn new(
        db: Arc<dyn Database>,
        daily_log: Arc<dyn DailyLog>,
        sms: Arc<dyn SmsTransport>,
        time: TimeContext,
        clock: Arc<dyn Clock>,
        windows: SlotWindows,
    ) -> Self {
        Self {
            db,
            daily_log,
            sms,
            time,
            clock,
            windows,
        }
    }

    /// One scheduler tick: evaluate every opted-in user. Safe to
    /// re-run any number of times per slot.
    pub async fn tick(&self, shutdown: &Shutdown) -> Result<()> {
        let users = self.db.list_reminder_users().await?;
        for user in users {
            if shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = self.evaluate_user(&user).await {
                // Logged and skipped; the slot bit stays unset so a
                // later tick can try again.
                tracing::warn!(user_id = %user.id, error = %e, "Reminder evaluation failed");
            }
        }
        Ok(())
    }

    /// Evaluate one user's current slot in their local day.
    pub async fn evaluate_user(&self, user: &UserProfile) -> Result<()> {
        let tz = self.time.resolve(user.timezone.as_deref());
        let local_now = self.time.local_now(self.clock.as_ref(), tz);
        let local_date = local_now.date_naive();

        let Some(slot) = self.windows.slot_at(local_now.time()) else {
            return Ok(());
        };

        if let Some(state) = self.db.get_reminder_state(user.id, local_date).await? {
            if state.slot_handled(slot) {
                return Ok(());
            }
        }

        let completed = self
            .daily_log
            .completed(user.id, local_date, slot)
            .await?;

        if completed {
            // Mark the slot evaluated without sending, so a user who
            // catches up mid-window is not reminded later.
            self.db
                .try_mark_reminder_slot(user.id, local_date, slot, self.clock.now_utc())
                .await?;
            tracing::debug!(user_id = %user.id, %slot, "Slot already completed, marked without send");
            return Ok(());
        }

        let Some(phone) = user.phone.as_deref() else {
            tracing::warn!(user_id = %user.id, "Reminders enabled but no phone number");
            return Ok(());
        };

        // Atomic claim: only the winner of the check-and-set sends.
        let claimed = self
            .db
            .try_mark_reminder_slot(user.id, local_date, slot, self.clock.now_utc())
            .await?;
        if !claimed {
            return Ok(());
        }

        self.send_with_retry(user.id, phone, slot).await;
        Ok(())
    }

    /// Delivery with bounded in-engine retry. The claim is already
    /// ours; exhausted retries log an error and give up rather than
    /// risking a duplicate send from a re-run.
    async fn send_with_retry(&self, user_id: Uuid, phone: &str, slot: ReminderSlot) {
        let message = reminder_message(slot);
        let mut attempt = 0;
        loop {
            match self.sms.send(phone, &message).await {
                Ok(delivery) => {
                    tracing::info!(
                        %user_id,
                        %slot,
                        message_id = %delivery.message_id,
                        "Reminder sent"
                    );
                    return;
                }
                Err(e) if e.is_transient() && attempt < SEND_RETRIES => {
                    attempt += 1;
                    tracing::warn!(%user_id, %slot, attempt, error = %e, "SMS send retrying");
                    tokio::time::sleep(SEND_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::error!(%user_id, %slot, error = %e, "SMS send failed");
                    return;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Job for ReminderService {
    async fn run(&self, shutdown: Shutdown) -> Result<()> {
        self.tick(&shutdown).await
    }
}

fn reminder_message(slot: ReminderSlot) -> String {
    format!(
        "Time for your {} habit check-in! Log it in the app to keep your streak going.",
        slot
    )
}

/// HTTP-backed [`DailyLog`] reading completion flags from the app API.
#[derive(Clone)]
pub struct HttpDailyLog {
    http: reqwest::Client,
    settings: crate::config::DailyLogSettings,
}

impl HttpDailyLog {
    pub fn new(settings: crate::config::DailyLogSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl DailyLog for HttpDailyLog {
    async fn completed(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
        slot: ReminderSlot,
    ) -> Result<bool> {
        use crate::error::SyncError;

        let url = format!("{}/users/{}/daily-log", self.settings.api_url, user_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.settings.api_token)
            .query(&[("date", local_date.to_string()), ("slot", slot.to_string())])
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("daily log fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transient(format!("daily log HTTP {}", status)));
        }

        #[derive(serde::Deserialize)]
        struct LogResponse {
            completed: bool,
        }
        let body: LogResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Validation(format!("daily log parse error: {}", e)))?;
        Ok(body.completed)
    }
}
