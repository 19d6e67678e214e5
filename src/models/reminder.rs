// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reminder state: which slots have been handled per (user, local day).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three daily reminder slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderSlot {
    Morning,
    Afternoon,
    Evening,
}

impl ReminderSlot {
    pub const ALL: [ReminderSlot; 3] = [
        ReminderSlot::Morning,
        ReminderSlot::Afternoon,
        ReminderSlot::Evening,
    ];

    /// Bit position in [`ReminderState::sent_mask`].
    pub fn bit(&self) -> u8 {
        match self {
            ReminderSlot::Morning => 1 << 0,
            ReminderSlot::Afternoon => 1 << 1,
            ReminderSlot::Evening => 1 << 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderSlot::Morning => "morning",
            ReminderSlot::Afternoon => "afternoon",
            ReminderSlot::Evening => "evening",
        }
    }
}

impl std::fmt::Display for ReminderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-(user, local day) record of handled reminder slots.
///
/// A bit, once set, is never unset; setting is an atomic check-and-set
/// in the store so concurrent evaluations send at most one SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderState {
    pub user_id: Uuid,
    pub local_date: NaiveDate,
    pub sent_mask: u8,
    pub last_evaluated_at: DateTime<Utc>,
}

impl ReminderState {
    pub fn slot_handled(&self, slot: ReminderSlot) -> bool {
        self.sent_mask & slot.bit() != 0
    }
}
