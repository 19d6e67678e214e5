// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the engine.

pub mod connection;
pub mod reading;
pub mod reminder;
pub mod user;

pub use connection::{ConnectionStatus, Provider, WearableConnection};
pub use reading::{BiometricReading, MergedBiometricDay, MergedDayKey, MetricType};
pub use reminder::{ReminderSlot, ReminderState};
pub use user::UserProfile;
