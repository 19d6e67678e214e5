// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Wellsync: background synchronization and notification engine.
//!
//! Keeps wearable-device data, OAuth credentials, and habit-reminder
//! state correct over time: recurring jobs refresh expiring tokens,
//! pull and merge biometric readings per local calendar day, and
//! dispatch habit-completion SMS reminders.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod services;
pub mod time_utils;
