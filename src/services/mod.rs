// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - the background engines and their collaborators.

pub mod crypto;
pub mod reminders;
pub mod sms;
pub mod sync;
pub mod tokens;

pub use crypto::{EncryptedField, EncryptionKey, FieldCodec};
pub use reminders::{DailyLog, HttpDailyLog, ReminderService};
pub use sms::{DeliveryResult, HttpSmsClient, SmsTransport};
pub use sync::{MergeConfig, MergePolicy, SyncService};
pub use tokens::TokenService;
