// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared fixtures: in-memory store, scripted provider/SMS/daily-log
//! mocks, and a pinnable clock.
//!
//! Each integration test binary pulls in only what it needs.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wellsync::db::{Database, MemoryDb};
use wellsync::error::{Result, SyncError};
use wellsync::models::{
    ConnectionStatus, Provider, ReminderSlot, UserProfile, WearableConnection,
};
use wellsync::providers::{
    FetchPage, ProviderRegistry, ProviderTokens, RawReadingItem, WearableProvider,
};
use wellsync::scheduler::{Scheduler, Shutdown};
use wellsync::services::crypto::{EncryptionKey, FieldCodec};
use wellsync::services::reminders::DailyLog;
use wellsync::services::sms::{DeliveryResult, SmsTransport};
use wellsync::time_utils::Clock;

/// Codec with a static test key.
#[allow(dead_code)]
pub fn test_codec() -> FieldCodec {
    let key = EncryptionKey::from_bytes(&[0x42u8; 32]).expect("static key");
    FieldCodec::new(&key)
}

/// Shutdown handle that never fires (the sender is dropped, which
/// leaves the flag at false).
#[allow(dead_code)]
pub fn idle_shutdown() -> Shutdown {
    Scheduler::new(std::time::Duration::ZERO).shutdown_handle()
}

/// Clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

#[allow(dead_code)]
impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Scripted provider double. Responses are queued per method and
/// consumed in order; an empty fetch queue yields an empty page.
#[derive(Default)]
pub struct MockProvider {
    exchange_results: Mutex<VecDeque<Result<ProviderTokens>>>,
    refresh_results: Mutex<VecDeque<Result<ProviderTokens>>>,
    fetch_results: Mutex<VecDeque<Result<FetchPage>>>,
    pub refresh_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_exchange(&self, result: Result<ProviderTokens>) {
        self.exchange_results.lock().unwrap().push_back(result);
    }

    pub fn queue_refresh(&self, result: Result<ProviderTokens>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub fn queue_fetch(&self, result: Result<FetchPage>) {
        self.fetch_results.lock().unwrap().push_back(result);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl WearableProvider for MockProvider {
    async fn exchange_code(&self, _code: &str) -> Result<ProviderTokens> {
        self.exchange_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Transient("no scripted exchange".to_string())))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<ProviderTokens> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Transient("no scripted refresh".to_string())))
    }

    async fn fetch_readings(
        &self,
        _access_token: &str,
        _since_cursor: Option<&str>,
    ) -> Result<FetchPage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchPage::default()))
    }
}

/// Registry over mock providers with a generous concurrency cap.
#[allow(dead_code)]
pub fn registry_with(
    entries: &[(Provider, Arc<MockProvider>)],
) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for (provider, client) in entries {
        registry.register(*provider, client.clone(), 4);
    }
    Arc::new(registry)
}

/// Recording SMS transport; can be told to fail transiently first.
#[derive(Default)]
pub struct MockSms {
    pub sent: Mutex<Vec<(String, String)>>,
    fail_transient: AtomicUsize,
}

#[allow(dead_code)]
impl MockSms {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` sends with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.fail_transient.store(n, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl SmsTransport for MockSms {
    async fn send(&self, phone: &str, message: &str) -> Result<DeliveryResult> {
        let remaining = self.fail_transient.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_transient.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Transient("sms gateway flap".to_string()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((phone.to_string(), message.to_string()));
        Ok(DeliveryResult {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

/// In-memory daily-log collaborator.
#[derive(Default)]
pub struct MockDailyLog {
    completed: Mutex<HashSet<(Uuid, NaiveDate, ReminderSlot)>>,
    pub fail: AtomicBool,
}

#[allow(dead_code)]
impl MockDailyLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_completed(&self, user_id: Uuid, local_date: NaiveDate, slot: ReminderSlot) {
        self.completed
            .lock()
            .unwrap()
            .insert((user_id, local_date, slot));
    }
}

#[async_trait::async_trait]
impl DailyLog for MockDailyLog {
    async fn completed(
        &self,
        user_id: Uuid,
        local_date: NaiveDate,
        slot: ReminderSlot,
    ) -> Result<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("daily log unavailable".to_string()));
        }
        Ok(self
            .completed
            .lock()
            .unwrap()
            .contains(&(user_id, local_date, slot)))
    }
}

/// Provider tokens expiring at the given instant.
#[allow(dead_code)]
pub fn provider_tokens(tag: &str, expires_at: DateTime<Utc>) -> ProviderTokens {
    ProviderTokens {
        access_token: format!("access-{}", tag),
        refresh_token: format!("refresh-{}", tag),
        expires_at,
        account_id: Some(format!("acct-{}", tag)),
    }
}

/// Raw reading item in the unified wire shape.
#[allow(dead_code)]
pub fn raw_item(id: &str, metric: &str, value: f64, unit: &str, timestamp: &str) -> RawReadingItem {
    RawReadingItem {
        id: id.to_string(),
        metric: metric.to_string(),
        value,
        unit: unit.to_string(),
        timestamp: timestamp.to_string(),
    }
}

/// Store a user profile.
#[allow(dead_code)]
pub async fn insert_user(
    db: &MemoryDb,
    timezone: Option<&str>,
    phone: Option<&str>,
    reminders_enabled: bool,
) -> UserProfile {
    let user = UserProfile {
        id: Uuid::new_v4(),
        timezone: timezone.map(|s| s.to_string()),
        phone: phone.map(|s| s.to_string()),
        reminders_enabled,
    };
    db.upsert_user(&user).await.expect("upsert user");
    user
}

/// Store an active connection with freshly encrypted tokens.
#[allow(dead_code)]
pub async fn insert_connection(
    db: &MemoryDb,
    codec: &FieldCodec,
    user_id: Uuid,
    provider: Provider,
    token_expires_at: DateTime<Utc>,
) -> WearableConnection {
    let id = Uuid::new_v4();
    let conn = WearableConnection {
        id,
        user_id,
        provider,
        external_account_id: format!("acct-{}", id),
        access_token: codec.encrypt(&format!("access-{}", id)).expect("encrypt"),
        refresh_token: codec.encrypt(&format!("refresh-{}", id)).expect("encrypt"),
        token_expires_at,
        status: ConnectionStatus::Active,
        last_synced_at: None,
        sync_cursor: None,
        next_retry_at: None,
        refresh_failures: 0,
        deleted_at: None,
    };
    db.upsert_connection(&conn).await.expect("upsert connection");
    conn
}
