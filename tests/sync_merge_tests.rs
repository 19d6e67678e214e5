// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable sync: normalization, merge policies, idempotent replay,
//! per-connection failure isolation.

mod common;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::{
    idle_shutdown, insert_connection, insert_user, raw_item, registry_with, test_codec,
    FixedClock, MockProvider,
};
use std::sync::Arc;
use wellsync::db::{Database, MemoryDb};
use wellsync::error::SyncError;
use wellsync::models::{ConnectionStatus, MergedDayKey, MetricType, Provider};
use wellsync::providers::FetchPage;
use wellsync::services::{MergeConfig, MergePolicy, SyncService, TokenService};
use wellsync::time_utils::{Clock, TimeContext};

fn now() -> DateTime<Utc> {
    "2025-06-10T12:00:00Z".parse().expect("static timestamp")
}

fn far_future() -> DateTime<Utc> {
    now() + Duration::hours(12)
}

struct Fixture {
    db: Arc<MemoryDb>,
    clock: Arc<FixedClock>,
    garmin: Arc<MockProvider>,
    fitbit: Arc<MockProvider>,
    sync: SyncService,
}

fn fixture_with(merge: MergeConfig) -> Fixture {
    let db = Arc::new(MemoryDb::new());
    let clock = FixedClock::at(now());
    let garmin = MockProvider::new();
    let fitbit = MockProvider::new();
    let registry = registry_with(&[
        (Provider::Garmin, garmin.clone()),
        (Provider::Fitbit, fitbit.clone()),
    ]);
    let tokens = TokenService::new(
        db.clone(),
        test_codec(),
        registry.clone(),
        clock.clone(),
        Duration::minutes(10),
    );
    let sync = SyncService::new(
        db.clone(),
        tokens,
        registry,
        TimeContext::new(chrono_tz::UTC),
        clock.clone(),
        Duration::minutes(15),
        merge,
    );
    Fixture {
        db,
        clock,
        garmin,
        fitbit,
        sync,
    }
}

fn fixture() -> Fixture {
    fixture_with(MergeConfig::default())
}

fn page(items: Vec<wellsync::providers::RawReadingItem>, next_cursor: Option<&str>) -> FetchPage {
    FetchPage {
        items,
        next_cursor: next_cursor.map(|s| s.to_string()),
    }
}

#[tokio::test]
async fn priority_override_selects_wearable_not_sum() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;
    insert_connection(&f.db, &codec, user.id, Provider::Fitbit, far_future()).await;

    f.garmin.queue_fetch(Ok(page(
        vec![raw_item("g1", "steps", 12000.0, "count", "2025-06-10T08:00:00Z")],
        None,
    )));
    f.fitbit.queue_fetch(Ok(page(
        vec![raw_item("f1", "step_count", 11000.0, "count", "2025-06-10T09:00:00Z")],
        None,
    )));

    f.sync.tick(&idle_shutdown()).await.expect("tick");

    let key = MergedDayKey {
        user_id: user.id,
        date_local: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        metric: MetricType::Steps,
    };
    let day = f.db.get_merged_day(&key).await.unwrap().expect("merged day");
    // Garmin outranks Fitbit: override, never a 23000 sum.
    assert_eq!(day.value, 12000.0);
    assert_eq!(day.unit, "count");
    assert_eq!(day.sources, vec![Provider::Fitbit, Provider::Garmin]);
    assert_eq!(day.merge_version, 1);
}

#[tokio::test]
async fn replaying_identical_payloads_is_idempotent() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    let conn = insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;

    let items = vec![
        raw_item("g1", "steps", 9000.0, "count", "2025-06-10T07:00:00Z"),
        raw_item("g2", "heart_rate", 61.0, "bpm", "2025-06-10T07:30:00Z"),
    ];
    f.garmin.queue_fetch(Ok(page(items.clone(), None)));
    f.sync.tick(&idle_shutdown()).await.expect("first tick");

    let key = MergedDayKey {
        user_id: user.id,
        date_local: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        metric: MetricType::Steps,
    };
    let first = f.db.get_merged_day(&key).await.unwrap().expect("merged day");

    // Force the connection due again and replay the identical payload.
    let mut stale = f.db.get_connection(conn.id).await.unwrap().unwrap();
    stale.last_synced_at = None;
    stale.sync_cursor = None;
    f.db.upsert_connection(&stale).await.unwrap();
    f.clock.advance(Duration::hours(1));
    f.garmin.queue_fetch(Ok(page(items, None)));
    f.sync.tick(&idle_shutdown()).await.expect("replay tick");

    let second = f.db.get_merged_day(&key).await.unwrap().expect("merged day");
    assert_eq!(second.value, first.value);
    assert_eq!(second.sources, first.sources);
    // Unchanged aggregate: version and timestamp untouched.
    assert_eq!(second.merge_version, first.merge_version);
    assert_eq!(second.updated_at, first.updated_at);
}

#[tokio::test]
async fn most_recent_write_wins_for_vitals_with_unit_conversion() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;
    insert_connection(&f.db, &codec, user.id, Provider::Fitbit, far_future()).await;

    f.garmin.queue_fetch(Ok(page(
        vec![raw_item("g1", "weight", 68.5, "kg", "2025-06-10T06:00:00Z")],
        None,
    )));
    // Later reading in pounds; normalization converts to kg.
    f.fitbit.queue_fetch(Ok(page(
        vec![raw_item("f1", "body_weight", 150.0, "lbs", "2025-06-10T10:00:00Z")],
        None,
    )));

    f.sync.tick(&idle_shutdown()).await.expect("tick");

    let key = MergedDayKey {
        user_id: user.id,
        date_local: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        metric: MetricType::Weight,
    };
    let day = f.db.get_merged_day(&key).await.unwrap().expect("merged day");
    assert!((day.value - 68.038_855_5).abs() < 1e-3);
    assert_eq!(day.unit, "kg");
}

#[tokio::test]
async fn additive_metric_sums_latest_per_provider() {
    let mut merge = MergeConfig::default();
    merge.policies.insert(MetricType::Steps, MergePolicy::Additive);
    let f = fixture_with(merge);
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;
    insert_connection(&f.db, &codec, user.id, Provider::Fitbit, far_future()).await;

    // Two snapshots from Garmin; only the newest contributes.
    f.garmin.queue_fetch(Ok(page(
        vec![
            raw_item("g1", "steps", 1000.0, "count", "2025-06-10T08:00:00Z"),
            raw_item("g2", "steps", 1200.0, "count", "2025-06-10T10:00:00Z"),
        ],
        None,
    )));
    f.fitbit.queue_fetch(Ok(page(
        vec![raw_item("f1", "steps", 500.0, "count", "2025-06-10T09:00:00Z")],
        None,
    )));

    f.sync.tick(&idle_shutdown()).await.expect("tick");

    let key = MergedDayKey {
        user_id: user.id,
        date_local: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        metric: MetricType::Steps,
    };
    let day = f.db.get_merged_day(&key).await.unwrap().expect("merged day");
    assert_eq!(day.value, 1700.0);
}

#[tokio::test]
async fn malformed_items_are_skipped_not_fatal() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    let conn = insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;

    f.garmin.queue_fetch(Ok(page(
        vec![
            raw_item("g1", "mood", 5.0, "stars", "2025-06-10T08:00:00Z"),
            raw_item("g2", "steps", 4000.0, "count", "not-a-timestamp"),
            raw_item("g3", "steps", 8000.0, "count", "2025-06-10T08:00:00Z"),
        ],
        None,
    )));

    f.sync.tick(&idle_shutdown()).await.expect("tick");

    let key = MergedDayKey {
        user_id: user.id,
        date_local: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        metric: MetricType::Steps,
    };
    let day = f.db.get_merged_day(&key).await.unwrap().expect("merged day");
    assert_eq!(day.value, 8000.0);

    // The batch still counts as a successful sync.
    let conn = f.db.get_connection(conn.id).await.unwrap().unwrap();
    assert_eq!(conn.last_synced_at, Some(f.clock.now_utc()));
}

#[tokio::test]
async fn one_connection_failure_does_not_stall_others() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    let broken = insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;
    let healthy = insert_connection(&f.db, &codec, user.id, Provider::Fitbit, far_future()).await;

    f.garmin
        .queue_fetch(Err(SyncError::Transient("provider 502".to_string())));
    f.fitbit.queue_fetch(Ok(page(
        vec![raw_item("f1", "steps", 2000.0, "count", "2025-06-10T08:00:00Z")],
        None,
    )));

    f.sync.tick(&idle_shutdown()).await.expect("tick");

    // Failed connection: watermark untouched, still Active for retry.
    let broken = f.db.get_connection(broken.id).await.unwrap().unwrap();
    assert!(broken.last_synced_at.is_none());
    assert_eq!(broken.status, ConnectionStatus::Active);

    let healthy = f.db.get_connection(healthy.id).await.unwrap().unwrap();
    assert!(healthy.last_synced_at.is_some());
}

#[tokio::test]
async fn auth_revoked_fetch_parks_connection() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    let conn = insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;

    f.garmin
        .queue_fetch(Err(SyncError::AuthRevoked("token revoked".to_string())));
    f.sync.tick(&idle_shutdown()).await.expect("tick");

    let conn = f.db.get_connection(conn.id).await.unwrap().unwrap();
    assert_eq!(conn.status, ConnectionStatus::Error);
    assert!(conn.last_synced_at.is_none());
}

#[tokio::test]
async fn late_evening_reading_lands_on_local_date() {
    let f = fixture();
    let codec = test_codec();
    // 2025-03-08T07:58:00Z is 23:58 Pacific on March 7.
    let user = insert_user(&f.db, Some("America/Los_Angeles"), None, false).await;
    insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;

    f.garmin.queue_fetch(Ok(page(
        vec![raw_item("g1", "steps", 6000.0, "count", "2025-03-08T07:58:00Z")],
        None,
    )));
    f.sync.tick(&idle_shutdown()).await.expect("tick");

    let march7 = MergedDayKey {
        user_id: user.id,
        date_local: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
        metric: MetricType::Steps,
    };
    let march8 = MergedDayKey {
        date_local: NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
        ..march7.clone()
    };
    assert!(f.db.get_merged_day(&march7).await.unwrap().is_some());
    assert!(f.db.get_merged_day(&march8).await.unwrap().is_none());
}

#[tokio::test]
async fn cursor_advances_across_pages() {
    let f = fixture();
    let codec = test_codec();
    let user = insert_user(&f.db, Some("UTC"), None, false).await;
    let conn = insert_connection(&f.db, &codec, user.id, Provider::Garmin, far_future()).await;

    f.garmin.queue_fetch(Ok(page(
        vec![raw_item("g1", "steps", 100.0, "count", "2025-06-10T08:00:00Z")],
        Some("cursor-2"),
    )));
    f.garmin.queue_fetch(Ok(page(vec![], None)));

    f.sync.tick(&idle_shutdown()).await.expect("tick");

    assert_eq!(f.garmin.fetch_count(), 2);
    let conn = f.db.get_connection(conn.id).await.unwrap().unwrap();
    assert_eq!(conn.sync_cursor.as_deref(), Some("cursor-2"));
}
