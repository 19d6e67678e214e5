// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wellsync engine daemon.
//!
//! Wires the three background jobs (token refresh, wearable sync,
//! reminder dispatch) onto the scheduler and runs until SIGINT.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wellsync::{
    config::Config,
    db::MemoryDb,
    models::Provider,
    providers::{ProviderRegistry, RestProvider},
    scheduler::Scheduler,
    services::{
        FieldCodec, HttpDailyLog, HttpSmsClient, MergeConfig, ReminderService, SyncService,
        TokenService,
    },
    time_utils::{SystemClock, TimeContext},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment; abort on any invalid value
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!("Starting Wellsync engine");

    let codec = FieldCodec::new(&config.encryption_key);
    let time = TimeContext::new(config.default_timezone);
    let clock = Arc::new(SystemClock);
    let db = Arc::new(MemoryDb::new());

    // Provider registry with per-provider concurrency caps
    let mut registry = ProviderRegistry::new();
    for provider in Provider::ALL {
        let settings = &config.providers[&provider];
        let cap = config.provider_concurrency[&provider];
        registry.register(
            provider,
            Arc::new(RestProvider::new(
                provider,
                settings.base_url.clone(),
                settings.client_id.clone(),
                settings.client_secret.clone(),
            )),
            cap,
        );
    }
    let registry = Arc::new(registry);
    tracing::info!("Provider registry initialized");

    let tokens = TokenService::new(
        db.clone(),
        codec.clone(),
        registry.clone(),
        clock.clone(),
        config.refresh_ahead,
    );

    let sync = SyncService::new(
        db.clone(),
        tokens.clone(),
        registry.clone(),
        time.clone(),
        clock.clone(),
        config.sync_interval,
        MergeConfig::default(),
    );

    let reminders = ReminderService::new(
        db.clone(),
        Arc::new(HttpDailyLog::new(config.daily_log.clone())),
        Arc::new(HttpSmsClient::new(config.sms.clone())),
        time,
        clock,
        config.slot_windows.clone(),
    );

    let mut scheduler = Scheduler::new(config.scheduler_jitter);
    scheduler.register("token_refresh", config.token_tick, Arc::new(tokens));
    scheduler.register("wearable_sync", config.sync_tick, Arc::new(sync));
    scheduler.register("reminder_dispatch", config.reminder_tick, Arc::new(reminders));
    scheduler.start();
    tracing::info!("Scheduler started");

    tokio::signal::ctrl_c().await?;
    scheduler.stop(config.shutdown_timeout).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wellsync=debug".parse().expect("static directive"))
                .add_directive("info".parse().expect("static directive")),
        )
        .with(format)
        .init();
}
